//! Task lifecycle status, mapping to the `task_statuses` lookup table.

/// Status ID type matching the INTEGER lookup table.
pub type StatusId = i64;

/// Task lifecycle status.
///
/// Discriminants match the seed data in `task_statuses`. Transitions are
/// strictly forward: `queued → running → succeeded | failed` (image and
/// edit tasks skip `queued` and start in `running`). Nothing ever leaves a
/// terminal state; the repositories enforce this with guarded updates.
#[repr(i64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Queued = 1,
    Running = 2,
    Succeeded = 3,
    Failed = 4,
}

impl TaskStatus {
    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(Self::Queued),
            2 => Some(Self::Running),
            3 => Some(Self::Succeeded),
            4 => Some(Self::Failed),
            _ => None,
        }
    }

    /// Name as seeded in the lookup table and used in API responses.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal states admit no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        match (self, next) {
            (Self::Queued, Self::Running) => true,
            (Self::Queued | Self::Running, Self::Succeeded | Self::Failed) => true,
            _ => false,
        }
    }
}

impl From<TaskStatus> for StatusId {
    fn from(value: TaskStatus) -> Self {
        value as StatusId
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TaskStatus; 4] = [
        TaskStatus::Queued,
        TaskStatus::Running,
        TaskStatus::Succeeded,
        TaskStatus::Failed,
    ];

    #[test]
    fn ids_round_trip() {
        for status in ALL {
            assert_eq!(TaskStatus::from_id(status.id()), Some(status));
            assert_eq!(TaskStatus::from_name(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::from_id(0), None);
        assert_eq!(TaskStatus::from_name("cancelled"), None);
    }

    #[test]
    fn transitions_are_strictly_forward() {
        use TaskStatus::*;
        assert!(Queued.can_transition_to(Running));
        assert!(Queued.can_transition_to(Succeeded));
        assert!(Queued.can_transition_to(Failed));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Failed));

        // No re-entry into queued or running.
        for status in ALL {
            assert!(!status.can_transition_to(Queued));
        }
        assert!(!Running.can_transition_to(Running));

        // Terminal states admit nothing.
        for terminal in [Succeeded, Failed] {
            assert!(terminal.is_terminal());
            for next in ALL {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }
}
