//! Conversation chain resolution for multi-turn image edits.
//!
//! Every continuation must replay the full dialogue to the provider: the
//! prompts and reference images the user sent, and the images the model
//! produced, in order. That history is not stored anywhere — it is
//! reconstructed from the task chain by walking `parent` pointers back to
//! the root and replaying forward.
//!
//! Turns carry image *locations* only; bytes are loaded lazily when the
//! provider request is built, so a chain with missing artifact files still
//! resolves (the caller skips unreadable images and sends text-only parts).

use std::collections::{HashMap, HashSet};

use crate::types::DbId;

/// The slice of a task needed for chain replay.
#[derive(Debug, Clone)]
pub struct ChainTask {
    pub id: DbId,
    pub parent: Option<DbId>,
    pub prompt: Option<String>,
    /// Reference image locations the user attached to this task.
    pub reference_images: Vec<String>,
    /// Image locations this task produced, empty unless it succeeded.
    pub result_images: Vec<String>,
    pub succeeded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnPart {
    Text(String),
    /// An image by location; bytes are resolved by the caller.
    Image(String),
}

/// One reconstructed dialogue turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub parts: Vec<TurnPart>,
}

/// A chain that cannot be replayed in a trustworthy order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// A parent pointer leads to a task that is not in the arena. Resolving
    /// anyway would silently truncate the dialogue to a wrong prefix.
    #[error("Conversation chain is broken: task {missing} is unreachable")]
    Broken { missing: DbId },

    /// A parent pointer loops back onto the chain.
    #[error("Conversation chain contains a cycle at task {task}")]
    Cycle { task: DbId },
}

/// Rebuild the ordered dialogue ending at `leaf`, then append a fresh user
/// turn carrying `continuation_prompt`.
///
/// The walk is iterative with a visited set, so a corrupted parent pointer
/// that forms a cycle is rejected instead of looping. For each task in
/// root-first order this emits a user turn (prompt plus reference-image
/// locations) and, when the task succeeded and produced images, a model
/// turn with the result locations. Tasks contribute nothing silently only
/// when they have neither prompt nor references.
pub fn resolve_chain(
    arena: &HashMap<DbId, ChainTask>,
    leaf: DbId,
    continuation_prompt: &str,
) -> Result<Vec<ConversationTurn>, ChainError> {
    let mut chain: Vec<DbId> = Vec::new();
    let mut visited: HashSet<DbId> = HashSet::new();
    let mut current = leaf;

    loop {
        let node = arena
            .get(&current)
            .ok_or(ChainError::Broken { missing: current })?;
        if !visited.insert(current) {
            return Err(ChainError::Cycle { task: current });
        }
        chain.push(current);
        match node.parent {
            Some(parent) => current = parent,
            None => break,
        }
    }
    chain.reverse();

    let mut turns = Vec::with_capacity(chain.len() * 2 + 1);
    for id in chain {
        let node = &arena[&id];

        let mut user_parts = Vec::new();
        if let Some(prompt) = node.prompt.as_deref() {
            if !prompt.is_empty() {
                user_parts.push(TurnPart::Text(prompt.to_string()));
            }
        }
        for location in &node.reference_images {
            user_parts.push(TurnPart::Image(location.clone()));
        }
        if !user_parts.is_empty() {
            turns.push(ConversationTurn {
                role: TurnRole::User,
                parts: user_parts,
            });
        }

        if node.succeeded && !node.result_images.is_empty() {
            turns.push(ConversationTurn {
                role: TurnRole::Model,
                parts: node
                    .result_images
                    .iter()
                    .map(|location| TurnPart::Image(location.clone()))
                    .collect(),
            });
        }
    }

    turns.push(ConversationTurn {
        role: TurnRole::User,
        parts: vec![TurnPart::Text(continuation_prompt.to_string())],
    });

    Ok(turns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn task(id: DbId, parent: Option<DbId>, prompt: &str) -> ChainTask {
        ChainTask {
            id,
            parent,
            prompt: Some(prompt.to_string()),
            reference_images: Vec::new(),
            result_images: vec![format!("artifacts/{id}/image_0.png")],
            succeeded: true,
        }
    }

    fn arena(tasks: Vec<ChainTask>) -> HashMap<DbId, ChainTask> {
        tasks.into_iter().map(|t| (t.id, t)).collect()
    }

    #[test]
    fn three_task_chain_yields_five_turns() {
        let arena = arena(vec![
            task(1, None, "a red fox"),
            task(2, Some(1), "make it snow"),
        ]);

        let turns = resolve_chain(&arena, 2, "now at night").unwrap();
        assert_eq!(turns.len(), 5);

        assert_eq!(turns[0].role, TurnRole::User);
        assert_eq!(turns[0].parts, vec![TurnPart::Text("a red fox".into())]);
        assert_eq!(turns[1].role, TurnRole::Model);
        assert_eq!(
            turns[1].parts,
            vec![TurnPart::Image("artifacts/1/image_0.png".into())]
        );
        assert_eq!(turns[2].parts, vec![TurnPart::Text("make it snow".into())]);
        assert_eq!(turns[3].role, TurnRole::Model);
        assert_eq!(
            turns[4],
            ConversationTurn {
                role: TurnRole::User,
                parts: vec![TurnPart::Text("now at night".into())],
            }
        );
    }

    #[test]
    fn reference_images_ride_along_with_the_user_turn() {
        let mut root = task(1, None, "blend these");
        root.reference_images = vec!["uploads/a.png".into(), "uploads/b.png".into()];
        let arena = arena(vec![root]);

        let turns = resolve_chain(&arena, 1, "brighter").unwrap();
        assert_eq!(
            turns[0].parts,
            vec![
                TurnPart::Text("blend these".into()),
                TurnPart::Image("uploads/a.png".into()),
                TurnPart::Image("uploads/b.png".into()),
            ]
        );
    }

    #[test]
    fn failed_tasks_emit_no_model_turn() {
        let mut middle = task(2, Some(1), "make it snow");
        middle.succeeded = false;
        middle.result_images.clear();
        let arena = arena(vec![task(1, None, "a red fox"), middle, task(3, Some(2), "zoom in")]);

        let turns = resolve_chain(&arena, 3, "crop tighter").unwrap();
        // user(1), model(1), user(2), user(3), model(3), user(new)
        assert_eq!(turns.len(), 6);
        assert_eq!(turns[2].role, TurnRole::User);
        assert_eq!(turns[3].role, TurnRole::User);
    }

    #[test]
    fn dangling_parent_is_rejected() {
        let arena = arena(vec![task(5, Some(99), "edit")]);
        assert_matches!(
            resolve_chain(&arena, 5, "again"),
            Err(ChainError::Broken { missing: 99 })
        );
    }

    #[test]
    fn missing_leaf_is_rejected() {
        let arena = arena(vec![task(1, None, "root")]);
        assert_matches!(
            resolve_chain(&arena, 7, "again"),
            Err(ChainError::Broken { missing: 7 })
        );
    }

    #[test]
    fn cycles_are_rejected() {
        let a = task(1, Some(2), "a");
        let b = task(2, Some(1), "b");
        let arena = arena(vec![a, b]);
        assert_matches!(
            resolve_chain(&arena, 1, "again"),
            Err(ChainError::Cycle { .. })
        );
    }
}
