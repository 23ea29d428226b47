//! Generation capabilities and per-request generation subtypes.

use serde::{Deserialize, Serialize};

/// A generation capability an account may be configured for.
///
/// Video and image requests go to the synchronous-submit vendor endpoints;
/// edit requests go to the multi-turn dialogue vendor. Quota is metered in
/// tokens for video and in produced images for image and edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Video,
    Image,
    Edit,
}

impl Capability {
    /// Stable string form used in the database and in API paths.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Image => "image",
            Self::Edit => "edit",
        }
    }

    /// Parse the stable string form back into a capability.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "video" => Some(Self::Video),
            "image" => Some(Self::Image),
            "edit" => Some(Self::Edit),
            _ => None,
        }
    }

    /// Whether quota for this capability is metered in video tokens
    /// (as opposed to produced images).
    pub fn metered_in_tokens(self) -> bool {
        matches!(self, Self::Video)
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a single task was generated, independent of capability.
///
/// Video with a first frame is a single-reference generation; with first and
/// last frames it is a multi-reference generation. The same applies to image
/// generation with one or several reference images. `Continuation` is only
/// produced by multi-turn edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    TextToVideo,
    TextToImage,
    SingleReference,
    MultiReference,
    Continuation,
}

impl GenerationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TextToVideo => "text_to_video",
            Self::TextToImage => "text_to_image",
            Self::SingleReference => "single_reference",
            Self::MultiReference => "multi_reference",
            Self::Continuation => "continuation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text_to_video" => Some(Self::TextToVideo),
            "text_to_image" => Some(Self::TextToImage),
            "single_reference" => Some(Self::SingleReference),
            "multi_reference" => Some(Self::MultiReference),
            "continuation" => Some(Self::Continuation),
            _ => None,
        }
    }

    /// Derive the kind from the number of reference images attached to a
    /// fresh (non-continuation) request.
    pub fn from_reference_count(capability: Capability, reference_count: usize) -> Self {
        match reference_count {
            0 => match capability {
                Capability::Video => Self::TextToVideo,
                _ => Self::TextToImage,
            },
            1 => Self::SingleReference,
            _ => Self::MultiReference,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_round_trips_through_strings() {
        for cap in [Capability::Video, Capability::Image, Capability::Edit] {
            assert_eq!(Capability::parse(cap.as_str()), Some(cap));
        }
        assert_eq!(Capability::parse("audio"), None);
    }

    #[test]
    fn only_video_is_token_metered() {
        assert!(Capability::Video.metered_in_tokens());
        assert!(!Capability::Image.metered_in_tokens());
        assert!(!Capability::Edit.metered_in_tokens());
    }

    #[test]
    fn kind_derived_from_reference_count() {
        assert_eq!(
            GenerationKind::from_reference_count(Capability::Video, 0),
            GenerationKind::TextToVideo
        );
        assert_eq!(
            GenerationKind::from_reference_count(Capability::Image, 0),
            GenerationKind::TextToImage
        );
        assert_eq!(
            GenerationKind::from_reference_count(Capability::Edit, 0),
            GenerationKind::TextToImage
        );
        assert_eq!(
            GenerationKind::from_reference_count(Capability::Video, 1),
            GenerationKind::SingleReference
        );
        assert_eq!(
            GenerationKind::from_reference_count(Capability::Image, 5),
            GenerationKind::MultiReference
        );
    }
}
