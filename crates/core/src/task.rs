//! Typed task payloads.
//!
//! Task parameters and results are tagged enums serialized to JSON only at
//! the storage boundary. Parameters echo the caller's intent — prompt,
//! size/ratio, reference-image *locations* — and never carry raw image
//! bytes.

use serde::{Deserialize, Serialize};

/// Who submitted a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitterIdentity {
    Admin,
    Guest(String),
}

impl SubmitterIdentity {
    /// Stable string form stored in the task row: `admin` or `guest:<id>`.
    pub fn encode(&self) -> String {
        match self {
            Self::Admin => "admin".to_string(),
            Self::Guest(id) => format!("guest:{id}"),
        }
    }

    /// Parse the stored form. Unknown values fall back to a guest with the
    /// raw string as its id rather than failing a whole row read.
    pub fn decode(s: &str) -> Self {
        if s == "admin" {
            Self::Admin
        } else if let Some(id) = s.strip_prefix("guest:") {
            Self::Guest(id.to_string())
        } else {
            Self::Guest(s.to_string())
        }
    }
}

/// How a failed task failed, so callers can tell "provider rejected" from
/// "could not reach provider" from "broke internally".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ProviderRejected,
    ProviderUnreachable,
    Internal,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProviderRejected => "provider_rejected",
            Self::ProviderUnreachable => "provider_unreachable",
            Self::Internal => "internal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "provider_rejected" => Some(Self::ProviderRejected),
            "provider_unreachable" => Some(Self::ProviderUnreachable),
            "internal" => Some(Self::Internal),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Capability-specific task parameters, tagged for storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "capability", rename_all = "snake_case")]
pub enum TaskParams {
    Video(VideoParams),
    Image(ImageParams),
    Edit(EditParams),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoParams {
    pub prompt: Option<String>,
    pub resolution: String,
    pub ratio: String,
    pub duration_secs: u32,
    pub generate_audio: bool,
    pub watermark: bool,
    pub camera_fixed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    /// First-frame reference location (URL or data URL), if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_frame: Option<String>,
    /// Last-frame reference location, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_frame: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageParams {
    pub prompt: String,
    pub size: String,
    /// Reference image locations (URLs or data URLs).
    #[serde(default)]
    pub reference_images: Vec<String>,
    pub sequential_set: bool,
    pub max_images: u32,
    pub watermark: bool,
    pub optimize_prompt: bool,
    pub response_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditParams {
    pub prompt: String,
    pub aspect_ratio: String,
    pub resolution: String,
    /// Local paths of reference images saved at submission time; replayed
    /// when a continuation rebuilds the dialogue.
    #[serde(default)]
    pub reference_image_paths: Vec<String>,
}

impl TaskParams {
    /// The prompt text of this task, if it has one.
    pub fn prompt(&self) -> Option<&str> {
        match self {
            Self::Video(p) => p.prompt.as_deref(),
            Self::Image(p) => Some(&p.prompt),
            Self::Edit(p) => Some(&p.prompt),
        }
    }

    /// Reference image locations attached to this task.
    pub fn reference_images(&self) -> Vec<String> {
        match self {
            Self::Video(p) => p
                .first_frame
                .iter()
                .chain(p.last_frame.iter())
                .cloned()
                .collect(),
            Self::Image(p) => p.reference_images.clone(),
            Self::Edit(p) => p.reference_image_paths.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// One generated image artifact: a URL, data URL, or local path plus its
/// position within the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageArtifact {
    pub location: String,
    pub index: u32,
}

/// Terminal result payload, tagged for storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskResult {
    /// Video output: the primary artifact plus an optional last-frame still.
    Video {
        video_url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_frame_url: Option<String>,
    },
    /// Image or edit output: one or more artifacts.
    Images { artifacts: Vec<ImageArtifact> },
}

impl TaskResult {
    /// Locations of all image artifacts (empty for video results).
    pub fn image_locations(&self) -> Vec<String> {
        match self {
            Self::Video { .. } => Vec::new(),
            Self::Images { artifacts } => artifacts.iter().map(|a| a.location.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submitter_encoding_round_trips() {
        assert_eq!(SubmitterIdentity::Admin.encode(), "admin");
        assert_eq!(
            SubmitterIdentity::decode("admin"),
            SubmitterIdentity::Admin
        );
        let guest = SubmitterIdentity::Guest("g42".into());
        assert_eq!(guest.encode(), "guest:g42");
        assert_eq!(SubmitterIdentity::decode("guest:g42"), guest);
    }

    #[test]
    fn legacy_submitter_strings_become_guests() {
        assert_eq!(
            SubmitterIdentity::decode("someone"),
            SubmitterIdentity::Guest("someone".into())
        );
    }

    #[test]
    fn params_are_tagged_by_capability() {
        let params = TaskParams::Edit(EditParams {
            prompt: "add a hat".into(),
            aspect_ratio: "1:1".into(),
            resolution: "1K".into(),
            reference_image_paths: vec!["data/artifacts/edit-1/ref_0.png".into()],
        });
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["capability"], "edit");
        assert_eq!(value["prompt"], "add a hat");
    }

    #[test]
    fn video_references_come_from_frames() {
        let params = TaskParams::Video(VideoParams {
            prompt: Some("a storm".into()),
            resolution: "720p".into(),
            ratio: "16:9".into(),
            duration_secs: 5,
            generate_audio: true,
            watermark: false,
            camera_fixed: false,
            seed: None,
            first_frame: Some("https://cdn/first.png".into()),
            last_frame: None,
        });
        assert_eq!(params.reference_images(), vec!["https://cdn/first.png"]);
    }

    #[test]
    fn failure_kind_round_trips() {
        for kind in [
            FailureKind::ProviderRejected,
            FailureKind::ProviderUnreachable,
            FailureKind::Internal,
        ] {
            assert_eq!(FailureKind::parse(kind.as_str()), Some(kind));
        }
    }
}
