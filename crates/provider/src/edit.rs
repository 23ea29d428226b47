//! Client for the multi-turn image edit vendor.
//!
//! Every call is stateless on the vendor side: the whole dialogue — user
//! prompts, reference images, and previously generated images — is replayed
//! as `contents`, and the response may interleave text commentary with
//! inline image data. Thought parts are commentary about the model's own
//! reasoning and are filtered out.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{api_error, ProviderError};

/// HTTP client for one account's edit vendor configuration.
pub struct EditClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

/// One dialogue turn as the vendor expects it.
#[derive(Debug, Clone, Serialize)]
pub struct EditTurn {
    /// `"user"` or `"model"`.
    pub role: &'static str,
    pub parts: Vec<EditPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EditPart {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl EditPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Inline an image as base64 with its mime type.
    pub fn image(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self::Inline {
            inline_data: InlineData {
                mime_type: mime_type.into(),
                data: BASE64.encode(bytes),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

/// Output sizing for the first turn of a dialogue. Continuations inherit
/// the sizing of the image being edited, so they send `None`.
#[derive(Debug, Clone, Serialize)]
pub struct EditImageConfig {
    #[serde(rename = "aspectRatio")]
    pub aspect_ratio: String,
    #[serde(rename = "imageSize")]
    pub image_size: String,
}

/// A full dialogue request.
#[derive(Debug, Clone)]
pub struct EditGenerationRequest {
    pub contents: Vec<EditTurn>,
    pub image_config: Option<EditImageConfig>,
}

/// Parsed result of an edit call.
#[derive(Debug, Clone)]
pub struct EditOutcome {
    /// Decoded bytes of every image the model produced, in order.
    pub images: Vec<Vec<u8>>,
    /// Non-thought text the model emitted alongside the images.
    pub texts: Vec<String>,
}

// Raw wire shapes.

#[derive(Serialize)]
struct GenerateBody<'a> {
    contents: &'a [EditTurn],
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct GenerationConfig<'a> {
    #[serde(rename = "responseModalities")]
    response_modalities: [&'static str; 2],
    #[serde(rename = "imageConfig", skip_serializing_if = "Option::is_none")]
    image_config: Option<&'a EditImageConfig>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(rename = "inlineData")]
    inline_data: Option<ResponseInline>,
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize)]
struct ResponseInline {
    #[serde(rename = "mimeType", default)]
    mime_type: String,
    #[serde(default)]
    data: String,
}

impl EditClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        }
    }

    /// Replay the dialogue and collect the model's images and commentary.
    pub async fn generate(
        &self,
        request: &EditGenerationRequest,
    ) -> Result<EditOutcome, ProviderError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = GenerateBody {
            contents: &request.contents,
            generation_config: GenerationConfig {
                response_modalities: ["TEXT", "IMAGE"],
                image_config: request.image_config.as_ref(),
            },
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let parsed: GenerateResponse = response.json().await?;
        Ok(Self::collect_outcome(parsed))
    }

    fn collect_outcome(response: GenerateResponse) -> EditOutcome {
        let mut images = Vec::new();
        let mut texts = Vec::new();

        let parts = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .unwrap_or_default();

        for part in parts {
            if let Some(inline) = part.inline_data {
                if !inline.mime_type.starts_with("image/") {
                    continue;
                }
                match BASE64.decode(inline.data.as_bytes()) {
                    Ok(bytes) => images.push(bytes),
                    Err(err) => {
                        tracing::warn!(error = %err, "Discarding undecodable inline image");
                    }
                }
            } else if let Some(text) = part.text {
                if !text.is_empty() && !part.thought {
                    texts.push(text);
                }
            }
        }

        EditOutcome { images, texts }
    }
}
