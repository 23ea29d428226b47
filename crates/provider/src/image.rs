//! Client for the single-call image generation vendor.
//!
//! Unlike video there is no vendor-side task to poll: one POST renders the
//! whole batch and the response carries every artifact (or a per-image
//! error) plus a usage block with the count actually produced.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{api_error, ProviderError};

/// HTTP client for one account's image endpoint.
pub struct ImageClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    timeout: Duration,
}

/// Reference images: the vendor takes a bare string for one and an array
/// for several.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ImageRefs {
    One(String),
    Many(Vec<String>),
}

impl ImageRefs {
    /// Collapse a location list into the vendor's one-or-many shape.
    pub fn from_locations(locations: &[String]) -> Option<Self> {
        match locations {
            [] => None,
            [one] => Some(Self::One(one.clone())),
            many => Some(Self::Many(many.to_vec())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizePromptOptions {
    pub mode: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SequentialOptions {
    pub max_images: u32,
}

/// A full generation body.
#[derive(Debug, Clone, Serialize)]
pub struct ImageGenerationRequest {
    pub model: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRefs>,
    pub size: String,
    pub watermark: bool,
    pub response_format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimize_prompt_options: Option<OptimizePromptOptions>,
    /// `"auto"` to let the vendor render a coherent set, `"disabled"` for a
    /// single image per request.
    pub sequential_image_generation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequential_image_generation_options: Option<SequentialOptions>,
}

/// One artifact out of the batch.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    /// URL or data URL, depending on the requested response format.
    pub location: String,
    pub size: Option<String>,
}

/// Parsed result of a generation call.
#[derive(Debug, Clone)]
pub struct ImageOutcome {
    pub images: Vec<GeneratedImage>,
    /// Count the vendor reports as actually produced — this is what gets
    /// charged against the day's quota, not the requested count.
    pub generated_images: i64,
    pub total_tokens: Option<i64>,
    /// Per-image failure messages for items the vendor could not render.
    pub item_errors: Vec<String>,
}

// Raw wire shapes.

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageItem>,
    #[serde(default)]
    usage: Option<ImageUsage>,
}

#[derive(Deserialize)]
struct ImageItem {
    url: Option<String>,
    b64_json: Option<String>,
    size: Option<String>,
    error: Option<ItemError>,
}

#[derive(Deserialize)]
struct ItemError {
    message: Option<String>,
}

#[derive(Deserialize)]
struct ImageUsage {
    generated_images: Option<i64>,
    total_tokens: Option<i64>,
}

impl ImageClient {
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            api_key: api_key.into(),
            timeout,
        }
    }

    /// Render the batch and parse artifacts + usage.
    pub async fn generate(
        &self,
        request: &ImageGenerationRequest,
    ) -> Result<ImageOutcome, ProviderError> {
        let response = self
            .http
            .post(format!("{}/images/generations", self.api_base))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body: ImageResponse = response.json().await?;

        let mut images = Vec::new();
        let mut item_errors = Vec::new();
        for item in &body.data {
            if let Some(url) = &item.url {
                images.push(GeneratedImage {
                    location: url.clone(),
                    size: item.size.clone(),
                });
            } else if let Some(b64) = &item.b64_json {
                images.push(GeneratedImage {
                    location: format!("data:image/png;base64,{b64}"),
                    size: item.size.clone(),
                });
            } else if let Some(error) = &item.error {
                item_errors.push(
                    error
                        .message
                        .clone()
                        .unwrap_or_else(|| "image generation failed".to_string()),
                );
            }
        }

        let generated_images = body
            .usage
            .as_ref()
            .and_then(|u| u.generated_images)
            .unwrap_or(images.len() as i64);

        Ok(ImageOutcome {
            images,
            generated_images,
            total_tokens: body.usage.and_then(|u| u.total_tokens),
            item_errors,
        })
    }
}
