//! Provider error surface.

/// Errors from a provider call.
///
/// The two variants are deliberately distinct failure classes: `Api` means
/// the provider was reached and rejected or botched the request;
/// `Unreachable` means the request never completed (network, DNS, TLS, or
/// timeout). Callers store the class on the failed task so users can tell
/// the difference.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider returned a non-success response.
    #[error("Provider rejected the request ({status}): {message}")]
    Api { status: u16, message: String },

    /// The provider could not be reached or the call timed out.
    #[error("Provider unreachable: {0}")]
    Unreachable(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Unreachable(err.to_string())
    }
}

/// Pull a human-readable message out of a vendor error envelope.
///
/// Both vendors wrap failures as `{"error": {"message": "..."}}`; fall back
/// to the raw body when the envelope is absent or malformed.
pub(crate) fn envelope_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")?
                .get("message")?
                .as_str()
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

/// Turn a non-success response into [`ProviderError::Api`].
pub(crate) async fn api_error(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    ProviderError::Api {
        status,
        message: envelope_message(&body),
    }
}
