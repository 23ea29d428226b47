//! Video token cost model, price estimation, and request-size limits.
//!
//! The video vendor meters usage in tokens derived from the rendered pixel
//! volume: `floor(width * height * fps * duration / 1024)`. Width and height
//! come from a fixed table keyed by resolution tier and aspect ratio;
//! unknown combinations fall back to the default tier and ratio so an
//! estimate is always available.

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Frame rate used for token estimation unless overridden in configuration.
pub const DEFAULT_FPS: u32 = 24;

/// Resolution tier assumed when the requested tier is unknown.
pub const DEFAULT_RESOLUTION: &str = "720p";

/// Aspect ratio assumed when the requested ratio is unknown.
pub const DEFAULT_RATIO: &str = "16:9";

/// Video price per 1k tokens with an audio track, in yuan.
pub const PRICE_PER_K_TOKENS_WITH_AUDIO: f64 = 0.0160;

/// Video price per 1k tokens without an audio track, in yuan.
pub const PRICE_PER_K_TOKENS_WITHOUT_AUDIO: f64 = 0.0080;

/// Price per generated still image, in yuan.
pub const PRICE_PER_IMAGE: f64 = 0.25;

/// Upper bound on reference images attached to a single request.
pub const MAX_REFERENCE_IMAGES: usize = 14;

/// Upper bound on the number of images in a sequential set, and on the
/// combined count of reference images plus set size.
pub const MAX_SEQUENTIAL_IMAGES: u32 = 15;

// ---------------------------------------------------------------------------
// Resolution table
// ---------------------------------------------------------------------------

/// Pixel dimensions for a resolution tier and aspect ratio.
///
/// Returns `None` for unknown combinations; use [`resolve_pixels`] to get
/// the fallback behaviour.
pub fn resolution_pixels(resolution: &str, ratio: &str) -> Option<(u32, u32)> {
    let dims = match resolution {
        "480p" => match ratio {
            "16:9" => (864, 496),
            "4:3" => (752, 560),
            "1:1" => (640, 640),
            "3:4" => (560, 752),
            "9:16" => (496, 864),
            "21:9" => (992, 432),
            _ => return None,
        },
        "720p" => match ratio {
            "16:9" => (1280, 720),
            "4:3" => (1112, 834),
            "1:1" => (960, 960),
            "3:4" => (834, 1112),
            "9:16" => (720, 1280),
            "21:9" => (1470, 630),
            _ => return None,
        },
        _ => return None,
    };
    Some(dims)
}

/// Pixel dimensions with fallback: an unknown tier becomes
/// [`DEFAULT_RESOLUTION`], and an unknown ratio within a known tier becomes
/// [`DEFAULT_RATIO`].
pub fn resolve_pixels(resolution: &str, ratio: &str) -> (u32, u32) {
    let resolution = if resolution_pixels(resolution, DEFAULT_RATIO).is_some() {
        resolution
    } else {
        DEFAULT_RESOLUTION
    };
    resolution_pixels(resolution, ratio)
        .or_else(|| resolution_pixels(resolution, DEFAULT_RATIO))
        .unwrap_or((1280, 720))
}

// ---------------------------------------------------------------------------
// Token and price estimation
// ---------------------------------------------------------------------------

/// Estimate the token cost of a single video.
///
/// `floor(width * height * fps * duration / 1024)` with the table lookup
/// and fallback described above. The estimate is advisory for admission;
/// the vendor's reported usage is authoritative for the final charge.
pub fn estimate_video_tokens(resolution: &str, ratio: &str, duration_secs: u32, fps: u32) -> i64 {
    let (width, height) = resolve_pixels(resolution, ratio);
    (width as i64) * (height as i64) * (fps as i64) * (duration_secs as i64) / 1024
}

/// Price for a token count, rounded to 4 decimal places.
pub fn video_price(tokens: i64, with_audio: bool) -> f64 {
    let per_k = if with_audio {
        PRICE_PER_K_TOKENS_WITH_AUDIO
    } else {
        PRICE_PER_K_TOKENS_WITHOUT_AUDIO
    };
    (tokens as f64 / 1000.0 * per_k * 10_000.0).round() / 10_000.0
}

/// How many images an image request is expected to produce: the set size
/// when sequential generation is enabled, otherwise the requested count.
pub fn estimated_image_count(sequential: bool, count: u32, max_images: u32) -> u32 {
    if sequential {
        max_images
    } else {
        count
    }
}

/// Price for an image count, rounded to 2 decimal places.
pub fn image_price(count: u32) -> f64 {
    (count as f64 * PRICE_PER_IMAGE * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Request-size validation
// ---------------------------------------------------------------------------

/// Validate the number of reference images attached to a request.
pub fn validate_reference_count(count: usize) -> Result<(), CoreError> {
    if count > MAX_REFERENCE_IMAGES {
        return Err(CoreError::Validation(format!(
            "At most {MAX_REFERENCE_IMAGES} reference images are allowed (got {count})"
        )));
    }
    Ok(())
}

/// Validate a sequential-set request: the set size must be within 1..=15 and
/// the vendor rejects sets where reference images plus generated images
/// exceed 15.
pub fn validate_sequential_set(reference_count: usize, max_images: u32) -> Result<(), CoreError> {
    if max_images < 1 || max_images > MAX_SEQUENTIAL_IMAGES {
        return Err(CoreError::Validation(format!(
            "Sequential set size must be between 1 and {MAX_SEQUENTIAL_IMAGES}"
        )));
    }
    let combined = reference_count as u32 + max_images;
    if combined > MAX_SEQUENTIAL_IMAGES {
        let max_allowed = MAX_SEQUENTIAL_IMAGES.saturating_sub(reference_count as u32);
        return Err(CoreError::Validation(format!(
            "{reference_count} reference images plus a set of {max_images} exceeds \
             {MAX_SEQUENTIAL_IMAGES}; at most {max_allowed} can be generated"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
