//! HTTP clients for the external generation vendors.
//!
//! Three clients behind one error surface: [`video::VideoClient`] submits
//! and polls long-running video jobs, [`image::ImageClient`] generates
//! stills in a single call, and [`edit::EditClient`] replays a multi-turn
//! dialogue for iterative image edits. Every call carries a bounded
//! timeout; generation is slow, so the budgets are minutes, not seconds.

pub mod edit;
pub mod error;
pub mod image;
pub mod video;

pub use error::ProviderError;
