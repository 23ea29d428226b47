//! Background job execution.

pub mod dispatcher;

pub use dispatcher::{DispatchJob, Dispatcher, ProviderCall};
