//! Row models and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row, plus the create/query DTOs the repositories accept.

pub mod account;
pub mod daily_usage;
pub mod status;
pub mod task;
