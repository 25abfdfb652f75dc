//! Migration applier: resolves a DAG path, validates environment state,
//! classifies and gates the plan on policy, stages collateral, compiles
//! SQL through a plugin, and applies it with rollback on failure.

mod applier;
mod error;

pub use applier::{Applier, ApplyReport, ApplyRequest};
pub use error::ApplyError;
