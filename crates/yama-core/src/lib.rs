//! Canonical model, step sum type, diff planner, and safety classifier for
//! the schema migration engine.

pub mod diff;
pub mod entity;
pub mod error;
pub mod model;
pub mod safety;
pub mod step;

pub use diff::{compute_diff, plan, rollback, Diff};
pub use entity::{DefaultValue, Entities, Entity, Field};
pub use error::ModelError;
pub use model::{build_model, Column, ForeignKeyDef, IndexDef, Model, Table};
pub use safety::{
    analyze_impact, apply_policy, classify_plan, classify_step, DowntimeEstimate, Environment,
    ImpactAnalysis, SafetyLevel,
};
pub use step::{ColumnChanges, Step};
