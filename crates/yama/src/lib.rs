//! Schema versioning and migration engine.
//!
//! This crate is a thin facade over the engine's components: the
//! canonical model and step planner ([`core`]), the content-addressed
//! snapshot/transition stores ([`store`]), project configuration
//! ([`config`]), the three-way merge resolver ([`merge`]), safety
//! collateral ([`collateral`]), the database plugin interface
//! ([`plugin`]), and the migration applier ([`apply`]).

pub use yama_apply as apply;
pub use yama_collateral as collateral;
pub use yama_config as config;
pub use yama_core as core;
pub use yama_merge as merge;
pub use yama_plugin as plugin;
pub use yama_store as store;
