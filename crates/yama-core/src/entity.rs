//! Entity declarations -- the logical, user-authored schema description.
//!
//! An [`Entity`] is produced by an external config loader (out of scope for
//! this crate, see the migration plugin interface docs) from the single
//! configuration document the user edits. [`crate::model::build_model`]
//! resolves a map of entities into the deterministic, hashable [`crate::model::Model`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A reference to another entity, used to resolve a foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Name of the target entity (not necessarily its physical table name).
    pub entity: String,

    /// Target field name within the referenced entity. Defaults to the
    /// target entity's primary-key field when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// A scalar or symbolic column default.
///
/// Symbolic defaults (e.g. `now()`) are carried verbatim to the database
/// plugin; the core never interprets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    /// A literal JSON scalar (string, number, bool, or null).
    Scalar(serde_json::Value),
    /// A database-side expression, e.g. `"now()"` or `"gen_random_uuid()"`.
    Symbol(String),
}

/// An explicit index declaration on an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDecl {
    /// Explicit index name. Defaults to `{table}_{col1_col2_..}_idx`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Field names (not necessarily physical column names) covered by the index.
    pub fields: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

/// A single field descriptor within an [`Entity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Logical type: `uuid`, `string`, `text`, `integer`, `number`,
    /// `boolean`, `timestamp`, `json`, `jsonb`, or a named foreign type.
    #[serde(rename = "type")]
    pub logical_type: String,

    /// `VARCHAR` length for `string` fields. Ignored for other types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,

    /// Physical column name override. Defaults to the field name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,

    /// Physical SQL type override, takes precedence over logical-type mapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_type: Option<String>,

    /// Explicit nullability. When absent, derived from `required`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub primary_key: bool,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub index: bool,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub generated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,

    /// Inverse of nullable unless explicitly set; see [`crate::model::build_model`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Reference>,
}

impl Field {
    /// Returns the resolved nullability of this field, given its primary-key
    /// status. Primary-key columns are always forced non-null.
    pub fn resolved_nullable(&self) -> bool {
        if self.primary_key {
            return false;
        }
        if let Some(nullable) = self.nullable {
            return nullable;
        }
        if let Some(required) = self.required {
            return !required;
        }
        true
    }
}

/// A named record declaring a physical table, its fields, indexes, and
/// relations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Physical table name override. Defaults to the snake_case derivation
    /// of the entity name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Ordered field declarations. Order matters: it determines physical
    /// column order in generated DDL.
    pub fields: Vec<(String, Field)>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexDecl>,

    /// Named relations to other entities, beyond simple foreign keys
    /// (e.g. logical one-to-many bookkeeping consumed by code generation,
    /// out of scope here but preserved through merge and storage).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relations: BTreeMap<String, String>,
}

impl Entity {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }
}

/// The full set of entity declarations, keyed by entity name.
///
/// A [`BTreeMap`] is used deliberately: [`crate::model::build_model`] walks
/// entities in sorted-name order per its contract, so iterating this map is
/// always in the canonical order without a separate sort step.
pub type Entities = BTreeMap<String, Entity>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_nullable_primary_key_forced_non_null() {
        let f = Field {
            logical_type: "uuid".into(),
            primary_key: true,
            nullable: Some(true),
            ..blank_field()
        };
        assert!(!f.resolved_nullable());
    }

    #[test]
    fn resolved_nullable_defaults_to_true() {
        let f = blank_field();
        assert!(f.resolved_nullable());
    }

    #[test]
    fn resolved_nullable_required_inverts() {
        let f = Field {
            required: Some(true),
            ..blank_field()
        };
        assert!(!f.resolved_nullable());
    }

    #[test]
    fn resolved_nullable_explicit_nullable_wins_over_required() {
        let f = Field {
            required: Some(true),
            nullable: Some(true),
            ..blank_field()
        };
        assert!(f.resolved_nullable());
    }

    fn blank_field() -> Field {
        Field {
            logical_type: "string".into(),
            max_length: None,
            column: None,
            db_type: None,
            nullable: None,
            primary_key: false,
            unique: false,
            index: false,
            generated: false,
            default: None,
            required: None,
            references: None,
        }
    }
}
