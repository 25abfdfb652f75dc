//! The canonical model: resolved tables, columns, indexes, and foreign
//! keys, plus the content hash that identifies a model uniquely.
//!
//! Hashing follows the same discipline as a canonical content hash over an
//! ordered record: serialize the resolved, closed-world representation to
//! JSON and hash the bytes. `serde_json`'s `Map` is a `BTreeMap` unless the
//! `preserve_order` feature is enabled (it isn't, here), so object keys are
//! emitted in sorted order for free -- the "canonical JSON, sorted keys"
//! requirement falls out of the dependency choice rather than hand-rolled
//! key sorting.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::entity::{DefaultValue, Entities, Entity, Field};
use crate::error::ModelError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
    pub primary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub generated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    pub name: String,
    pub columns: Vec<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<(String, Column)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKeyDef>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }
}

/// The resolved, content-addressed schema: a list of tables in
/// entity-sorted-name order, and the hash of that list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub hash: String,
    pub tables: Vec<(String, Table)>,
}

impl Model {
    pub fn empty() -> Self {
        Model {
            hash: compute_model_hash(&[]),
            tables: Vec::new(),
        }
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn pluralize(table: &str) -> String {
    if table.ends_with('y') && !table.ends_with("ay") && !table.ends_with("ey") {
        let mut s = table[..table.len() - 1].to_string();
        s.push_str("ies");
        s
    } else if table.ends_with('s') {
        table.to_string()
    } else {
        format!("{table}s")
    }
}

/// Maps a logical field type to a physical SQL type. `db_type` always wins
/// when present. Unknown logical types fall back to the uppercased logical
/// type name, so a config referencing a named foreign type degrades to a
/// loud, unmistakable placeholder column type rather than a silent default.
fn resolve_sql_type(field: &Field) -> String {
    if let Some(db_type) = &field.db_type {
        return db_type.clone();
    }
    match field.logical_type.as_str() {
        "uuid" => "UUID".to_string(),
        "string" => format!("VARCHAR({})", field.max_length.unwrap_or(255)),
        "text" => "TEXT".to_string(),
        "integer" => "INTEGER".to_string(),
        "number" => "INTEGER".to_string(),
        "boolean" => "BOOLEAN".to_string(),
        "timestamp" => "TIMESTAMP".to_string(),
        "json" => "JSON".to_string(),
        "jsonb" => "JSONB".to_string(),
        other => other.to_uppercase(),
    }
}

/// Builds the canonical [`Model`] from a set of entity declarations.
///
/// Entities are walked in sorted-name order (the `Entities` map guarantees
/// this via `BTreeMap`'s iteration order), so table order in the resulting
/// model is deterministic and doubles as the order used to compute the hash.
pub fn build_model(entities: &Entities) -> Result<Model, ModelError> {
    let mut tables = Vec::with_capacity(entities.len());

    for (entity_name, entity) in entities {
        let table = build_table(entity_name, entity, entities)?;
        tables.push((table.name.clone(), table));
    }

    let hash = compute_model_hash(&tables);
    Ok(Model { hash, tables })
}

fn build_table(
    entity_name: &str,
    entity: &Entity,
    entities: &Entities,
) -> Result<Table, ModelError> {
    let table_name = entity
        .table
        .clone()
        .unwrap_or_else(|| pluralize(&to_snake_case(entity_name)));

    let mut columns: Vec<(String, Column)> = Vec::with_capacity(entity.fields.len());
    let mut synthesized_indexes = Vec::new();
    let mut foreign_keys = Vec::new();

    for (field_name, field) in &entity.fields {
        let column_name = field.column.clone().unwrap_or_else(|| field_name.clone());
        if columns.iter().any(|(n, _)| n == &column_name) {
            return Err(ModelError::DuplicateColumn {
                table: table_name.clone(),
                column: column_name,
            });
        }

        let column = Column {
            name: column_name.clone(),
            sql_type: resolve_sql_type(field),
            nullable: field.resolved_nullable(),
            primary: field.primary_key,
            default: field.default.clone(),
            generated: field.generated,
        };
        columns.push((column_name.clone(), column));

        if field.unique || field.index {
            synthesized_indexes.push(IndexDef {
                name: format!("{table_name}_{column_name}_idx"),
                columns: vec![column_name.clone()],
                unique: field.unique,
            });
        }

        if let Some(reference) = &field.references {
            let target = entities.get(&reference.entity).ok_or_else(|| {
                ModelError::UnknownReference {
                    entity: entity_name.to_string(),
                    field: field_name.clone(),
                    target: reference.entity.clone(),
                }
            })?;
            let ref_table = target
                .table
                .clone()
                .unwrap_or_else(|| pluralize(&to_snake_case(&reference.entity)));
            let ref_column = resolve_reference_column(target, reference.field.as_deref())
                .ok_or_else(|| ModelError::UnknownReference {
                    entity: entity_name.to_string(),
                    field: field_name.clone(),
                    target: reference.entity.clone(),
                })?;

            foreign_keys.push(ForeignKeyDef {
                name: format!("{table_name}_{column_name}_fkey"),
                columns: vec![column_name.clone()],
                ref_table,
                ref_columns: vec![ref_column],
            });
        }
    }

    let mut indexes = synthesized_indexes;
    for decl in &entity.indexes {
        let resolved_columns: Vec<String> = decl
            .fields
            .iter()
            .map(|f| {
                entity
                    .field(f)
                    .and_then(|field| field.column.clone())
                    .unwrap_or_else(|| f.clone())
            })
            .collect();
        let name = decl
            .name
            .clone()
            .unwrap_or_else(|| format!("{table_name}_{}_idx", resolved_columns.join("_")));
        indexes.push(IndexDef {
            name,
            columns: resolved_columns,
            unique: decl.unique,
        });
    }

    Ok(Table {
        name: table_name,
        columns,
        indexes,
        foreign_keys,
    })
}

fn resolve_reference_column(target: &Entity, field_name: Option<&str>) -> Option<String> {
    if let Some(name) = field_name {
        return target
            .field(name)
            .map(|f| f.column.clone().unwrap_or_else(|| name.to_string()));
    }
    target
        .fields
        .iter()
        .find(|(_, f)| f.primary_key)
        .map(|(name, f)| f.column.clone().unwrap_or_else(|| name.clone()))
}

/// Computes the content hash of a resolved table list. Indexes are sorted
/// by canonical name before hashing so that declaration order within an
/// entity (which is otherwise preserved for DDL purposes) does not affect
/// the hash; everything else is hashed in the order it already carries,
/// since table order is already the canonical sorted-entity-name order and
/// column/foreign-key order is part of the model's observable shape.
fn compute_model_hash(tables: &[(String, Table)]) -> String {
    #[derive(Serialize)]
    struct HashableTable<'a> {
        name: &'a str,
        columns: &'a [(String, Column)],
        indexes: Vec<&'a IndexDef>,
        foreign_keys: &'a [ForeignKeyDef],
    }

    let hashable: Vec<HashableTable> = tables
        .iter()
        .map(|(_, table)| {
            let mut indexes: Vec<&IndexDef> = table.indexes.iter().collect();
            indexes.sort_by(|a, b| a.name.cmp(&b.name));
            HashableTable {
                name: &table.name,
                columns: &table.columns,
                indexes,
                foreign_keys: &table.foreign_keys,
            }
        })
        .collect();

    let encoded = serde_json::to_vec(&hashable).expect("model is always serializable");
    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
