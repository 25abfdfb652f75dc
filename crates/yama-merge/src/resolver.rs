//! Three-way merge of concurrently edited entity declarations.
//!
//! The merge strategy is fixed ("local wins on non-conflicting changes",
//! see [`yama_config::MERGE_STRATEGY`]) rather than a per-call choice; this
//! module only ever implements that one pinned policy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use yama_core::entity::{Entities, Entity, Field, IndexDecl};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    AmbiguousChange,
    EntityRemovedButUsed,
    FieldRemovedButUsed,
    FieldTypeMismatch,
    FieldRequiredMismatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub entity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_entities: Option<Entities>,
    pub conflicts: Vec<Conflict>,
}

/// Runs the three-way merge over `base`, `local`, and `remote` entity sets.
pub fn three_way_merge(base: &Entities, local: &Entities, remote: &Entities) -> MergeOutcome {
    let mut names: Vec<&String> = base.keys().chain(local.keys()).chain(remote.keys()).collect();
    names.sort();
    names.dedup();

    let mut merged = Entities::new();
    let mut conflicts = Vec::new();

    for name in names {
        let b = base.get(name);
        let l = local.get(name);
        let r = remote.get(name);

        match (b, l, r) {
            (None, Some(lv), Some(rv)) => {
                if effective_table(name, lv) != effective_table(name, rv) {
                    conflicts.push(Conflict {
                        kind: ConflictKind::AmbiguousChange,
                        entity: name.clone(),
                        field: None,
                        detail: format!(
                            "local declares table {:?}, remote declares table {:?}",
                            effective_table(name, lv),
                            effective_table(name, rv)
                        ),
                    });
                } else {
                    merge_entity(name, None, Some(lv), Some(rv), &mut merged, &mut conflicts);
                }
            }
            (Some(bv), None, Some(rv)) => {
                if rv != bv {
                    conflicts.push(Conflict {
                        kind: ConflictKind::EntityRemovedButUsed,
                        entity: name.clone(),
                        field: None,
                        detail: "removed locally but modified remotely".into(),
                    });
                } else {
                    debug!(entity = %name, "entity removed locally, unchanged remotely");
                }
            }
            (Some(bv), Some(lv), None) => {
                if lv != bv {
                    conflicts.push(Conflict {
                        kind: ConflictKind::EntityRemovedButUsed,
                        entity: name.clone(),
                        field: None,
                        detail: "removed remotely but modified locally".into(),
                    });
                } else {
                    debug!(entity = %name, "entity removed remotely, unchanged locally");
                }
            }
            (Some(_), Some(lv), Some(rv)) => {
                merge_entity(name, b, Some(lv), Some(rv), &mut merged, &mut conflicts);
            }
            (None, Some(lv), None) => {
                merged.insert(name.clone(), lv.clone());
            }
            (None, None, Some(rv)) => {
                merged.insert(name.clone(), rv.clone());
            }
            (Some(_), None, None) => {
                debug!(entity = %name, "entity removed on both sides");
            }
            (None, None, None) => unreachable!("name came from the union of non-empty maps"),
        }
    }

    if conflicts.is_empty() {
        MergeOutcome {
            success: true,
            merged_entities: Some(merged),
            conflicts,
        }
    } else {
        MergeOutcome {
            success: false,
            merged_entities: None,
            conflicts,
        }
    }
}

fn effective_table(entity_name: &str, entity: &Entity) -> String {
    entity.table.clone().unwrap_or_else(|| to_snake_case(entity_name))
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

fn merge_entity(
    name: &str,
    base: Option<&Entity>,
    local: Option<&Entity>,
    remote: Option<&Entity>,
    merged: &mut Entities,
    conflicts: &mut Vec<Conflict>,
) {
    let local = local.expect("merge_entity always called with a local side");
    let remote = remote.expect("merge_entity always called with a remote side");

    let mut field_names: Vec<&String> = base
        .map(|e| e.fields.iter().map(|(n, _)| n).collect::<Vec<_>>())
        .unwrap_or_default()
        .into_iter()
        .chain(local.fields.iter().map(|(n, _)| n))
        .chain(remote.fields.iter().map(|(n, _)| n))
        .collect();
    field_names.sort();
    field_names.dedup();

    let mut fields: Vec<(String, Field)> = Vec::new();
    let entity_conflicts_before = conflicts.len();

    for field_name in field_names {
        let b = base.and_then(|e| e.field(field_name));
        let l = local.field(field_name);
        let r = remote.field(field_name);

        match (b, l, r) {
            (Some(bf), None, Some(rf)) => {
                if rf != bf {
                    conflicts.push(Conflict {
                        kind: ConflictKind::FieldRemovedButUsed,
                        entity: name.to_string(),
                        field: Some(field_name.clone()),
                        detail: "removed locally but modified remotely".into(),
                    });
                }
            }
            (Some(bf), Some(lf), None) => {
                if lf != bf {
                    conflicts.push(Conflict {
                        kind: ConflictKind::FieldRemovedButUsed,
                        entity: name.to_string(),
                        field: Some(field_name.clone()),
                        detail: "removed remotely but modified locally".into(),
                    });
                }
            }
            (_, Some(lf), Some(rf)) => {
                if lf == rf {
                    fields.push((field_name.clone(), lf.clone()));
                    continue;
                }

                // lf != rf here; figure out which side(s) actually diverged
                // from base before treating this as a conflict. A field
                // with no base entry (the entity itself is new on both
                // sides) counts as changed by definition.
                let local_changed = b.map(|bf| lf != bf).unwrap_or(true);
                let remote_changed = b.map(|bf| rf != bf).unwrap_or(true);

                if local_changed && !remote_changed {
                    fields.push((field_name.clone(), lf.clone()));
                } else if remote_changed && !local_changed {
                    fields.push((field_name.clone(), rf.clone()));
                } else if lf.logical_type != rf.logical_type {
                    conflicts.push(Conflict {
                        kind: ConflictKind::FieldTypeMismatch,
                        entity: name.to_string(),
                        field: Some(field_name.clone()),
                        detail: format!(
                            "local type {:?} vs remote type {:?}",
                            lf.logical_type, rf.logical_type
                        ),
                    });
                } else if lf.resolved_nullable() != rf.resolved_nullable() {
                    conflicts.push(Conflict {
                        kind: ConflictKind::FieldRequiredMismatch,
                        entity: name.to_string(),
                        field: Some(field_name.clone()),
                        detail: "local and remote disagree on required/nullable".into(),
                    });
                } else {
                    // Non-conflicting change on both sides: local wins.
                    fields.push((field_name.clone(), lf.clone()));
                }
            }
            (_, Some(lf), None) => fields.push((field_name.clone(), lf.clone())),
            (_, None, Some(rf)) => fields.push((field_name.clone(), rf.clone())),
            (_, None, None) => {}
        }
    }

    if conflicts.len() > entity_conflicts_before {
        return;
    }

    let indexes = merge_indexes(local, remote);
    let relations = merge_relations(local, remote);
    let table = local.table.clone().or_else(|| remote.table.clone());

    merged.insert(
        name.to_string(),
        Entity {
            table,
            fields,
            indexes,
            relations,
        },
    );
}

fn index_key(decl: &IndexDecl) -> String {
    decl.name.clone().unwrap_or_else(|| decl.fields.join("_"))
}

/// Unions index declarations from both sides; on a name collision, local's
/// definition wins, matching the engine's fixed merge policy.
fn merge_indexes(local: &Entity, remote: &Entity) -> Vec<IndexDecl> {
    let mut by_key: BTreeMap<String, IndexDecl> = BTreeMap::new();
    for decl in &remote.indexes {
        by_key.insert(index_key(decl), decl.clone());
    }
    for decl in &local.indexes {
        by_key.insert(index_key(decl), decl.clone());
    }
    by_key.into_values().collect()
}

/// Merges relation maps from both sides; local wins on key collision.
fn merge_relations(local: &Entity, remote: &Entity) -> BTreeMap<String, String> {
    let mut merged = remote.relations.clone();
    merged.extend(local.relations.clone());
    merged
}
