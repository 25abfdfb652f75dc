//! End-to-end flows through the facade: a fresh snapshot/transition store,
//! a SQLite reference plugin, and the applier wired together the way a
//! real caller would assemble them.

use chrono::Utc;

use yama::apply::{Applier, ApplyError, ApplyRequest};
use yama::collateral::{BackupStore, DataSnapshotStore, ShadowColumnStore};
use yama::core::entity::{Entities, Entity, Field};
use yama::core::{build_model, diff, Environment, Model, SafetyLevel};
use yama::merge::{three_way_merge, ConflictKind};
use yama::plugin::SqlitePlugin;
use yama::store::{
    EnvironmentStore, Snapshot, SnapshotMetadata, SnapshotStore, Transition, TransitionMetadata,
    TransitionStore,
};

struct Harness {
    _dir: tempfile::TempDir,
    snapshots: SnapshotStore,
    transitions: TransitionStore,
    environments: EnvironmentStore,
    shadows: ShadowColumnStore,
    data_snapshots: DataSnapshotStore,
    backups: BackupStore,
    plugin: SqlitePlugin,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        Harness {
            snapshots: SnapshotStore::new(dir.path()),
            transitions: TransitionStore::new(dir.path()),
            environments: EnvironmentStore::new(dir.path()),
            shadows: ShadowColumnStore::new(dir.path()),
            data_snapshots: DataSnapshotStore::new(dir.path()),
            backups: BackupStore::new(dir.path()),
            plugin: SqlitePlugin::open_in_memory().unwrap(),
            _dir: dir,
        }
    }

    fn applier(&self) -> Applier<'_> {
        Applier {
            snapshots: &self.snapshots,
            transitions: &self.transitions,
            environments: &self.environments,
            shadows: &self.shadows,
            data_snapshots: &self.data_snapshots,
            backups: &self.backups,
            plugin: &self.plugin,
        }
    }

    /// Saves a snapshot for `entities` and the transition from `parent`
    /// (or the empty root) to it, returning the new snapshot.
    fn commit(&self, parent: Option<&Snapshot>, entities: Entities) -> Snapshot {
        let from_model = match parent {
            Some(s) => build_model(&s.entities).unwrap(),
            None => Model::empty(),
        };
        let to_model = build_model(&entities).unwrap();
        let snapshot = Snapshot::new(
            entities,
            parent.map(|s| s.hash.clone()),
            SnapshotMetadata {
                created_at: Utc::now(),
                created_by: None,
                description: None,
            },
        )
        .unwrap();
        self.snapshots.save(&snapshot).unwrap();

        let steps = diff::plan(&from_model, &to_model);
        let from_hash = parent.map(|s| s.hash.clone()).unwrap_or_default();
        let transition = Transition::new(
            from_hash,
            snapshot.hash.clone(),
            steps,
            TransitionMetadata {
                description: None,
                created_at: Utc::now(),
            },
        );
        self.transitions.save(&transition).unwrap();
        snapshot
    }
}

fn blank_field() -> Field {
    Field {
        logical_type: "string".to_string(),
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

fn user_entities() -> Entities {
    let mut entities = Entities::new();
    entities.insert(
        "User".to_string(),
        Entity {
            fields: vec![
                (
                    "id".to_string(),
                    Field {
                        logical_type: "uuid".to_string(),
                        primary_key: true,
                        ..blank_field()
                    },
                ),
                (
                    "email".to_string(),
                    Field {
                        logical_type: "string".to_string(),
                        required: Some(true),
                        unique: true,
                        ..blank_field()
                    },
                ),
            ],
            ..Default::default()
        },
    );
    entities
}

/// Flow 1: first migration on a database with no prior snapshot and no
/// tracking row. One transition from the empty root, two steps
/// (add_table, add_index), applied clean to `development`.
#[test]
fn flow1_first_migration_from_empty() {
    let h = Harness::new();
    let snapshot = h.commit(None, user_entities());

    let report = h
        .applier()
        .apply(&ApplyRequest {
            from_snapshot: None,
            to_snapshot: &snapshot.hash,
            environment: "development",
            environment_level: Environment::Development,
            allow_dangerous: false,
            shadow_retention_days: 30,
            backup_retention_policy: "30d",
        })
        .unwrap();

    assert_eq!(report.level, SafetyLevel::Safe);
    assert_eq!(report.steps_applied, 2);
    assert_eq!(report.impact.affected_tables, vec!["users".to_string()]);
    assert!(!report.impact.requires_backup);
    assert!(!report.impact.breaking);
    assert!(report.impact.reversible);
    let state = h.environments.get("development").unwrap().unwrap();
    assert_eq!(state.current_snapshot, Some(snapshot.hash.clone()));
    assert_eq!(h.plugin.installed_hash().unwrap(), Some(snapshot.hash));
}

/// Flow 2: adding a nullable column is `Safe` and applies without
/// collateral or policy warnings, even in production.
#[test]
fn flow2_add_nullable_column_is_safe_in_production() {
    let h = Harness::new();
    let base = h.commit(None, user_entities());

    let mut with_bio = base.entities.clone();
    with_bio.get_mut("User").unwrap().fields.push((
        "bio".to_string(),
        Field {
            logical_type: "text".to_string(),
            nullable: Some(true),
            ..blank_field()
        },
    ));
    let next = h.commit(Some(&base), with_bio);

    h.applier()
        .apply(&ApplyRequest {
            from_snapshot: None,
            to_snapshot: &base.hash,
            environment: "production",
            environment_level: Environment::Production,
            allow_dangerous: false,
            shadow_retention_days: 30,
            backup_retention_policy: "30d",
        })
        .unwrap();

    let report = h
        .applier()
        .apply(&ApplyRequest {
            from_snapshot: Some(&base.hash),
            to_snapshot: &next.hash,
            environment: "production",
            environment_level: Environment::Production,
            allow_dangerous: false,
            shadow_retention_days: 30,
            backup_retention_policy: "30d",
        })
        .unwrap();

    assert_eq!(report.level, SafetyLevel::Safe);
    assert!(report.warnings.is_empty());
    assert_eq!(report.steps_applied, 1);
}

/// Flow 3: dropping a column is `Dangerous`; production blocks it without
/// `allow_dangerous`, and the attempt leaves environment state untouched.
#[test]
fn flow3_drop_column_in_production_without_override_is_blocked() {
    let h = Harness::new();
    let base = h.commit(None, user_entities());
    let mut without_email = base.entities.clone();
    without_email.get_mut("User").unwrap().fields.retain(|(n, _)| n != "email");
    let next = h.commit(Some(&base), without_email);

    h.environments.update_state("production", &base.hash).unwrap();

    let err = h
        .applier()
        .apply(&ApplyRequest {
            from_snapshot: Some(&base.hash),
            to_snapshot: &next.hash,
            environment: "production",
            environment_level: Environment::Production,
            allow_dangerous: false,
            shadow_retention_days: 30,
            backup_retention_policy: "30d",
        })
        .unwrap_err();

    assert!(matches!(err, ApplyError::PolicyRejected { .. }));
    let state = h.environments.get("production").unwrap().unwrap();
    assert_eq!(state.current_snapshot, Some(base.hash));
}

/// Flow 4: concurrent non-conflicting additions to the same entity merge
/// cleanly, local and remote fields both present.
#[test]
fn flow4_three_way_merge_without_conflicts() {
    let mut base = Entities::new();
    base.insert(
        "User".to_string(),
        Entity {
            fields: vec![("id".to_string(), Field { primary_key: true, ..blank_field() })],
            ..Default::default()
        },
    );

    let mut local = base.clone();
    local.get_mut("User").unwrap().fields.push((
        "name".to_string(),
        Field { logical_type: "text".to_string(), ..blank_field() },
    ));

    let mut remote = base.clone();
    remote.get_mut("User").unwrap().fields.push((
        "age".to_string(),
        Field { logical_type: "integer".to_string(), ..blank_field() },
    ));

    let outcome = three_way_merge(&base, &local, &remote);
    assert!(outcome.success);
    let merged = outcome.merged_entities.unwrap();
    let user = merged.get("User").unwrap();
    assert!(user.field("name").is_some());
    assert!(user.field("age").is_some());
}

/// Flow 5: both sides change the same field's logical type -- a real
/// conflict the merge must refuse to resolve automatically.
#[test]
fn flow5_three_way_merge_field_type_conflict() {
    let mut base = Entities::new();
    base.insert(
        "User".to_string(),
        Entity {
            fields: vec![("age".to_string(), Field { logical_type: "integer".to_string(), ..blank_field() })],
            ..Default::default()
        },
    );

    let mut local = base.clone();
    local.get_mut("User").unwrap().fields[0].1.logical_type = "text".to_string();

    let mut remote = base.clone();
    remote.get_mut("User").unwrap().fields[0].1.logical_type = "number".to_string();

    let outcome = three_way_merge(&base, &local, &remote);
    assert!(!outcome.success);
    assert_eq!(outcome.conflicts.len(), 1);
    assert_eq!(outcome.conflicts[0].kind, ConflictKind::FieldTypeMismatch);
    assert_eq!(outcome.conflicts[0].entity, "User");
    assert_eq!(outcome.conflicts[0].field.as_deref(), Some("age"));
}

/// Flow 6: a graph with a direct edge A->C and a longer A->B->C path
/// resolves `find_path` to the direct, single-step edge.
#[test]
fn flow6_path_finding_prefers_the_direct_edge() {
    let h = Harness::new();
    let a = h.commit(None, user_entities());

    let mut with_bio = a.entities.clone();
    with_bio.get_mut("User").unwrap().fields.push((
        "bio".to_string(),
        Field { logical_type: "text".to_string(), nullable: Some(true), ..blank_field() },
    ));
    let b = h.commit(Some(&a), with_bio.clone());

    let mut with_age = with_bio;
    with_age.get_mut("User").unwrap().fields.push((
        "age".to_string(),
        Field { logical_type: "integer".to_string(), nullable: Some(true), ..blank_field() },
    ));
    let c_via_b = h.commit(Some(&b), with_age.clone());

    // A direct transition from A to the same model C reaches, bypassing B.
    let direct_steps = diff::plan(&build_model(&a.entities).unwrap(), &build_model(&with_age).unwrap());
    let direct = Transition::new(
        a.hash.clone(),
        c_via_b.hash.clone(),
        direct_steps,
        TransitionMetadata { description: None, created_at: Utc::now() },
    );
    h.transitions.save(&direct).unwrap();

    let graph = h.transitions.graph().unwrap();
    let path = graph.find_path(&a.hash, &c_via_b.hash).unwrap();
    assert_eq!(path.node_sequence, vec![a.hash.clone(), c_via_b.hash.clone()]);

    let all_paths = graph.find_all_paths(&a.hash, &c_via_b.hash);
    assert_eq!(all_paths.len(), 2);
}
