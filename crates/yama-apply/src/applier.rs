//! The migration applier: resolves a DAG path, validates it against the
//! environment's recorded state, classifies and gates it on policy, stages
//! safety collateral for destructive steps, compiles SQL through the
//! plugin, and applies it -- transactionally when the plugin supports it,
//! step-by-step with a synthesized rollback plan otherwise.

use chrono::Utc;
use tracing::{error, info, warn};

use yama_collateral::{BackupStore, BackupTrigger, DataSnapshotStore, ShadowColumn, ShadowColumnStore};
use yama_core::{
    analyze_impact, apply_policy, build_model, classify_plan, rollback, Environment, ImpactAnalysis,
    SafetyLevel, Step,
};
use yama_plugin::{MigrationPlugin, MigrationRecord};
use yama_store::{EnvironmentStore, SnapshotStore, TransitionStore};

use crate::error::ApplyError;

pub struct ApplyRequest<'a> {
    pub from_snapshot: Option<&'a str>,
    pub to_snapshot: &'a str,
    pub environment: &'a str,
    pub environment_level: Environment,
    pub allow_dangerous: bool,
    pub shadow_retention_days: i64,
    pub backup_retention_policy: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplyReport {
    pub level: SafetyLevel,
    pub warnings: Vec<String>,
    pub sql_checksum: String,
    pub steps_applied: usize,
    pub shadow_columns: Vec<ShadowColumn>,
    pub impact: ImpactAnalysis,
}

pub struct Applier<'a> {
    pub snapshots: &'a SnapshotStore,
    pub transitions: &'a TransitionStore,
    pub environments: &'a EnvironmentStore,
    pub shadows: &'a ShadowColumnStore,
    pub data_snapshots: &'a DataSnapshotStore,
    pub backups: &'a BackupStore,
    pub plugin: &'a dyn MigrationPlugin,
}

impl<'a> Applier<'a> {
    pub fn apply(&self, request: &ApplyRequest) -> Result<ApplyReport, ApplyError> {
        let from_hash = request.from_snapshot.unwrap_or_default();
        let graph = self.transitions.graph()?;
        let path = graph
            .find_path(from_hash, request.to_snapshot)
            .ok_or_else(|| ApplyError::NoPath {
                from: from_hash.to_string(),
                to: request.to_snapshot.to_string(),
            })?;

        let current = self.environments.get(request.environment)?;
        let current_hash = current.as_ref().and_then(|s| s.current_snapshot.as_deref());
        if current_hash != request.from_snapshot {
            return Err(ApplyError::HashMismatch {
                environment: request.environment.to_string(),
                expected: from_hash.to_string(),
                actual: current_hash.map(str::to_string),
            });
        }

        let mut steps: Vec<Step> = Vec::new();
        for transition_hash in &path.transition_sequence {
            let transition = self.transitions.load(transition_hash)?;
            steps.extend(transition.steps);
        }

        let level = classify_plan(&steps);
        let impact = analyze_impact(&steps);
        let decision = apply_policy(request.environment_level, level, steps.len(), request.allow_dangerous);
        if decision.blocked {
            return Err(ApplyError::PolicyRejected {
                environment: request.environment.to_string(),
                level: level.to_string(),
                warnings: decision.warnings,
            });
        }
        for warning in &decision.warnings {
            warn!(environment = request.environment, %warning, "policy warning");
        }

        let shadow_columns = self.stage_collateral(&steps, request)?;

        let caps = self.plugin.capabilities();
        let applicable_steps: Vec<&Step> = steps
            .iter()
            .filter(|s| !(matches!(s, Step::DropColumn { .. }) && caps.shadow_columns && !caps.drop_column))
            .collect();
        let owned_steps: Vec<Step> = applicable_steps.into_iter().cloned().collect();
        let plan = self.plugin.generate_sql(&owned_steps);

        let record = MigrationRecord {
            name: format!("{}_{}", request.to_snapshot, Utc::now().format("%Y%m%d%H%M%S")),
            migration_type: "schema".to_string(),
            from_model_hash: request.from_snapshot.map(str::to_string),
            to_model_hash: request.to_snapshot.to_string(),
            checksum: plan.checksum(),
            description: None,
        };

        let applied = if caps.transactional_ddl {
            self.apply_transactional(&plan, &record)?
        } else {
            self.apply_step_by_step(&plan, &record, &owned_steps, from_hash)?
        };

        self.environments.update_state(request.environment, request.to_snapshot)?;
        info!(
            environment = request.environment,
            to = request.to_snapshot,
            steps = applied,
            "migration applied"
        );

        Ok(ApplyReport {
            level,
            warnings: decision.warnings,
            sql_checksum: record.checksum,
            steps_applied: applied,
            shadow_columns,
            impact,
        })
    }

    fn stage_collateral(&self, steps: &[Step], request: &ApplyRequest) -> Result<Vec<ShadowColumn>, ApplyError> {
        let caps = self.plugin.capabilities();
        let destructive = steps.iter().any(is_destructive);
        if destructive {
            self.backups.record(
                request.to_snapshot,
                BackupTrigger::SchemaTransition,
                &[],
                request.backup_retention_policy,
                None,
            )?;
        }

        let mut shadow_columns = Vec::new();
        for step in steps {
            match step {
                Step::DropColumn { table, column } if caps.shadow_columns && !caps.drop_column => {
                    let shadow = self.shadows.create(
                        table,
                        column,
                        request.to_snapshot,
                        request.shadow_retention_days,
                    )?;
                    shadow_columns.push(shadow);
                }
                Step::DropTable { table } => {
                    self.data_snapshots.record(table, request.to_snapshot)?;
                }
                _ => {}
            }
        }
        Ok(shadow_columns)
    }

    fn apply_transactional(
        &self,
        plan: &yama_plugin::SqlPlan,
        record: &MigrationRecord,
    ) -> Result<usize, ApplyError> {
        self.plugin.begin().map_err(|source| ApplyError::PluginFailure {
            step: 0,
            total: plan.sql.len(),
            source,
        })?;
        for (i, stmt) in plan.sql.iter().enumerate() {
            if let Err(source) = self.plugin.execute(stmt) {
                let _ = self.plugin.rollback_transaction();
                return Err(ApplyError::PluginFailure {
                    step: i,
                    total: plan.sql.len(),
                    source,
                });
            }
        }
        if let Err(source) = self.plugin.record_migration(record) {
            let _ = self.plugin.rollback_transaction();
            return Err(ApplyError::PluginFailure {
                step: plan.sql.len(),
                total: plan.sql.len(),
                source,
            });
        }
        self.plugin.commit().map_err(|source| ApplyError::PluginFailure {
            step: plan.sql.len(),
            total: plan.sql.len(),
            source,
        })?;
        Ok(plan.sql.len())
    }

    /// Applies step-by-step; on a mid-plan failure, synthesizes the inverse
    /// of the steps that did succeed and replays them downward from the
    /// last successful step.
    fn apply_step_by_step(
        &self,
        plan: &yama_plugin::SqlPlan,
        record: &MigrationRecord,
        forward_steps: &[Step],
        from_hash: &str,
    ) -> Result<usize, ApplyError> {
        for (i, stmt) in plan.sql.iter().enumerate() {
            if let Err(source) = self.plugin.execute(stmt) {
                error!(step = i, "plugin failed applying step, rolling back");
                self.rollback_applied(forward_steps, i, from_hash)?;
                return Err(ApplyError::PluginFailure {
                    step: i,
                    total: plan.sql.len(),
                    source,
                });
            }
        }
        self.plugin.record_migration(record).map_err(|source| ApplyError::PluginFailure {
            step: plan.sql.len(),
            total: plan.sql.len(),
            source,
        })?;
        Ok(plan.sql.len())
    }

    fn rollback_applied(&self, forward_steps: &[Step], succeeded: usize, from_hash: &str) -> Result<(), ApplyError> {
        if succeeded == 0 || from_hash.is_empty() {
            return Ok(());
        }
        let from_snapshot = self.snapshots.load(from_hash)?;
        let from_model = build_model(&from_snapshot.entities)?;
        let inverse = rollback(&forward_steps[..succeeded], &from_model);
        let inverse_plan = self.plugin.generate_sql(&inverse);
        for (i, stmt) in inverse_plan.sql.iter().enumerate() {
            if let Err(source) = self.plugin.execute(stmt) {
                return Err(ApplyError::FatalDuringRollback { step: i, source });
            }
        }
        Ok(())
    }
}

fn is_destructive(step: &Step) -> bool {
    matches!(
        step,
        Step::DropTable { .. } | Step::DropColumn { .. } | Step::DropIndex { .. } | Step::DropForeignKey { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use yama_core::entity::{Entities, Entity, Field};
    use yama_core::{build_model, diff};
    use yama_plugin::SqlitePlugin;
    use yama_store::{Snapshot, SnapshotMetadata, TransitionMetadata};

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

    struct Fixture {
        _dir: tempfile::TempDir,
        snapshots: SnapshotStore,
        transitions: TransitionStore,
        environments: EnvironmentStore,
        shadows: ShadowColumnStore,
        data_snapshots: DataSnapshotStore,
        backups: BackupStore,
        plugin: SqlitePlugin,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        Fixture {
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

    #[test]
    fn first_migration_creates_the_table_and_advances_environment_state() {
        let fx = fixture();
        let entities = user_entities();
        let model = build_model(&entities).unwrap();
        let snapshot = Snapshot::new(
            entities,
            None,
            SnapshotMetadata {
                created_at: Utc::now(),
                created_by: None,
                description: None,
            },
        )
        .unwrap();
        fx.snapshots.save(&snapshot).unwrap();

        let empty_model = yama_core::Model::empty();
        let steps = diff::plan(&empty_model, &model);
        let transition = yama_store::Transition::new(
            String::new(),
            snapshot.hash.clone(),
            steps,
            TransitionMetadata {
                description: None,
                created_at: Utc::now(),
            },
        );
        fx.transitions.save(&transition).unwrap();

        let applier = Applier {
            snapshots: &fx.snapshots,
            transitions: &fx.transitions,
            environments: &fx.environments,
            shadows: &fx.shadows,
            data_snapshots: &fx.data_snapshots,
            backups: &fx.backups,
            plugin: &fx.plugin,
        };

        let report = applier
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
        let state = fx.environments.get("development").unwrap().unwrap();
        assert_eq!(state.current_snapshot, Some(snapshot.hash.clone()));
        assert_eq!(fx.plugin.installed_hash().unwrap(), Some(snapshot.hash));
    }

    #[test]
    fn hash_mismatch_is_rejected() {
        let fx = fixture();
        fx.environments.update_state("production", "stale").unwrap();

        let applier = Applier {
            snapshots: &fx.snapshots,
            transitions: &fx.transitions,
            environments: &fx.environments,
            shadows: &fx.shadows,
            data_snapshots: &fx.data_snapshots,
            backups: &fx.backups,
            plugin: &fx.plugin,
        };

        let err = applier
            .apply(&ApplyRequest {
                from_snapshot: None,
                to_snapshot: "abc123",
                environment: "production",
                environment_level: Environment::Production,
                allow_dangerous: false,
                shadow_retention_days: 30,
                backup_retention_policy: "30d",
            })
            .unwrap_err();
        assert!(matches!(err, ApplyError::HashMismatch { .. }));
    }
}
