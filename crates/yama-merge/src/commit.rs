//! Turns a successful [`crate::MergeOutcome`] into durable state: a merge
//! snapshot parented on the base hash, plus a local→merged and a
//! remote→merged transition, each carrying the diff planner's step list.

use chrono::Utc;

use yama_core::entity::Entities;
use yama_core::{build_model, plan};
use yama_store::{Snapshot, SnapshotMetadata, SnapshotStore, Transition, TransitionMetadata, TransitionStore};

use crate::error::MergeError;
use crate::resolver::MergeOutcome;

/// Persists the merge result. Returns `None` if the merge reported
/// conflicts; the caller should surface those rather than commit anything.
pub fn commit_merge(
    outcome: &MergeOutcome,
    local_entities: &Entities,
    remote_entities: &Entities,
    base_hash: &str,
    snapshots: &SnapshotStore,
    transitions: &TransitionStore,
) -> Result<Option<Snapshot>, MergeError> {
    let Some(merged_entities) = &outcome.merged_entities else {
        return Ok(None);
    };

    let local_model = build_model(local_entities)?;
    let remote_model = build_model(remote_entities)?;
    let merged_model = build_model(merged_entities)?;

    let metadata = SnapshotMetadata {
        created_at: Utc::now(),
        created_by: None,
        description: Some(format!(
            "merge of {} and {}",
            local_model.hash, remote_model.hash
        )),
    };
    let snapshot = Snapshot::new(merged_entities.clone(), Some(base_hash.to_string()), metadata)?;
    snapshots.save(&snapshot)?;

    for from_model in [&local_model, &remote_model] {
        if from_model.hash == merged_model.hash {
            continue;
        }
        let steps = plan(from_model, &merged_model);
        let transition = Transition::new(
            from_model.hash.clone(),
            merged_model.hash.clone(),
            steps,
            TransitionMetadata {
                description: None,
                created_at: Utc::now(),
            },
        );
        transitions.save(&transition)?;
    }

    Ok(Some(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::three_way_merge;
    use yama_core::entity::{Entity, Field};

    fn field(logical_type: &str) -> Field {
        Field {
            logical_type: logical_type.into(),
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

    #[test]
    fn commit_merge_writes_a_snapshot_and_two_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = SnapshotStore::new(dir.path());
        let transitions = TransitionStore::new(dir.path());

        let mut base = Entities::new();
        base.insert(
            "User".into(),
            Entity {
                table: None,
                fields: vec![("id".into(), field("uuid"))],
                indexes: vec![],
                relations: Default::default(),
            },
        );
        let mut local = base.clone();
        local.get_mut("User").unwrap().fields.push(("name".into(), field("text")));
        let mut remote = base.clone();
        remote.get_mut("User").unwrap().fields.push(("age".into(), field("integer")));

        let base_model = build_model(&base).unwrap();
        let outcome = three_way_merge(&base, &local, &remote);
        assert!(outcome.success);

        let snapshot = commit_merge(&outcome, &local, &remote, &base_model.hash, &snapshots, &transitions)
            .unwrap()
            .unwrap();

        assert_eq!(snapshot.parent_hash, Some(base_model.hash));
        assert!(snapshots.exists(&snapshot.hash));

        let graph = transitions.graph().unwrap();
        assert!(graph.predecessors(&snapshot.hash).len() == 2);
    }
}
