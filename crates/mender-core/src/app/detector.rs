//! Gap detection: desired state minus actual state.
//!
//! Pure. Output is sorted by (entity id, period, task type order).

use crate::domain::{Gap, InventorySnapshot, WorkKey};

/// Every (entity, period, task type) that is demanded but has no artifact.
///
/// A task type is demanded when it is in `snapshot.task_types` and applies to
/// the entity's class. Entities are assumed to be resolved already.
pub fn detect(snapshot: &InventorySnapshot) -> Vec<Gap> {
    let mut gaps = Vec::new();

    for (entity_id, period) in snapshot.availability.keys() {
        let Some(entity) = snapshot.entities.get(entity_id) else {
            continue;
        };
        for &task_type in &snapshot.task_types {
            if !entity.applies(task_type) {
                continue;
            }
            let key = WorkKey::new(entity_id.clone(), *period, task_type);
            if !snapshot.has_artifact(&key) {
                gaps.push(Gap::new(entity.clone(), *period, task_type));
            }
        }
    }

    gaps.sort_by(|a, b| a.key.cmp(&b.key));
    tracing::debug!(gaps = gaps.len(), "gap detection finished");
    gaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Entity, EntityId, Period, Quarter, TaskType};
    use std::collections::BTreeSet;

    fn entity(id: &str, types: &[TaskType]) -> Entity {
        Entity {
            id: EntityId::from(id),
            code: format!("E{id}"),
            name: format!("Entity {id}"),
            class: "bank".into(),
            task_types: types.to_vec(),
        }
    }

    fn snapshot(pairs: &[(&str, Period)], artifacts: &[(&str, Period, TaskType)]) -> InventorySnapshot {
        let mut snap = InventorySnapshot {
            task_types: TaskType::ALL.to_vec(),
            ..InventorySnapshot::default()
        };
        for (id, period) in pairs {
            snap.entities
                .insert(EntityId::from(*id), entity(id, &TaskType::ALL));
            snap.availability
                .insert((EntityId::from(*id), *period), BTreeSet::new());
        }
        for (id, period, t) in artifacts {
            snap.artifacts
                .insert(WorkKey::new(EntityId::from(*id), *period, *t));
        }
        snap
    }

    const Q1: Period = Period {
        year: 2024,
        quarter: Quarter::Q1,
    };
    const Q2: Period = Period {
        year: 2024,
        quarter: Quarter::Q2,
    };

    #[test]
    fn emits_one_gap_per_missing_task_type() {
        let gaps = detect(&snapshot(&[("1", Q1)], &[]));
        let types: Vec<TaskType> = gaps.iter().map(Gap::task_type).collect();
        assert_eq!(types, vec![TaskType::Extract, TaskType::Report]);
    }

    #[test]
    fn existing_artifacts_are_not_gaps() {
        let gaps = detect(&snapshot(&[("1", Q1)], &[("1", Q1, TaskType::Extract)]));
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].task_type(), TaskType::Report);
    }

    #[test]
    fn output_is_sorted_by_entity_period_task_type() {
        let mut snap = snapshot(&[("2", Q1), ("1", Q2), ("1", Q1)], &[]);
        snap.task_types = vec![TaskType::Report, TaskType::Extract];
        let keys: Vec<String> = detect(&snap).iter().map(|g| g.key.to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "1/2024-Q1/extract",
                "1/2024-Q1/report",
                "1/2024-Q2/extract",
                "1/2024-Q2/report",
                "2/2024-Q1/extract",
                "2/2024-Q1/report",
            ]
        );
    }

    #[test]
    fn class_restricts_applicable_task_types() {
        let mut snap = snapshot(&[("1", Q1)], &[]);
        snap.entities
            .insert(EntityId::from("1"), entity("1", &[TaskType::Report]));
        let gaps = detect(&snap);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].task_type(), TaskType::Report);
    }

    #[test]
    fn every_pair_has_either_artifact_or_gap() {
        let snap = snapshot(
            &[("1", Q1), ("1", Q2), ("2", Q1)],
            &[("1", Q1, TaskType::Extract), ("2", Q1, TaskType::Report)],
        );
        let gaps: BTreeSet<WorkKey> = detect(&snap).into_iter().map(|g| g.key).collect();

        for (id, period) in snap.availability.keys() {
            for &t in &snap.task_types {
                let key = WorkKey::new(id.clone(), *period, t);
                assert!(
                    snap.has_artifact(&key) ^ gaps.contains(&key),
                    "{key} must be exactly one of artifact/gap"
                );
            }
        }
    }

    #[test]
    fn detection_is_repeatable() {
        let snap = snapshot(&[("1", Q1), ("2", Q2)], &[("2", Q2, TaskType::Extract)]);
        assert_eq!(detect(&snap), detect(&snap));
    }

    #[test]
    fn empty_inventory_has_no_gaps() {
        assert!(detect(&InventorySnapshot::default()).is_empty());
    }
}
