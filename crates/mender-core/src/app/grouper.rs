//! Task grouping: one group per (entity, period).

use std::collections::BTreeMap;

use crate::domain::{EntityId, Gap, Group, Period};

/// Partition gaps into groups, each ordered by declared task-type order.
///
/// Discovery order of the input does not matter. Groups come out in
/// (entity id, period) order, although nothing downstream relies on it.
pub fn group(gaps: Vec<Gap>) -> Vec<Group> {
    let mut groups: BTreeMap<(EntityId, Period), Group> = BTreeMap::new();

    for gap in gaps {
        groups
            .entry((gap.key.entity_id.clone(), gap.period()))
            .or_insert_with(|| Group {
                entity: gap.entity.clone(),
                period: gap.period(),
                gaps: Vec::new(),
            })
            .gaps
            .push(gap);
    }

    groups
        .into_values()
        .map(|mut g| {
            g.gaps.sort_by_key(Gap::task_type);
            g
        })
        .collect()
}
