//! Reverse reference index.
//!
//! Maps each model frame to the slots whose value-type mentions it and to
//! the (owner, property) pairs whose default slot-values mention it. The
//! index is maintained alongside every slot and slot-value edit so that
//! frame removal can purge references without scanning the arena.

use std::collections::{BTreeSet, HashMap};

use crate::identity::{FrameId, PropertyId};
use crate::value::{Value, ValueType};

use super::Model;

#[derive(Debug, Default)]
pub(crate) struct ReferenceIndex {
    slot_refs: HashMap<FrameId, BTreeSet<(FrameId, PropertyId)>>,
    value_refs: HashMap<FrameId, BTreeSet<(FrameId, PropertyId)>>,
}

impl ReferenceIndex {
    pub(crate) fn index_slot(&mut self, container: FrameId, property: PropertyId, value_type: &ValueType) {
        for frame in value_type.mentioned_frames() {
            self.slot_refs
                .entry(frame)
                .or_default()
                .insert((container, property));
        }
    }

    pub(crate) fn unindex_slot(&mut self, container: FrameId, property: PropertyId, value_type: &ValueType) {
        for frame in value_type.mentioned_frames() {
            if let Some(set) = self.slot_refs.get_mut(&frame) {
                set.remove(&(container, property));
                if set.is_empty() {
                    self.slot_refs.remove(&frame);
                }
            }
        }
    }

    pub(crate) fn index_values(&mut self, owner: FrameId, property: PropertyId, values: &[Value]) {
        for frame in values.iter().flat_map(Value::mentioned_frames) {
            self.value_refs
                .entry(frame)
                .or_default()
                .insert((owner, property));
        }
    }

    /// Unindex a whole value list of one (owner, property) pair.
    pub(crate) fn unindex_values(&mut self, owner: FrameId, property: PropertyId, values: &[Value]) {
        for frame in values.iter().flat_map(Value::mentioned_frames) {
            if let Some(set) = self.value_refs.get_mut(&frame) {
                set.remove(&(owner, property));
                if set.is_empty() {
                    self.value_refs.remove(&frame);
                }
            }
        }
    }

    pub(crate) fn slots_referencing(&self, frame: FrameId) -> Vec<(FrameId, PropertyId)> {
        self.slot_refs
            .get(&frame)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn value_owners(&self, frame: FrameId) -> Vec<(FrameId, PropertyId)> {
        self.value_refs
            .get(&frame)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl Model {
    /// Slots (container, property) whose value-type mentions `frame`.
    pub fn slots_referencing(&self, frame: FrameId) -> Vec<(FrameId, PropertyId)> {
        self.references().slots_referencing(frame)
    }

    /// Default slot-values (owner, property) that mention `frame`.
    pub fn slot_values_referencing(&self, frame: FrameId) -> Vec<(FrameId, PropertyId)> {
        self.references().value_owners(frame)
    }
}

#[cfg(test)]
mod tests {
    use petgraph::stable_graph::NodeIndex;

    use super::*;
    use crate::value::FrameType;

    fn frame(i: usize) -> FrameId {
        FrameId::new(NodeIndex::new(i), i as u32)
    }

    #[test]
    fn slot_refs_follow_index_and_unindex() {
        let mut index = ReferenceIndex::default();
        let vt = ValueType::Frame(FrameType::Model(frame(3)));
        index.index_slot(frame(1), PropertyId(0), &vt);
        index.index_slot(frame(2), PropertyId(0), &vt);
        assert_eq!(
            index.slots_referencing(frame(3)),
            vec![(frame(1), PropertyId(0)), (frame(2), PropertyId(0))]
        );
        index.unindex_slot(frame(1), PropertyId(0), &vt);
        assert_eq!(index.slots_referencing(frame(3)), vec![(frame(2), PropertyId(0))]);
    }

    #[test]
    fn value_refs_cover_every_mentioned_frame() {
        let mut index = ReferenceIndex::default();
        let values = vec![Value::from(frame(4)), Value::from(frame(5))];
        index.index_values(frame(1), PropertyId(2), &values);
        assert_eq!(index.value_owners(frame(5)), vec![(frame(1), PropertyId(2))]);
        index.unindex_values(frame(1), PropertyId(2), &values);
        assert!(index.value_owners(frame(4)).is_empty());
    }
}
