//! Instance frames.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::identity::{InstanceId, PropertyId};
use crate::value::FrameType;

use super::slot::InstanceSlot;

/// Whether an instance stands for one individual or a set of possible ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceCategory {
    Concrete,
    Query,
}

#[derive(Debug, Clone)]
pub struct InstanceFrame {
    pub(crate) id: InstanceId,
    pub(crate) frame_type: FrameType,
    pub(crate) category: InstanceCategory,
    pub(crate) inferred_types: Vec<FrameType>,
    pub(crate) suggested_types: Vec<FrameType>,
    pub(crate) slots: BTreeMap<PropertyId, InstanceSlot>,
    /// Slots on other instances currently holding this one as a value.
    pub(crate) referencing_slots: BTreeSet<(InstanceId, PropertyId)>,
}

impl InstanceFrame {
    pub(crate) fn new(id: InstanceId, frame_type: FrameType, category: InstanceCategory) -> Self {
        Self {
            id,
            frame_type,
            category,
            inferred_types: Vec::new(),
            suggested_types: Vec::new(),
            slots: BTreeMap::new(),
            referencing_slots: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// The type the instance was created with.
    pub fn frame_type(&self) -> &FrameType {
        &self.frame_type
    }

    pub fn category(&self) -> InstanceCategory {
        self.category
    }

    pub fn is_query(&self) -> bool {
        self.category == InstanceCategory::Query
    }

    pub fn inferred_types(&self) -> &[FrameType] {
        &self.inferred_types
    }

    pub fn suggested_types(&self) -> &[FrameType] {
        &self.suggested_types
    }

    /// Declared type followed by inferred types.
    pub fn types(&self) -> impl Iterator<Item = &FrameType> {
        std::iter::once(&self.frame_type).chain(self.inferred_types.iter())
    }

    pub fn slot(&self, property: PropertyId) -> Option<&InstanceSlot> {
        self.slots.get(&property)
    }

    pub fn slots(&self) -> impl Iterator<Item = &InstanceSlot> {
        self.slots.values()
    }

    pub fn referencing_slots(&self) -> impl Iterator<Item = (InstanceId, PropertyId)> + '_ {
        self.referencing_slots.iter().copied()
    }

    /// Instances holding this one in at least one slot.
    pub fn referencing_frames(&self) -> BTreeSet<InstanceId> {
        self.referencing_slots.iter().map(|(i, _)| *i).collect()
    }
}
