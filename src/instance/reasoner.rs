//! Pluggable reasoning strategies for instance frames.
//!
//! Every model frame carries one [`Reasoner`]. Expressions delegate to the
//! reasoner of their underlying model frame. The engine never infers
//! anything by itself: the default [`NoOpReasoner`] leaves instances as
//! instantiated.

use std::fmt;

use crate::cardinality::Cardinality;
use crate::error::KrResult;
use crate::identity::{FrameId, InstanceId, PropertyId};
use crate::model::Model;
use crate::value::{FrameType, Value, ValueType};

use super::InstanceGraph;
use super::frame::InstanceFrame;
use super::update::UpdateOps;

// ---------------------------------------------------------------------------
// Reasoner trait
// ---------------------------------------------------------------------------

/// Computes inferred types, slot structure and fixed values for instances.
///
/// Implementations must be idempotent: an update that finds nothing new to
/// do must report no change through the editor, otherwise propagation
/// cannot reach a fixed point.
pub trait Reasoner: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Called once, right after an instance is created.
    fn initialise(&self, editor: &mut InstanceEditor<'_, '_>) -> KrResult<()> {
        let _ = editor;
        Ok(())
    }

    /// Recompute the `ops` aspects of the editor's instance.
    fn update_frame(&self, editor: &mut InstanceEditor<'_, '_>, ops: UpdateOps) -> KrResult<()> {
        let _ = (editor, ops);
        Ok(())
    }
}

impl fmt::Debug for dyn Reasoner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reasoner({})", self.name())
    }
}

/// The default strategy: no inference at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReasoner;

impl Reasoner for NoOpReasoner {
    fn name(&self) -> &str {
        "no-op"
    }
}

// ---------------------------------------------------------------------------
// Instance editor
// ---------------------------------------------------------------------------

/// Editing surface handed to a reasoner, scoped to one instance. Every
/// edit reports whether it changed anything and the editor accumulates
/// those reports for the propagator.
pub struct InstanceEditor<'g, 'm> {
    graph: &'g mut InstanceGraph<'m>,
    instance: InstanceId,
    changed: bool,
}

impl<'g, 'm> InstanceEditor<'g, 'm> {
    pub(crate) fn new(graph: &'g mut InstanceGraph<'m>, instance: InstanceId) -> Self {
        Self {
            graph,
            instance,
            changed: false,
        }
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn model(&self) -> &'m Model {
        self.graph.model()
    }

    /// Read access to the whole graph, e.g. to inspect slot-value instances.
    pub fn graph(&self) -> &InstanceGraph<'m> {
        &*self.graph
    }

    pub fn frame(&self) -> KrResult<&InstanceFrame> {
        Ok(self.graph.frame(self.instance)?)
    }

    pub fn values(&self, property: PropertyId) -> KrResult<Vec<Value>> {
        self.graph.values(self.instance, property)
    }

    /// Whether any edit through this editor changed the instance.
    pub fn changed(&self) -> bool {
        self.changed
    }

    fn record(&mut self, result: KrResult<bool>) -> KrResult<bool> {
        let changed = result?;
        self.changed |= changed;
        Ok(changed)
    }

    /// Replace the inferred types; they are reduced to their most
    /// specific members.
    pub fn set_inferred_types(&mut self, types: Vec<FrameType>) -> KrResult<bool> {
        let result = self.graph.set_inferred_types(self.instance, types);
        self.record(result)
    }

    pub fn set_suggested_types(&mut self, types: Vec<FrameType>) -> KrResult<bool> {
        let result = self.graph.set_suggested_types(self.instance, types);
        self.record(result)
    }

    /// Add a derived slot with no concept-level definition.
    pub fn add_slot(
        &mut self,
        property: PropertyId,
        cardinality: Cardinality,
        value_type: ValueType,
        editable: bool,
    ) -> KrResult<bool> {
        let result = self
            .graph
            .add_derived_slot(self.instance, property, cardinality, value_type, editable);
        self.record(result)
    }

    pub fn remove_slot(&mut self, property: PropertyId) -> KrResult<bool> {
        let result = self.graph.remove_slot(self.instance, property);
        self.record(result)
    }

    /// Bring concept-level slots in line with the declared and inferred types.
    pub fn align_slots(&mut self) -> KrResult<bool> {
        let result = self.graph.align_slots(self.instance);
        self.record(result)
    }

    pub fn set_fixed_values(&mut self, property: PropertyId, values: Vec<Value>) -> KrResult<bool> {
        let result = self.graph.set_fixed_values(self.instance, property, values);
        self.record(result)
    }

    /// Narrow a slot's value-type to the union of `subs`, which must lie
    /// below the slot's declared model frame-type.
    pub fn specialise_value_type(&mut self, property: PropertyId, subs: &[FrameId]) -> KrResult<bool> {
        let result = self.graph.specialise_value_type(self.instance, property, subs);
        self.record(result)
    }

    pub fn set_slot_active(&mut self, property: PropertyId, active: bool) -> KrResult<bool> {
        let result = self.graph.set_slot_active(self.instance, property, active);
        self.record(result)
    }
}

impl fmt::Debug for InstanceEditor<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceEditor")
            .field("instance", &self.instance)
            .field("changed", &self.changed)
            .finish()
    }
}
