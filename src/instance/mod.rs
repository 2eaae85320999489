//! The instance layer.
//!
//! An [`InstanceGraph`] holds instance frames created from the types of one
//! completed [`Model`]. Instance slots mirror the merged concept-level
//! slots of the instance's types and keep two value lists: values asserted
//! by the client and fixed values supplied by the model or a reasoner.
//!
//! Every client mutation validates before it mutates, then (in auto-update
//! mode) propagates backward through the instances holding the changed
//! instance as a value until the reasoners report no further change.
//! Slot events reach subscribed listeners once propagation has settled.

pub mod frame;
pub mod listener;
pub mod reasoner;
pub mod slot;
pub mod update;

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use crate::cardinality::Cardinality;
use crate::error::{AccessError, KrResult};
use crate::identity::{FrameId, InstanceId, PropertyId};
use crate::model::Model;
use crate::model::slot::ConceptSlot;
use crate::setalgo::most_specific;
use crate::value::{FrameType, Value, ValueContext, ValueType};

pub use frame::{InstanceCategory, InstanceFrame};
pub use listener::{ListenerId, SlotChange, SlotEvent};
pub use reasoner::{InstanceEditor, NoOpReasoner, Reasoner};
pub use slot::{InstanceSlot, SlotValueLists};
pub use update::{UpdateOp, UpdateOps, UpdateReport};

use listener::Listeners;

/// Instance frames over one model.
#[derive(Debug)]
pub struct InstanceGraph<'m> {
    model: &'m Model,
    frames: Vec<InstanceFrame>,
    listeners: Listeners,
}

impl<'m> InstanceGraph<'m> {
    pub fn new(model: &'m Model) -> Self {
        Self {
            model,
            frames: Vec::new(),
            listeners: Listeners::default(),
        }
    }

    pub fn model(&self) -> &'m Model {
        self.model
    }

    /// Whether mutations propagate immediately.
    pub fn auto_update(&self) -> bool {
        self.model.config().auto_update
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn instances(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.frames.iter().map(|f| f.id)
    }

    pub fn frame(&self, instance: InstanceId) -> Result<&InstanceFrame, AccessError> {
        self.frames
            .get(instance.index())
            .ok_or_else(|| AccessError::UnknownInstance {
                instance: instance.to_string(),
            })
    }

    fn frame_mut(&mut self, instance: InstanceId) -> Result<&mut InstanceFrame, AccessError> {
        self.frames
            .get_mut(instance.index())
            .ok_or_else(|| AccessError::UnknownInstance {
                instance: instance.to_string(),
            })
    }

    pub fn slot(&self, instance: InstanceId, property: PropertyId) -> Result<&InstanceSlot, AccessError> {
        self.frame(instance)?
            .slots
            .get(&property)
            .ok_or_else(|| self.unknown_slot(instance, property))
    }

    fn slot_mut(&mut self, instance: InstanceId, property: PropertyId) -> Result<&mut InstanceSlot, AccessError> {
        let missing = self.unknown_slot(instance, property);
        self.frame_mut(instance)?
            .slots
            .get_mut(&property)
            .ok_or(missing)
    }

    fn unknown_slot(&self, instance: InstanceId, property: PropertyId) -> AccessError {
        AccessError::UnknownInstanceSlot {
            instance: instance.to_string(),
            property: self.model.property_label(property),
        }
    }

    /// Human-readable rendering of an instance with its type.
    pub fn describe_instance(&self, instance: InstanceId) -> String {
        match self.frame(instance) {
            Ok(frame) => format!("{instance} ({})", self.model.describe(&frame.frame_type)),
            Err(_) => instance.to_string(),
        }
    }

    /// Declared and inferred types of an instance.
    pub fn instance_types(&self, instance: InstanceId) -> KrResult<Vec<FrameType>> {
        Ok(self.frame(instance)?.types().cloned().collect())
    }

    /// Whether `frame_type` subsumes the declared or an inferred type of
    /// `instance`.
    pub fn instance_subsumed_by(&self, frame_type: &FrameType, instance: InstanceId) -> bool {
        self.frame(instance)
            .is_ok_and(|f| f.types().any(|t| self.model.subsumes(frame_type, t)))
    }

    // -----------------------------------------------------------------------
    // Instantiation
    // -----------------------------------------------------------------------

    /// Create a concrete instance of `frame_type`.
    pub fn instantiate(&mut self, frame_type: impl Into<FrameType>) -> KrResult<InstanceId> {
        self.create(frame_type.into(), InstanceCategory::Concrete)
    }

    /// Create a query instance; disjunctions are accepted here.
    pub fn instantiate_query(&mut self, frame_type: impl Into<FrameType>) -> KrResult<InstanceId> {
        self.create(frame_type.into(), InstanceCategory::Query)
    }

    fn create(&mut self, frame_type: FrameType, category: InstanceCategory) -> KrResult<InstanceId> {
        let query = category == InstanceCategory::Query;
        if !self.model.instantiable(&frame_type, query) {
            return Err(AccessError::NotInstantiable {
                frame: self.model.describe(&frame_type),
            }
            .into());
        }
        let slots = self.model.merged_slots(&frame_type)?;
        let defaults = self.model.merged_slot_values(&frame_type);

        let id = InstanceId(self.frames.len() as u32);
        let mut frame = InstanceFrame::new(id, frame_type.clone(), category);
        for (property, concept) in &slots {
            frame.slots.insert(*property, InstanceSlot::from_concept(concept));
        }
        self.frames.push(frame);

        if let Err(err) = self.initialise(id, defaults) {
            self.discard_last(id);
            return Err(err);
        }
        tracing::debug!(instance = %id, frame_type = %self.model.describe(&frame_type), query, "instantiated");
        self.settle(id)?;
        Ok(id)
    }

    fn initialise(&mut self, id: InstanceId, defaults: BTreeMap<PropertyId, Vec<Value>>) -> KrResult<()> {
        for (property, values) in defaults {
            if self.slot(id, property).is_ok() {
                self.install_defaults(id, property, values)?;
            }
        }
        let reasoner = self.model.reasoner_for(&self.frame(id)?.frame_type);
        let mut editor = InstanceEditor::new(self, id);
        reasoner.initialise(&mut editor)
    }

    /// Undo a failed instantiation of the most recent instance.
    fn discard_last(&mut self, id: InstanceId) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        for (property, slot) in &frame.slots {
            self.sync_back_refs(id, *property, &slot.values.instance_refs(), &BTreeSet::new());
        }
        self.listeners.discard_for(id);
    }

    // -----------------------------------------------------------------------
    // Client slot-value access
    // -----------------------------------------------------------------------

    /// Visible values: fixed values plus non-redundant asserted values.
    pub fn values(&self, instance: InstanceId, property: PropertyId) -> KrResult<Vec<Value>> {
        Ok(self.slot(instance, property)?.values.visible(self))
    }

    pub fn asserted_values(&self, instance: InstanceId, property: PropertyId) -> KrResult<&[Value]> {
        Ok(self.slot(instance, property)?.asserted())
    }

    pub fn fixed_values(&self, instance: InstanceId, property: PropertyId) -> KrResult<&[Value]> {
        Ok(self.slot(instance, property)?.fixed())
    }

    /// Assert a value. Returns `false` when the value adds nothing.
    pub fn add_value(&mut self, instance: InstanceId, property: PropertyId, value: impl Into<Value>) -> KrResult<bool> {
        let value = value.into();
        let slot = self.slot(instance, property)?;
        self.check_editable(slot)?;
        self.check_assertable(instance, slot, &value)?;
        let label = self.model.property_label(property);
        let Some(next) = slot.values.plan_add(&*self, slot.cardinality(), &value, &label)? else {
            return Ok(false);
        };
        self.commit_asserted(instance, property, next)?;
        Ok(true)
    }

    /// Retract an asserted value. Returns `false` when it was not asserted.
    pub fn remove_value(&mut self, instance: InstanceId, property: PropertyId, value: &Value) -> KrResult<bool> {
        let slot = self.slot(instance, property)?;
        self.check_editable(slot)?;
        let Some(next) = slot.values.plan_remove(value) else {
            return Ok(false);
        };
        self.commit_asserted(instance, property, next)?;
        Ok(true)
    }

    /// Replace all asserted values. Either every value is accepted or the
    /// slot is left untouched.
    pub fn replace_values(
        &mut self,
        instance: InstanceId,
        property: PropertyId,
        values: impl IntoIterator<Item = Value>,
    ) -> KrResult<bool> {
        let slot = self.slot(instance, property)?;
        self.check_editable(slot)?;
        let label = self.model.property_label(property);
        let mut scratch = SlotValueLists {
            asserted: Vec::new(),
            fixed: slot.values.fixed.clone(),
        };
        for value in values {
            self.check_assertable(instance, slot, &value)?;
            if let Some(next) = scratch.plan_add(&*self, slot.cardinality(), &value, &label)? {
                scratch.asserted = next;
            }
        }
        let current = &slot.values.asserted;
        if scratch.asserted.len() == current.len() && scratch.asserted.iter().all(|v| current.contains(v)) {
            return Ok(false);
        }
        self.commit_asserted(instance, property, scratch.asserted)?;
        Ok(true)
    }

    /// Retract every asserted value.
    pub fn clear_values(&mut self, instance: InstanceId, property: PropertyId) -> KrResult<bool> {
        let slot = self.slot(instance, property)?;
        self.check_editable(slot)?;
        if slot.values.asserted.is_empty() {
            return Ok(false);
        }
        self.commit_asserted(instance, property, Vec::new())?;
        Ok(true)
    }

    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&SlotEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(Box::new(listener))
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    fn check_editable(&self, slot: &InstanceSlot) -> Result<(), AccessError> {
        let property = || self.model.property_label(slot.property());
        if !slot.active() {
            return Err(AccessError::InactiveSlot { property: property() });
        }
        if !slot.editable() {
            return Err(AccessError::NonEditableSlot { property: property() });
        }
        Ok(())
    }

    /// Type, abstraction-level and instance-category checks for one value.
    fn check_assertable(&self, instance: InstanceId, slot: &InstanceSlot, value: &Value) -> Result<(), AccessError> {
        if !self.conforms(slot.value_type(), value) {
            return Err(AccessError::InvalidValueType {
                property: self.model.property_label(slot.property()),
            });
        }
        let container = self.frame(instance)?;
        if !container.is_query() && is_abstract(slot.value_type(), value) {
            return Err(AccessError::AbstractValue {
                property: self.model.property_label(slot.property()),
            });
        }
        self.check_mixing(container, value)
    }

    fn check_mixing(&self, container: &InstanceFrame, value: &Value) -> Result<(), AccessError> {
        let Some(held) = value.instance() else {
            return Ok(());
        };
        if !container.is_query() && self.frame(held)?.is_query() {
            return Err(AccessError::QueryValueInConcrete {
                container: self.describe_instance(container.id),
                value: self.describe_instance(held),
            });
        }
        Ok(())
    }

    fn commit_asserted(&mut self, instance: InstanceId, property: PropertyId, asserted: Vec<Value>) -> KrResult<()> {
        if self.frame(instance)?.is_query() {
            self.promote_connected(asserted.iter().filter_map(Value::instance));
        }
        self.store_asserted(instance, property, asserted)?;
        self.listeners.queue(SlotEvent {
            instance,
            property,
            change: SlotChange::Asserted,
        });
        self.settle(instance)
    }

    /// Propagate when in auto-update mode, then deliver queued events.
    fn settle(&mut self, trigger: InstanceId) -> KrResult<()> {
        let result = if self.auto_update() {
            let ops = self.model.config().update_ops();
            self.propagate(trigger, ops).map(|_| ())
        } else {
            Ok(())
        };
        self.flush_events();
        result
    }

    pub(crate) fn flush_events(&mut self) {
        self.listeners.flush();
    }

    // -----------------------------------------------------------------------
    // Bookkeeping shared by client and reasoner edits
    // -----------------------------------------------------------------------

    fn store_asserted(&mut self, instance: InstanceId, property: PropertyId, asserted: Vec<Value>) -> Result<(), AccessError> {
        let slot = self.slot_mut(instance, property)?;
        let before = slot.values.instance_refs();
        slot.values.asserted = asserted;
        let after = slot.values.instance_refs();
        self.sync_back_refs(instance, property, &before, &after);
        Ok(())
    }

    fn store_lists(&mut self, instance: InstanceId, property: PropertyId, lists: SlotValueLists) -> Result<(), AccessError> {
        let slot = self.slot_mut(instance, property)?;
        let before = slot.values.instance_refs();
        slot.values = lists;
        let after = slot.values.instance_refs();
        self.sync_back_refs(instance, property, &before, &after);
        Ok(())
    }

    fn sync_back_refs(
        &mut self,
        holder: InstanceId,
        property: PropertyId,
        before: &BTreeSet<InstanceId>,
        after: &BTreeSet<InstanceId>,
    ) {
        for gone in before.difference(after) {
            if let Some(frame) = self.frames.get_mut(gone.index()) {
                frame.referencing_slots.remove(&(holder, property));
            }
        }
        for added in after.difference(before) {
            if let Some(frame) = self.frames.get_mut(added.index()) {
                frame.referencing_slots.insert((holder, property));
            }
        }
    }

    /// Promote every concrete instance connected to `seeds` through
    /// slot-values, in either direction, to query status.
    fn promote_connected(&mut self, seeds: impl IntoIterator<Item = InstanceId>) -> usize {
        let mut stack: Vec<InstanceId> = seeds.into_iter().collect();
        let mut promoted = 0;
        while let Some(id) = stack.pop() {
            let Some(frame) = self.frames.get_mut(id.index()) else {
                continue;
            };
            if frame.is_query() {
                continue;
            }
            frame.category = InstanceCategory::Query;
            promoted += 1;
            for slot in frame.slots.values() {
                stack.extend(slot.values.instance_refs());
            }
            stack.extend(frame.referencing_frames());
        }
        if promoted > 0 {
            tracing::debug!(promoted, "promoted instances to query status");
        }
        promoted
    }

    /// Asserted values that survive a change of slot definition, replanned
    /// in order against the new cardinality and value-type.
    fn replan_asserted(
        &self,
        lists: &SlotValueLists,
        cardinality: Cardinality,
        value_type: &ValueType,
        property: &str,
    ) -> Vec<Value> {
        let mut scratch = SlotValueLists {
            asserted: Vec::new(),
            fixed: lists.fixed.clone(),
        };
        for value in lists.conforming(self, value_type) {
            if let Ok(Some(next)) = scratch.plan_add(self, cardinality, &value, property) {
                scratch.asserted = next;
            }
        }
        let pruned = lists.asserted.len().saturating_sub(scratch.asserted.len());
        if pruned > 0 {
            tracing::warn!(property, pruned, "pruned asserted values after slot change");
        }
        scratch.asserted
    }

    // -----------------------------------------------------------------------
    // Reasoner edits (reached through InstanceEditor)
    // -----------------------------------------------------------------------

    pub(crate) fn update_frame_once(&mut self, instance: InstanceId, ops: UpdateOps) -> KrResult<bool> {
        let frame = self.frame(instance)?;
        let ops = if frame.is_query() {
            ops.without(UpdateOp::SlotValues)
        } else {
            ops
        };
        if ops.is_empty() {
            return Ok(false);
        }
        let reasoner = self.model.reasoner_for(&frame.frame_type);
        let mut editor = InstanceEditor::new(self, instance);
        reasoner.update_frame(&mut editor, ops)?;
        if editor.changed() {
            tracing::trace!(instance = %instance, reasoner = reasoner.name(), "reasoner changed instance");
        }
        Ok(editor.changed())
    }

    fn reduce_types(&self, types: Vec<FrameType>) -> Vec<FrameType> {
        let mut distinct: Vec<FrameType> = Vec::with_capacity(types.len());
        for t in types {
            if !distinct.contains(&t) {
                distinct.push(t);
            }
        }
        most_specific(distinct, |a, b| self.model.subsumes(a, b))
    }

    pub(crate) fn set_inferred_types(&mut self, instance: InstanceId, types: Vec<FrameType>) -> KrResult<bool> {
        let reduced = self.reduce_types(types);
        let frame = self.frame_mut(instance)?;
        if frame.inferred_types == reduced {
            return Ok(false);
        }
        frame.inferred_types = reduced;
        Ok(true)
    }

    pub(crate) fn set_suggested_types(&mut self, instance: InstanceId, types: Vec<FrameType>) -> KrResult<bool> {
        let reduced = self.reduce_types(types);
        let frame = self.frame_mut(instance)?;
        if frame.suggested_types == reduced {
            return Ok(false);
        }
        frame.suggested_types = reduced;
        Ok(true)
    }

    pub(crate) fn add_derived_slot(
        &mut self,
        instance: InstanceId,
        property: PropertyId,
        cardinality: Cardinality,
        value_type: ValueType,
        editable: bool,
    ) -> KrResult<bool> {
        self.model.property(property)?;
        for mentioned in value_type.mentioned_frames() {
            self.model.frame(mentioned)?;
        }
        let frame = self.frame_mut(instance)?;
        if frame.slots.contains_key(&property) {
            return Ok(false);
        }
        frame
            .slots
            .insert(property, InstanceSlot::new_derived(property, cardinality, value_type, editable));
        self.queue_structure(instance, property);
        Ok(true)
    }

    pub(crate) fn remove_slot(&mut self, instance: InstanceId, property: PropertyId) -> KrResult<bool> {
        let frame = self.frame_mut(instance)?;
        let Some(slot) = frame.slots.remove(&property) else {
            return Ok(false);
        };
        self.sync_back_refs(instance, property, &slot.values.instance_refs(), &BTreeSet::new());
        self.queue_structure(instance, property);
        Ok(true)
    }

    /// Bring concept-level slots in line with the declared and inferred
    /// types. New or redefined slots take the merged default values as
    /// fixed values; derived slots are left alone.
    pub(crate) fn align_slots(&mut self, instance: InstanceId) -> KrResult<bool> {
        let types: Vec<FrameType> = self.frame(instance)?.types().cloned().collect();
        let mut merged: BTreeMap<PropertyId, ConceptSlot> = BTreeMap::new();
        let mut defaults: BTreeMap<PropertyId, Vec<Value>> = BTreeMap::new();
        for frame_type in &types {
            for (property, slot) in self.model.merged_slots(frame_type)? {
                match merged.entry(property) {
                    Entry::Vacant(e) => {
                        e.insert(slot);
                    }
                    Entry::Occupied(mut e) => {
                        let combined = e.get().merge(&slot, self.model)?;
                        e.insert(combined);
                    }
                }
            }
            for (property, values) in self.model.merged_slot_values(frame_type) {
                defaults.entry(property).or_default().extend(values);
            }
        }

        let mut changed = false;
        let stale: Vec<PropertyId> = self
            .frame(instance)?
            .slots
            .iter()
            .filter(|(p, s)| !s.derived() && !merged.contains_key(*p))
            .map(|(p, _)| *p)
            .collect();
        for property in stale {
            changed |= self.remove_slot(instance, property)?;
        }

        for (property, concept) in &merged {
            let state = self
                .frame(instance)?
                .slots
                .get(property)
                .map(|s| (s.derived(), s.matches_concept(concept), s.model_defaults().to_vec()));
            let (redefine, recorded) = match state {
                Some((true, ..)) => continue,
                Some((false, matches, recorded)) => (!matches, Some(recorded)),
                None => (true, None),
            };
            if redefine {
                self.install_concept_slot(instance, *property, concept)?;
                changed = true;
            }
            let values = defaults.remove(property).unwrap_or_default();
            let values = most_specific(values, |a, b| self.value_subsumes(a, b));
            if redefine || recorded.as_deref() != Some(values.as_slice()) {
                changed |= self.install_defaults(instance, *property, values)?;
            }
        }
        Ok(changed)
    }

    /// Fix the model-level defaults of a slot, remembering them so later
    /// alignment only touches fixed values when the defaults change.
    fn install_defaults(&mut self, instance: InstanceId, property: PropertyId, values: Vec<Value>) -> KrResult<bool> {
        let changed = self.set_fixed_values(instance, property, values.clone())?;
        self.slot_mut(instance, property)?.set_model_defaults(values);
        Ok(changed)
    }

    fn install_concept_slot(&mut self, instance: InstanceId, property: PropertyId, concept: &ConceptSlot) -> KrResult<()> {
        let existing = self.frame(instance)?.slots.get(&property).map(|s| s.values.clone());
        match existing {
            None => {
                self.frame_mut(instance)?
                    .slots
                    .insert(property, InstanceSlot::from_concept(concept));
            }
            Some(lists) => {
                let label = self.model.property_label(property);
                let kept = self.replan_asserted(&lists, concept.cardinality(), concept.value_type(), &label);
                self.slot_mut(instance, property)?.realign(concept);
                self.store_asserted(instance, property, kept)?;
            }
        }
        self.queue_structure(instance, property);
        Ok(())
    }

    /// Replace a slot's fixed values, pruning asserted values they make
    /// redundant or conflicting.
    pub(crate) fn set_fixed_values(&mut self, instance: InstanceId, property: PropertyId, values: Vec<Value>) -> KrResult<bool> {
        let slot = self.slot(instance, property)?;
        let container = self.frame(instance)?;
        for value in &values {
            if !self.conforms(slot.value_type(), value) {
                return Err(AccessError::InvalidValueType {
                    property: self.model.property_label(property),
                }
                .into());
            }
            self.check_mixing(container, value)?;
        }
        let label = self.model.property_label(property);
        let plan = slot.values.plan_fixed(&*self, slot.cardinality(), values, &label)?;
        if plan.fixed == slot.values.fixed && plan.asserted == slot.values.asserted {
            return Ok(false);
        }
        if container.is_query() {
            let held: Vec<InstanceId> = plan.fixed.iter().filter_map(Value::instance).collect();
            self.promote_connected(held);
        }
        if plan.pruned > 0 {
            tracing::warn!(
                instance = %instance,
                property = %label,
                pruned = plan.pruned,
                "pruned asserted values covered by fixed values"
            );
        }
        self.store_lists(
            instance,
            property,
            SlotValueLists {
                asserted: plan.asserted,
                fixed: plan.fixed,
            },
        )?;
        self.listeners.queue(SlotEvent {
            instance,
            property,
            change: SlotChange::Fixed,
        });
        Ok(true)
    }

    pub(crate) fn specialise_value_type(
        &mut self,
        instance: InstanceId,
        property: PropertyId,
        subs: &[FrameId],
    ) -> KrResult<bool> {
        let slot = self.slot(instance, property)?;
        let base = slot.base_value_type().as_frame_type()?;
        let FrameType::Model(super_frame) = base else {
            return Err(AccessError::WrongValueTypeKind {
                expected: "model frame-type",
                actual: base.kind_name(),
            }
            .into());
        };
        let synthetic = self.model.synthetic_value_type(*super_frame, subs)?;
        let value_type = ValueType::Frame(synthetic.value_type().clone());
        if slot.value_type() == &value_type {
            return Ok(false);
        }
        let label = self.model.property_label(property);
        let kept = self.replan_asserted(&slot.values, slot.cardinality(), &value_type, &label);
        self.slot_mut(instance, property)?.set_value_type(value_type);
        self.store_asserted(instance, property, kept)?;
        self.queue_structure(instance, property);
        Ok(true)
    }

    pub(crate) fn set_slot_active(&mut self, instance: InstanceId, property: PropertyId, active: bool) -> KrResult<bool> {
        let slot = self.slot_mut(instance, property)?;
        if slot.active() == active {
            return Ok(false);
        }
        slot.set_active(active);
        self.queue_structure(instance, property);
        Ok(true)
    }

    fn queue_structure(&mut self, instance: InstanceId, property: PropertyId) {
        self.listeners.queue(SlotEvent {
            instance,
            property,
            change: SlotChange::Structure,
        });
    }
}

/// Type values in frame-typed slots, and non-concrete extensions anywhere,
/// are abstract: they describe sets of individuals rather than one.
fn is_abstract(value_type: &ValueType, value: &Value) -> bool {
    match value {
        Value::Frame(t) => match value_type {
            ValueType::Frame(_) => !t.concrete(),
            _ => matches!(t, FrameType::Extension(e) if !e.concrete()),
        },
        _ => false,
    }
}

impl ValueContext for InstanceGraph<'_> {
    fn value_subsumes(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Frame(t), Value::Instance(i)) => self.instance_subsumed_by(t, *i),
            _ => self.model.model_value_subsumes(a, b),
        }
    }

    fn value_type_of(&self, value: &Value) -> Option<ValueType> {
        match value {
            Value::Instance(i) => self
                .frame(*i)
                .ok()
                .map(|f| ValueType::Frame(f.frame_type.clone())),
            _ => self.model.value_type_of(value),
        }
    }

    fn value_type_subsumes(&self, a: &ValueType, b: &ValueType) -> bool {
        self.model.value_type_subsumes(a, b)
    }

    fn conforms(&self, value_type: &ValueType, value: &Value) -> bool {
        match (value_type, value) {
            (ValueType::Frame(t), Value::Instance(i)) => self.instance_subsumed_by(t, *i),
            _ => self.model.model_value_conforms(value_type, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::builder::{ModelBuilder, ModelEditor, SectionBuilder};
    use crate::config::ModelConfig;
    use crate::error::{KrError, ModelError, UpdateError};
    use crate::identity::Identity;
    use crate::model::extension::Extension;
    use crate::value::{Number, NumberKind, NumberType};

    /// Root -> Animal -> Dog, Colour -> {Red, Brown}, Person.
    /// Animal.legs: single-value integer; Dog.legs default 4.
    /// Animal.colour: unique-types Colour; Animal.friends: free Animal.
    /// Person.pets: free Animal; Person.pack: unique-types Animal.
    struct Zoo;

    impl SectionBuilder for Zoo {
        fn build(&mut self, editor: &mut ModelEditor<'_>) -> KrResult<()> {
            let root = editor.root();
            let animal = editor.add_frame(Identity::from_id("Animal"), false)?;
            let dog = editor.add_frame(Identity::from_id("Dog"), false)?;
            let colour = editor.add_frame(Identity::from_id("Colour"), false)?;
            let red = editor.add_frame(Identity::from_id("Red"), false)?;
            let brown = editor.add_frame(Identity::from_id("Brown"), false)?;
            let person = editor.add_frame(Identity::from_id("Person"), false)?;
            editor.add_super(animal, root)?;
            editor.add_super(dog, animal)?;
            editor.add_super(colour, root)?;
            editor.add_super(red, colour)?;
            editor.add_super(brown, colour)?;
            editor.add_super(person, root)?;

            let legs = editor.add_property(Identity::from_id("legs"))?;
            let coat = editor.add_property(Identity::from_id("coat"))?;
            let friends = editor.add_property(Identity::from_id("friends"))?;
            let pets = editor.add_property(Identity::from_id("pets"))?;
            let pack = editor.add_property(Identity::from_id("pack"))?;
            editor.add_slot(
                animal,
                legs,
                Cardinality::SingleValue,
                NumberType::unbounded(NumberKind::Integer).into(),
            )?;
            editor.add_slot(animal, coat, Cardinality::UniqueTypes, colour.into())?;
            editor.add_slot(animal, friends, Cardinality::Free, animal.into())?;
            editor.add_slot(person, pets, Cardinality::Free, animal.into())?;
            editor.add_slot(person, pack, Cardinality::UniqueTypes, animal.into())?;
            editor.add_slot_value(dog, legs, Number::Int(4).into())?;
            Ok(())
        }
    }

    fn zoo(config: ModelConfig) -> Model {
        let mut builder = ModelBuilder::new(config);
        builder.register(Zoo);
        builder.build().unwrap();
        builder.into_model().unwrap()
    }

    fn f(model: &Model, id: &str) -> FrameId {
        model.frame_by_identifier(id).unwrap()
    }

    fn p(model: &Model, id: &str) -> PropertyId {
        model.property_by_identifier(id).unwrap()
    }

    #[test]
    fn instance_mirrors_merged_slots_and_defaults() {
        let model = zoo(ModelConfig::default());
        let mut graph = InstanceGraph::new(&model);
        let rex = graph.instantiate(f(&model, "Dog")).unwrap();
        let legs = p(&model, "legs");
        assert_eq!(graph.values(rex, legs).unwrap(), vec![Value::Number(Number::Int(4))]);
        assert!(graph.slot(rex, p(&model, "coat")).is_ok());
        assert!(graph.slot(rex, p(&model, "pets")).is_err());
    }

    #[test]
    fn root_and_disjunction_not_concretely_instantiable() {
        let model = zoo(ModelConfig::default());
        let mut graph = InstanceGraph::new(&model);
        assert!(matches!(
            graph.instantiate(model.root()),
            Err(KrError::Access(AccessError::NotInstantiable { .. }))
        ));
        let either = crate::model::disjunction::Disjunction::resolve(
            &model,
            [FrameType::Model(f(&model, "Dog")), FrameType::Model(f(&model, "Person"))],
        )
        .unwrap();
        assert!(graph.instantiate(either.clone()).is_err());
        assert!(graph.instantiate_query(either).is_ok());
    }

    #[test]
    fn add_then_remove_restores_visible_values() {
        let model = zoo(ModelConfig::default());
        let mut graph = InstanceGraph::new(&model);
        let rex = graph.instantiate(f(&model, "Dog")).unwrap();
        let coat = p(&model, "coat");
        let before = graph.values(rex, coat).unwrap();
        let red = Extension::create(&model, f(&model, "Red").into(), BTreeMap::new(), true).unwrap();
        let red_value = Value::Frame(red);
        assert!(graph.add_value(rex, coat, red_value.clone()).unwrap());
        assert_eq!(graph.values(rex, coat).unwrap(), vec![red_value.clone()]);
        assert!(graph.remove_value(rex, coat, &red_value).unwrap());
        assert_eq!(graph.values(rex, coat).unwrap(), before);
    }

    #[test]
    fn abstract_type_value_rejected_in_concrete_instance() {
        let model = zoo(ModelConfig::default());
        let mut graph = InstanceGraph::new(&model);
        let rex = graph.instantiate(f(&model, "Dog")).unwrap();
        let coat = p(&model, "coat");
        let err = graph.add_value(rex, coat, f(&model, "Red")).unwrap_err();
        assert!(matches!(err, KrError::Access(AccessError::AbstractValue { .. })));

        let query = graph.instantiate_query(f(&model, "Dog")).unwrap();
        assert!(graph.add_value(query, coat, f(&model, "Red")).unwrap());
    }

    #[test]
    fn value_outside_value_type_rejected() {
        let model = zoo(ModelConfig::default());
        let mut graph = InstanceGraph::new(&model);
        let rex = graph.instantiate(f(&model, "Dog")).unwrap();
        let err = graph.add_value(rex, p(&model, "legs"), f(&model, "Red")).unwrap_err();
        assert!(matches!(err, KrError::Access(AccessError::InvalidValueType { .. })));
    }

    #[test]
    fn single_value_slot_with_fixed_value_rejects_other_values() {
        let model = zoo(ModelConfig::default());
        let mut graph = InstanceGraph::new(&model);
        let rex = graph.instantiate(f(&model, "Dog")).unwrap();
        let legs = p(&model, "legs");
        assert!(!graph.add_value(rex, legs, Number::Int(4)).unwrap());
        let err = graph.add_value(rex, legs, Number::Int(3)).unwrap_err();
        assert!(matches!(err, KrError::Access(AccessError::CardinalityViolation { .. })));
    }

    #[test]
    fn unique_types_slot_rejects_second_value_of_same_type() {
        let model = zoo(ModelConfig::default());
        let mut graph = InstanceGraph::new(&model);
        let pack = p(&model, "pack");
        let owner = graph.instantiate(f(&model, "Person")).unwrap();
        let rex = graph.instantiate(f(&model, "Dog")).unwrap();
        let fido = graph.instantiate(f(&model, "Dog")).unwrap();
        let tom = graph.instantiate(f(&model, "Animal")).unwrap();

        assert!(graph.add_value(owner, pack, rex).unwrap());
        let err = graph.add_value(owner, pack, fido).unwrap_err();
        assert!(matches!(err, KrError::Access(AccessError::CardinalityViolation { .. })));
        assert_eq!(graph.values(owner, pack).unwrap(), vec![Value::Instance(rex)]);
        assert!(graph.frame(fido).unwrap().referencing_frames().is_empty());

        // A value of a related type displaces the narrower one.
        assert!(graph.add_value(owner, pack, tom).unwrap());
        assert_eq!(graph.values(owner, pack).unwrap(), vec![Value::Instance(tom)]);
        assert!(graph.frame(rex).unwrap().referencing_frames().is_empty());
    }

    #[test]
    fn instance_values_maintain_back_references() {
        let model = zoo(ModelConfig::default());
        let mut graph = InstanceGraph::new(&model);
        let rex = graph.instantiate(f(&model, "Dog")).unwrap();
        let fido = graph.instantiate(f(&model, "Dog")).unwrap();
        let friends = p(&model, "friends");
        graph.add_value(rex, friends, fido).unwrap();
        assert_eq!(graph.frame(fido).unwrap().referencing_frames(), BTreeSet::from([rex]));
        graph.clear_values(rex, friends).unwrap();
        assert!(graph.frame(fido).unwrap().referencing_frames().is_empty());
    }

    #[test]
    fn query_value_rejected_in_concrete_container() {
        let model = zoo(ModelConfig::default());
        let mut graph = InstanceGraph::new(&model);
        let rex = graph.instantiate(f(&model, "Dog")).unwrap();
        let any_dog = graph.instantiate_query(f(&model, "Dog")).unwrap();
        let err = graph.add_value(rex, p(&model, "friends"), any_dog).unwrap_err();
        assert!(matches!(err, KrError::Access(AccessError::QueryValueInConcrete { .. })));
    }

    #[test]
    fn concrete_value_in_query_promotes_connected_instances() {
        let model = zoo(ModelConfig::default());
        let mut graph = InstanceGraph::new(&model);
        let friends = p(&model, "friends");
        let rex = graph.instantiate(f(&model, "Dog")).unwrap();
        let fido = graph.instantiate(f(&model, "Dog")).unwrap();
        let owner = graph.instantiate(f(&model, "Person")).unwrap();
        graph.add_value(rex, friends, fido).unwrap();
        graph.add_value(owner, p(&model, "pets"), rex).unwrap();

        let query = graph.instantiate_query(f(&model, "Dog")).unwrap();
        graph.add_value(query, friends, fido).unwrap();
        for id in [rex, fido, owner] {
            assert!(graph.frame(id).unwrap().is_query());
        }
    }

    #[test]
    fn replace_is_all_or_nothing() {
        let model = zoo(ModelConfig::default());
        let mut graph = InstanceGraph::new(&model);
        let rex = graph.instantiate(f(&model, "Dog")).unwrap();
        let fido = graph.instantiate(f(&model, "Dog")).unwrap();
        let friends = p(&model, "friends");
        graph.add_value(rex, friends, fido).unwrap();
        let bad = vec![Value::Instance(rex), Value::Frame(f(&model, "Red").into())];
        assert!(graph.replace_values(rex, friends, bad).is_err());
        assert_eq!(graph.asserted_values(rex, friends).unwrap(), &[Value::Instance(fido)]);
    }

    #[test]
    fn reordered_replace_changes_nothing() {
        let model = zoo(ModelConfig::default());
        let mut graph = InstanceGraph::new(&model);
        let rex = graph.instantiate(f(&model, "Dog")).unwrap();
        let fido = graph.instantiate(f(&model, "Dog")).unwrap();
        let tom = graph.instantiate(f(&model, "Dog")).unwrap();
        let friends = p(&model, "friends");
        graph
            .replace_values(rex, friends, vec![Value::Instance(fido), Value::Instance(tom)])
            .unwrap();

        let seen: Arc<Mutex<Vec<SlotEvent>>> = Arc::default();
        let sink = Arc::clone(&seen);
        graph.subscribe(move |e| sink.lock().unwrap().push(*e));
        let reordered = vec![Value::Instance(tom), Value::Instance(fido)];
        assert!(!graph.replace_values(rex, friends, reordered).unwrap());
        assert_eq!(
            graph.asserted_values(rex, friends).unwrap(),
            &[Value::Instance(fido), Value::Instance(tom)]
        );
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn listeners_see_events_after_settling() {
        let model = zoo(ModelConfig::default());
        let mut graph = InstanceGraph::new(&model);
        let rex = graph.instantiate(f(&model, "Dog")).unwrap();
        let fido = graph.instantiate(f(&model, "Dog")).unwrap();
        let seen: Arc<Mutex<Vec<SlotEvent>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let handle = graph.subscribe(move |e| sink.lock().unwrap().push(*e));
        let friends = p(&model, "friends");
        graph.add_value(rex, friends, fido).unwrap();
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[SlotEvent {
                instance: rex,
                property: friends,
                change: SlotChange::Asserted
            }]
        );
        assert!(graph.unsubscribe(handle));
        graph.clear_values(rex, friends).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn manual_update_rejected_in_auto_mode() {
        let model = zoo(ModelConfig::default());
        let mut graph = InstanceGraph::new(&model);
        let rex = graph.instantiate(f(&model, "Dog")).unwrap();
        assert!(matches!(
            graph.update(rex, UpdateOps::ALL),
            Err(KrError::Access(AccessError::ManualUpdateDisabled))
        ));
    }

    /// Counts its invocations and fixes `legs` to the number of friends.
    struct FriendCounter {
        legs: PropertyId,
        friends: PropertyId,
        calls: Arc<Mutex<Vec<(InstanceId, UpdateOps)>>>,
    }

    impl Reasoner for FriendCounter {
        fn name(&self) -> &str {
            "friend-counter"
        }

        fn update_frame(&self, editor: &mut InstanceEditor<'_, '_>, ops: UpdateOps) -> KrResult<()> {
            self.calls.lock().unwrap().push((editor.instance(), ops));
            if !ops.contains(UpdateOp::SlotValues) {
                return Ok(());
            }
            let count = editor.values(self.friends)?.len() as i64;
            editor.set_fixed_values(self.legs, vec![Value::Number(Number::Int(count))])?;
            Ok(())
        }
    }

    fn counting_model(config: ModelConfig) -> (Model, Arc<Mutex<Vec<(InstanceId, UpdateOps)>>>) {
        let mut builder = ModelBuilder::new(config);
        builder.register(Zoo);
        builder.build().unwrap();
        let calls: Arc<Mutex<Vec<(InstanceId, UpdateOps)>>> = Arc::default();
        {
            let mut editor = builder.editor().unwrap();
            let model = editor.model();
            let animal = f(model, "Animal");
            let reasoner = FriendCounter {
                legs: p(model, "legs"),
                friends: p(model, "friends"),
                calls: Arc::clone(&calls),
            };
            editor
                .frame_editor(animal)
                .unwrap()
                .set_reasoner(Arc::new(reasoner))
                .unwrap();
        }
        builder.build().unwrap();
        (builder.into_model().unwrap(), calls)
    }

    #[test]
    fn reasoner_fixed_values_follow_asserted_changes() {
        let (model, _) = counting_model(ModelConfig::default());
        let mut graph = InstanceGraph::new(&model);
        let animal = f(&model, "Animal");
        let a = graph.instantiate(animal).unwrap();
        let b = graph.instantiate(animal).unwrap();
        let legs = p(&model, "legs");
        let friends = p(&model, "friends");
        assert_eq!(graph.fixed_values(a, legs).unwrap(), &[Value::Number(Number::Int(0))]);
        graph.add_value(a, friends, b).unwrap();
        assert_eq!(graph.fixed_values(a, legs).unwrap(), &[Value::Number(Number::Int(1))]);
    }

    #[test]
    fn propagation_terminates_on_reference_cycles() {
        let (model, calls) = counting_model(ModelConfig::default());
        let mut graph = InstanceGraph::new(&model);
        let animal = f(&model, "Animal");
        let friends = p(&model, "friends");
        let a = graph.instantiate(animal).unwrap();
        let b = graph.instantiate(animal).unwrap();
        graph.add_value(a, friends, b).unwrap();
        graph.add_value(b, friends, a).unwrap();
        calls.lock().unwrap().clear();
        graph.add_value(a, friends, a).unwrap();
        let calls = calls.lock().unwrap();
        // each pass visits a and b once; the second pass is quiet
        assert!(calls.len() <= 4);
        assert!(calls.iter().any(|(i, _)| *i == b));
    }

    #[test]
    fn manual_mode_defers_until_update() {
        let (model, calls) = counting_model(ModelConfig::manual());
        let mut graph = InstanceGraph::new(&model);
        let animal = f(&model, "Animal");
        let friends = p(&model, "friends");
        let legs = p(&model, "legs");
        let a = graph.instantiate(animal).unwrap();
        let b = graph.instantiate(animal).unwrap();
        graph.add_value(a, friends, b).unwrap();
        assert!(calls.lock().unwrap().is_empty());
        assert!(graph.fixed_values(a, legs).unwrap().is_empty());

        let report = graph.update(a, UpdateOps::ALL).unwrap();
        assert!(report.changed);
        assert_eq!(graph.fixed_values(a, legs).unwrap(), &[Value::Number(Number::Int(1))]);
    }

    #[test]
    fn query_instances_never_receive_slot_value_updates() {
        let (model, calls) = counting_model(ModelConfig::default());
        let mut graph = InstanceGraph::new(&model);
        let q = graph.instantiate_query(f(&model, "Animal")).unwrap();
        let calls = calls.lock().unwrap();
        assert!(calls.iter().filter(|(i, _)| *i == q).all(|(_, ops)| !ops.contains(UpdateOp::SlotValues)));
        assert!(graph.fixed_values(q, p(&model, "legs")).unwrap().is_empty());
    }

    /// Flips a fixed value on every call, so it never settles.
    struct Restless(PropertyId);

    impl Reasoner for Restless {
        fn name(&self) -> &str {
            "restless"
        }

        fn update_frame(&self, editor: &mut InstanceEditor<'_, '_>, _: UpdateOps) -> KrResult<()> {
            let next = match editor.frame()?.slot(self.0).map(|s| s.fixed().len()) {
                Some(0) => vec![Value::Number(Number::Int(1))],
                _ => Vec::new(),
            };
            editor.set_fixed_values(self.0, next)?;
            Ok(())
        }
    }

    #[test]
    fn non_convergent_reasoner_hits_pass_limit() {
        let config = ModelConfig {
            max_update_passes: 8,
            ..ModelConfig::default()
        };
        let mut builder = ModelBuilder::new(config);
        builder.register(Zoo);
        builder.build().unwrap();
        {
            let mut editor = builder.editor().unwrap();
            let person = f(editor.model(), "Person");
            let legs = p(editor.model(), "legs");
            editor
                .add_slot(person, legs, Cardinality::Free, NumberType::unbounded(NumberKind::Integer).into())
                .unwrap();
            editor
                .frame_editor(person)
                .unwrap()
                .set_reasoner(Arc::new(Restless(legs)))
                .unwrap();
        }
        builder.build().unwrap();
        let model = builder.into_model().unwrap();
        let mut graph = InstanceGraph::new(&model);
        let err = graph.instantiate(f(&model, "Person")).unwrap_err();
        assert!(matches!(err, KrError::Update(UpdateError::NoConvergence { passes: 8 })));
    }

    /// Infers Dog for every animal and narrows `coat` to Brown.
    struct Classifier {
        dog: FrameId,
        brown: FrameId,
        coat: PropertyId,
    }

    impl Reasoner for Classifier {
        fn name(&self) -> &str {
            "classifier"
        }

        fn update_frame(&self, editor: &mut InstanceEditor<'_, '_>, ops: UpdateOps) -> KrResult<()> {
            if ops.contains(UpdateOp::InferredTypes) {
                editor.set_inferred_types(vec![FrameType::Model(self.dog)])?;
            }
            if ops.contains(UpdateOp::SlotStructure) {
                editor.align_slots()?;
                editor.specialise_value_type(self.coat, &[self.brown])?;
            }
            Ok(())
        }
    }

    #[test]
    fn reasoner_infers_types_and_specialises_slots() {
        let mut builder = ModelBuilder::new(ModelConfig::default());
        builder.register(Zoo);
        builder.build().unwrap();
        {
            let mut editor = builder.editor().unwrap();
            let model = editor.model();
            let reasoner = Classifier {
                dog: f(model, "Dog"),
                brown: f(model, "Brown"),
                coat: p(model, "coat"),
            };
            let animal = f(model, "Animal");
            editor
                .frame_editor(animal)
                .unwrap()
                .set_reasoner(Arc::new(reasoner))
                .unwrap();
        }
        builder.build().unwrap();
        let model = builder.into_model().unwrap();
        let mut graph = InstanceGraph::new(&model);
        let a = graph.instantiate(f(&model, "Animal")).unwrap();
        let dog = f(&model, "Dog");
        assert_eq!(graph.frame(a).unwrap().inferred_types(), &[FrameType::Model(dog)]);
        assert!(graph.instance_subsumed_by(&FrameType::Model(dog), a));
        // Dog's default legs arrive through slot alignment
        assert_eq!(graph.values(a, p(&model, "legs")).unwrap(), vec![Value::Number(Number::Int(4))]);
        let coat = graph.slot(a, p(&model, "coat")).unwrap();
        assert_eq!(coat.value_type(), &ValueType::Frame(FrameType::Model(f(&model, "Brown"))));
        assert_eq!(model.synthetic_count(), 1);
    }

    #[test]
    fn illegal_fixed_values_from_reasoner_abort_instantiation() {
        struct Overfill(PropertyId);
        impl Reasoner for Overfill {
            fn name(&self) -> &str {
                "overfill"
            }
            fn initialise(&self, editor: &mut InstanceEditor<'_, '_>) -> KrResult<()> {
                editor.set_fixed_values(
                    self.0,
                    vec![Value::Number(Number::Int(1)), Value::Number(Number::Int(2))],
                )?;
                Ok(())
            }
        }

        let mut builder = ModelBuilder::new(ModelConfig::default());
        builder.register(Zoo);
        builder.build().unwrap();
        {
            let mut editor = builder.editor().unwrap();
            let animal = f(editor.model(), "Animal");
            let legs = p(editor.model(), "legs");
            editor
                .frame_editor(animal)
                .unwrap()
                .set_reasoner(Arc::new(Overfill(legs)))
                .unwrap();
        }
        builder.build().unwrap();
        let model = builder.into_model().unwrap();
        let mut graph = InstanceGraph::new(&model);
        let err = graph.instantiate(f(&model, "Animal")).unwrap_err();
        assert!(matches!(err, KrError::Model(ModelError::IllegalFixedValues { .. })));
        assert!(graph.is_empty());
    }
}
