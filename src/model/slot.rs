//! Concept-level slots and their merge-on-inheritance semantics.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::iter;

use crate::cardinality::Cardinality;
use crate::error::{ModelError, ModelResult};
use crate::identity::{FrameId, PropertyId};
use crate::setalgo::most_specific;
use crate::value::{fixed_values_legal, FrameType, NumberType, Value, ValueContext, ValueType};

use super::{Model, Source};

/// A (property, cardinality, value-type) triple attached to a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptSlot {
    property: PropertyId,
    cardinality: Cardinality,
    value_type: ValueType,
    source: Source,
    active: bool,
    editable: bool,
}

impl ConceptSlot {
    /// An active, editable slot.
    pub fn new(property: PropertyId, cardinality: Cardinality, value_type: ValueType) -> Self {
        Self {
            property,
            cardinality,
            value_type,
            source: Source::Unspecified,
            active: true,
            editable: true,
        }
    }

    pub fn property(&self) -> PropertyId {
        self.property
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn editable(&self) -> bool {
        self.editable
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_editable(mut self, editable: bool) -> Self {
        self.editable = editable;
        self
    }

    /// Combine two definitions of the same property: the more restrictive
    /// cardinality and the more specific value-type.
    pub fn merge(&self, other: &ConceptSlot, model: &Model) -> ModelResult<ConceptSlot> {
        let value_type = model.merge_value_types(self.property, &self.value_type, &other.value_type)?;
        Ok(ConceptSlot {
            property: self.property,
            cardinality: self.cardinality.merge(other.cardinality),
            value_type,
            source: self.source.combine(other.source),
            active: self.active && other.active,
            editable: self.editable && other.editable,
        })
    }
}

impl Model {
    /// Slot defined directly on `frame`.
    pub fn slot(&self, frame: FrameId, property: PropertyId) -> ModelResult<&ConceptSlot> {
        self.frame(frame)?
            .slots
            .get(&property)
            .ok_or_else(|| ModelError::UnknownSlot {
                frame: self.label(frame),
                property: self.property_label(property),
            })
    }

    /// The model frame whose hierarchy position supplies structure for
    /// `frame_type`.
    pub fn structure_frame(&self, frame_type: &FrameType) -> FrameId {
        match frame_type {
            FrameType::Model(f) => *f,
            FrameType::Extension(e) => e.extended(),
            FrameType::Disjunction(d) => d.subsumer(self),
        }
    }

    fn structure_sources(&self, frame_type: &FrameType) -> Vec<FrameId> {
        let base = self.structure_frame(frame_type);
        iter::once(base)
            .chain(self.structured_ancestors(base).iter().copied())
            .collect()
    }

    /// Slot set of a frame-type: the merge over its structure frame and
    /// that frame's structured ancestors.
    pub fn merged_slots(&self, frame_type: &FrameType) -> ModelResult<BTreeMap<PropertyId, ConceptSlot>> {
        let mut merged: BTreeMap<PropertyId, ConceptSlot> = BTreeMap::new();
        for frame in self.structure_sources(frame_type) {
            for (property, slot) in &self.frame(frame)?.slots {
                match merged.entry(*property) {
                    Entry::Vacant(e) => {
                        e.insert(slot.clone());
                    }
                    Entry::Occupied(mut e) => {
                        let combined = e.get().merge(slot, self)?;
                        e.insert(combined);
                    }
                }
            }
        }
        Ok(merged)
    }

    /// Default slot-values of a frame-type, reduced per property to the
    /// most specific values. An extension's own values come first.
    pub fn merged_slot_values(&self, frame_type: &FrameType) -> BTreeMap<PropertyId, Vec<Value>> {
        let mut all: BTreeMap<PropertyId, Vec<Value>> = BTreeMap::new();
        if let FrameType::Extension(e) = frame_type {
            for (property, values) in e.slot_values() {
                all.entry(*property).or_default().extend(values.iter().cloned());
            }
        }
        for frame in self.structure_sources(frame_type) {
            let Ok(node) = self.frame(frame) else {
                continue;
            };
            for (property, values) in &node.slot_values {
                all.entry(*property).or_default().extend(values.iter().cloned());
            }
        }
        all.into_iter()
            .map(|(p, values)| (p, most_specific(values, |a, b| self.model_value_subsumes(a, b))))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Value-level relations
    // -----------------------------------------------------------------------

    pub fn value_type_subsumes(&self, a: &ValueType, b: &ValueType) -> bool {
        match (a, b) {
            (ValueType::Frame(x), ValueType::Frame(y)) => self.subsumes(x, y),
            (ValueType::MetaFrame(x), ValueType::MetaFrame(y)) => self.subsumes(x, y),
            (ValueType::Number(x), ValueType::Number(y)) => x.subsumes(y),
            _ => false,
        }
    }

    /// The more specific of two value-types, or an error when unrelated.
    pub fn merge_value_types(
        &self,
        property: PropertyId,
        a: &ValueType,
        b: &ValueType,
    ) -> ModelResult<ValueType> {
        if self.value_type_subsumes(a, b) {
            Ok(b.clone())
        } else if self.value_type_subsumes(b, a) {
            Ok(a.clone())
        } else {
            Err(ModelError::IncompatibleValueTypes {
                property: self.property_label(property),
                first: self.describe_value_type(a),
                second: self.describe_value_type(b),
            })
        }
    }

    pub fn describe_value_type(&self, value_type: &ValueType) -> String {
        match value_type {
            ValueType::Frame(t) => self.describe(t),
            ValueType::MetaFrame(t) => format!("type<{}>", self.describe(t)),
            ValueType::Number(n) => n.to_string(),
        }
    }

    pub fn describe_value(&self, value: &Value) -> String {
        match value {
            Value::Instance(i) => i.to_string(),
            Value::Frame(t) => self.describe(t),
            Value::Number(n) => n.to_string(),
        }
    }

    /// Concept-level subsumption between values. Instances are opaque here.
    pub fn model_value_subsumes(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Frame(x), Value::Frame(y)) => self.subsumes(x, y),
            (Value::Number(x), Value::Number(y)) => x == y,
            (Value::Instance(x), Value::Instance(y)) => x == y,
            _ => false,
        }
    }

    /// Concept-level conformance of a default slot-value.
    pub fn model_value_conforms(&self, value_type: &ValueType, value: &Value) -> bool {
        match (value_type, value) {
            (ValueType::Frame(t), Value::Frame(v)) => self.subsumes(t, v),
            (ValueType::MetaFrame(t), Value::Frame(v)) => self.subsumes(t, v),
            (ValueType::Number(n), Value::Number(v)) => n.contains(*v),
            _ => false,
        }
    }

    /// Check a default slot-value list against the slot it fills.
    pub(crate) fn check_slot_values(
        &self,
        owner: &str,
        slot: &ConceptSlot,
        values: &[Value],
    ) -> ModelResult<()> {
        for value in values {
            let message = match value {
                Value::Instance(_) => Some("instance values cannot be model defaults".to_string()),
                v if !self.model_value_conforms(&slot.value_type, v) => Some(format!(
                    "{} does not conform to {}",
                    self.describe_value(v),
                    self.describe_value_type(&slot.value_type)
                )),
                _ => None,
            };
            if let Some(message) = message {
                return Err(ModelError::InvalidSlotValue {
                    frame: owner.to_string(),
                    property: self.property_label(slot.property),
                    message,
                });
            }
        }
        if !fixed_values_legal(self, slot.cardinality, values) {
            return Err(ModelError::IllegalFixedValues {
                property: self.property_label(slot.property),
                cardinality: slot.cardinality.to_string(),
                count: values.len(),
            });
        }
        Ok(())
    }

    /// Validate merged structure and default slot-values of one frame.
    pub(crate) fn validate_frame(&self, frame: FrameId) -> ModelResult<()> {
        let frame_type = FrameType::Model(frame);
        let slots = self.merged_slots(&frame_type)?;
        let label = self.label(frame);
        for property in self.frame(frame)?.slot_values.keys() {
            if !slots.contains_key(property) {
                return Err(ModelError::SlotValueWithoutSlot {
                    frame: label,
                    property: self.property_label(*property),
                });
            }
        }
        for (property, values) in self.merged_slot_values(&frame_type) {
            if let Some(slot) = slots.get(&property) {
                self.check_slot_values(&label, slot, &values)?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Slot edits (reached through the builder)
    // -----------------------------------------------------------------------

    /// Add a slot, merging with an existing definition of the same property.
    pub(crate) fn add_slot(&mut self, frame: FrameId, slot: ConceptSlot) -> ModelResult<()> {
        self.property(slot.property)?;
        for mentioned in slot.value_type.mentioned_frames() {
            self.frame(mentioned)?;
        }
        let property = slot.property;
        let existing = self.frame(frame)?.slots.get(&property).cloned();
        let stored = match &existing {
            Some(current) => current.merge(&slot, self)?,
            None => slot,
        };
        if let Some(current) = existing {
            self.references_mut()
                .unindex_slot(frame, property, &current.value_type);
        }
        self.references_mut()
            .index_slot(frame, property, &stored.value_type);
        self.frame_mut(frame)?.slots.insert(property, stored);
        self.invalidate();
        Ok(())
    }

    pub(crate) fn remove_slot(&mut self, frame: FrameId, property: PropertyId) -> ModelResult<bool> {
        self.frame(frame)?;
        Ok(self.purge_slot(frame, property))
    }

    /// Remove a slot without validation; returns whether it existed.
    pub(crate) fn purge_slot(&mut self, frame: FrameId, property: PropertyId) -> bool {
        let Ok(node) = self.frame_mut(frame) else {
            return false;
        };
        let Some(removed) = node.slots.remove(&property) else {
            return false;
        };
        self.references_mut()
            .unindex_slot(frame, property, &removed.value_type);
        self.invalidate();
        true
    }

    fn slot_mut(&mut self, frame: FrameId, property: PropertyId) -> ModelResult<&mut ConceptSlot> {
        let frame_label = self.label(frame);
        let property_label = self.property_label(property);
        self.frame_mut(frame)?
            .slots
            .get_mut(&property)
            .ok_or(ModelError::UnknownSlot {
                frame: frame_label,
                property: property_label,
            })
    }

    pub(crate) fn set_slot_cardinality(
        &mut self,
        frame: FrameId,
        property: PropertyId,
        cardinality: Cardinality,
    ) -> ModelResult<()> {
        self.slot_mut(frame, property)?.cardinality = cardinality;
        Ok(())
    }

    /// Replace a slot's value-type outright, keeping the index current.
    pub(crate) fn set_slot_value_type(
        &mut self,
        frame: FrameId,
        property: PropertyId,
        value_type: ValueType,
    ) -> ModelResult<()> {
        for mentioned in value_type.mentioned_frames() {
            self.frame(mentioned)?;
        }
        let old = self.slot(frame, property)?.value_type.clone();
        self.references_mut().unindex_slot(frame, property, &old);
        self.references_mut().index_slot(frame, property, &value_type);
        self.slot_mut(frame, property)?.value_type = value_type;
        self.invalidate();
        Ok(())
    }

    pub(crate) fn set_slot_active(&mut self, frame: FrameId, property: PropertyId, active: bool) -> ModelResult<()> {
        self.slot_mut(frame, property)?.active = active;
        Ok(())
    }

    pub(crate) fn set_slot_editable(
        &mut self,
        frame: FrameId,
        property: PropertyId,
        editable: bool,
    ) -> ModelResult<()> {
        self.slot_mut(frame, property)?.editable = editable;
        Ok(())
    }

    pub(crate) fn set_slot_source(&mut self, frame: FrameId, property: PropertyId, source: Source) -> ModelResult<()> {
        self.slot_mut(frame, property)?.source = source;
        Ok(())
    }

    /// Add a default slot-value. The slot may be inherited from an
    /// ancestor linked later, so its existence is checked at completion.
    pub(crate) fn add_slot_value(&mut self, frame: FrameId, property: PropertyId, value: Value) -> ModelResult<bool> {
        self.property(property)?;
        for mentioned in value.mentioned_frames() {
            self.frame(mentioned)?;
        }
        let node = self.frame_mut(frame)?;
        let values = node.slot_values.entry(property).or_default();
        if values.contains(&value) {
            return Ok(false);
        }
        values.push(value.clone());
        self.references_mut()
            .index_values(frame, property, std::slice::from_ref(&value));
        self.invalidate();
        Ok(true)
    }

    pub(crate) fn remove_slot_value(&mut self, frame: FrameId, property: PropertyId, value: &Value) -> ModelResult<bool> {
        let node = self.frame_mut(frame)?;
        let Some(values) = node.slot_values.get_mut(&property) else {
            return Ok(false);
        };
        let before = values.clone();
        values.retain(|v| v != value);
        if values.len() == before.len() {
            return Ok(false);
        }
        let after = values.clone();
        if after.is_empty() {
            node.slot_values.remove(&property);
        }
        self.reindex_values(frame, property, &before, &after);
        self.invalidate();
        Ok(true)
    }

    /// Drop the default slot-values of (owner, property) mentioning `frame`.
    pub(crate) fn purge_values_mentioning(&mut self, owner: FrameId, property: PropertyId, frame: FrameId) -> usize {
        let Ok(node) = self.frame_mut(owner) else {
            return 0;
        };
        let Some(values) = node.slot_values.get_mut(&property) else {
            return 0;
        };
        let before = values.clone();
        values.retain(|v| !v.mentioned_frames().contains(&frame));
        let after = values.clone();
        if after.is_empty() {
            node.slot_values.remove(&property);
        }
        self.reindex_values(owner, property, &before, &after);
        before.len() - after.len()
    }

    fn reindex_values(&mut self, owner: FrameId, property: PropertyId, before: &[Value], after: &[Value]) {
        let index = self.references_mut();
        index.unindex_values(owner, property, before);
        index.index_values(owner, property, after);
    }
}

impl ValueContext for Model {
    fn value_subsumes(&self, a: &Value, b: &Value) -> bool {
        self.model_value_subsumes(a, b)
    }

    fn value_type_of(&self, value: &Value) -> Option<ValueType> {
        match value {
            Value::Frame(t) => Some(ValueType::Frame(t.clone())),
            Value::Number(n) => Some(ValueType::Number(NumberType::exact(*n))),
            Value::Instance(_) => None,
        }
    }

    fn value_type_subsumes(&self, a: &ValueType, b: &ValueType) -> bool {
        Model::value_type_subsumes(self, a, b)
    }

    fn conforms(&self, value_type: &ValueType, value: &Value) -> bool {
        self.model_value_conforms(value_type, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::identity::Identity;
    use crate::value::{Number, NumberKind};

    struct Fixture {
        model: Model,
        animal: FrameId,
        dog: FrameId,
        colour: FrameId,
        legs: PropertyId,
        owner: PropertyId,
    }

    fn fixture() -> Fixture {
        let mut model = Model::new(ModelConfig::default());
        let root = model.root();
        let animal = model.add_frame(Identity::from_id("Animal"), false).unwrap();
        let dog = model.add_frame(Identity::from_id("Dog"), false).unwrap();
        let colour = model.add_frame(Identity::from_id("Colour"), false).unwrap();
        model.add_super_link(animal, root).unwrap();
        model.add_super_link(dog, animal).unwrap();
        model.add_super_link(colour, root).unwrap();
        let legs = model.add_property(Identity::from_id("legs")).unwrap();
        let owner = model.add_property(Identity::from_id("owner")).unwrap();
        Fixture {
            model,
            animal,
            dog,
            colour,
            legs,
            owner,
        }
    }

    #[test]
    fn inherited_slots_merge_cardinality() {
        let mut f = fixture();
        let vt = ValueType::Number(NumberType::unbounded(NumberKind::Integer));
        f.model
            .add_slot(f.animal, ConceptSlot::new(f.legs, Cardinality::UniqueTypes, vt.clone()))
            .unwrap();
        f.model
            .add_slot(f.dog, ConceptSlot::new(f.legs, Cardinality::SingleValue, vt))
            .unwrap();
        let merged = f.model.merged_slots(&FrameType::Model(f.dog)).unwrap();
        assert_eq!(merged[&f.legs].cardinality(), Cardinality::SingleValue);
    }

    #[test]
    fn value_type_merge_keeps_more_specific() {
        let mut f = fixture();
        f.model
            .add_slot(f.animal, ConceptSlot::new(f.owner, Cardinality::Free, f.animal.into()))
            .unwrap();
        f.model
            .add_slot(f.dog, ConceptSlot::new(f.owner, Cardinality::Free, f.dog.into()))
            .unwrap();
        let merged = f.model.merged_slots(&FrameType::Model(f.dog)).unwrap();
        assert_eq!(merged[&f.owner].value_type(), &ValueType::from(f.dog));
    }

    #[test]
    fn unrelated_value_types_fail_to_merge() {
        let mut f = fixture();
        f.model
            .add_slot(f.dog, ConceptSlot::new(f.owner, Cardinality::Free, f.animal.into()))
            .unwrap();
        let err = f
            .model
            .add_slot(f.dog, ConceptSlot::new(f.owner, Cardinality::Free, f.colour.into()));
        assert!(matches!(err, Err(ModelError::IncompatibleValueTypes { .. })));
        // prior definition untouched
        assert_eq!(f.model.slot(f.dog, f.owner).unwrap().value_type(), &ValueType::from(f.animal));
    }

    #[test]
    fn default_values_reduce_to_most_specific() {
        let mut f = fixture();
        f.model
            .add_slot(f.animal, ConceptSlot::new(f.owner, Cardinality::Free, f.animal.into()))
            .unwrap();
        f.model.add_slot_value(f.animal, f.owner, f.animal.into()).unwrap();
        f.model.add_slot_value(f.dog, f.owner, f.dog.into()).unwrap();
        let values = f.model.merged_slot_values(&FrameType::Model(f.dog));
        assert_eq!(values[&f.owner], vec![Value::from(f.dog)]);
    }

    #[test]
    fn slot_value_without_slot_fails_validation() {
        let mut f = fixture();
        f.model.add_slot_value(f.dog, f.legs, Number::Int(4).into()).unwrap();
        assert!(matches!(
            f.model.validate_frame(f.dog),
            Err(ModelError::SlotValueWithoutSlot { .. })
        ));
    }

    #[test]
    fn nonconforming_default_fails_validation() {
        let mut f = fixture();
        let legs = NumberType::range(NumberKind::Integer, Some(Number::Int(0)), Some(Number::Int(4))).unwrap();
        f.model
            .add_slot(f.dog, ConceptSlot::new(f.legs, Cardinality::SingleValue, legs.into()))
            .unwrap();
        f.model.add_slot_value(f.dog, f.legs, Number::Int(9).into()).unwrap();
        assert!(matches!(
            f.model.validate_frame(f.dog),
            Err(ModelError::InvalidSlotValue { .. })
        ));
    }

    #[test]
    fn two_fixed_values_illegal_for_single_value() {
        let mut f = fixture();
        let vt = ValueType::Number(NumberType::unbounded(NumberKind::Integer));
        f.model
            .add_slot(f.dog, ConceptSlot::new(f.legs, Cardinality::SingleValue, vt))
            .unwrap();
        f.model.add_slot_value(f.dog, f.legs, Number::Int(3).into()).unwrap();
        f.model.add_slot_value(f.dog, f.legs, Number::Int(4).into()).unwrap();
        assert!(matches!(
            f.model.validate_frame(f.dog),
            Err(ModelError::IllegalFixedValues { count: 2, .. })
        ));
    }
}
