//! Editing handles handed to section builders.

use std::sync::Arc;

use crate::cardinality::Cardinality;
use crate::error::ModelResult;
use crate::identity::{FrameId, Identity, PropertyId};
use crate::instance::reasoner::Reasoner;
use crate::model::slot::ConceptSlot;
use crate::model::{Model, Source};
use crate::value::{Value, ValueType};

/// Mutable access to a model during a build pass.
pub struct ModelEditor<'a> {
    model: &'a mut Model,
}

impl<'a> ModelEditor<'a> {
    pub(crate) fn new(model: &'a mut Model) -> Self {
        Self { model }
    }

    /// Read access, for building expressions over the model in progress.
    pub fn model(&self) -> &Model {
        &*self.model
    }

    pub fn root(&self) -> FrameId {
        self.model.root()
    }

    /// Add a new frame. Fails if the identity is already taken.
    pub fn add_frame(&mut self, identity: Identity, hidden: bool) -> ModelResult<FrameId> {
        self.model.add_frame(identity, hidden)
    }

    /// The frame with this identity, adding it if absent.
    pub fn resolve_frame(&mut self, identity: Identity, hidden: bool) -> ModelResult<FrameId> {
        match self.model.frame_by_identifier(identity.identifier()) {
            Some(frame) => Ok(frame),
            None => self.model.add_frame(identity, hidden),
        }
    }

    pub fn remove_frame(&mut self, frame: FrameId) -> ModelResult<()> {
        self.model.remove_frame(frame)
    }

    pub fn add_property(&mut self, identity: Identity) -> ModelResult<PropertyId> {
        self.model.add_property(identity)
    }

    pub fn resolve_property(&mut self, identity: Identity) -> ModelResult<PropertyId> {
        match self.model.property_by_identifier(identity.identifier()) {
            Some(property) => Ok(property),
            None => self.model.add_property(identity),
        }
    }

    pub fn add_super(&mut self, frame: FrameId, super_frame: FrameId) -> ModelResult<bool> {
        self.model.add_super_link(frame, super_frame)
    }

    pub fn remove_super(&mut self, frame: FrameId, super_frame: FrameId) -> bool {
        self.model.remove_super_link(frame, super_frame)
    }

    /// Add an active, editable slot, merging with an existing definition.
    pub fn add_slot(
        &mut self,
        frame: FrameId,
        property: PropertyId,
        cardinality: Cardinality,
        value_type: ValueType,
    ) -> ModelResult<()> {
        self.model
            .add_slot(frame, ConceptSlot::new(property, cardinality, value_type))
    }

    pub fn remove_slot(&mut self, frame: FrameId, property: PropertyId) -> ModelResult<bool> {
        self.model.remove_slot(frame, property)
    }

    pub fn set_slot_cardinality(
        &mut self,
        frame: FrameId,
        property: PropertyId,
        cardinality: Cardinality,
    ) -> ModelResult<()> {
        self.model.set_slot_cardinality(frame, property, cardinality)
    }

    pub fn set_slot_value_type(
        &mut self,
        frame: FrameId,
        property: PropertyId,
        value_type: ValueType,
    ) -> ModelResult<()> {
        self.model.set_slot_value_type(frame, property, value_type)
    }

    pub fn set_slot_active(&mut self, frame: FrameId, property: PropertyId, active: bool) -> ModelResult<()> {
        self.model.set_slot_active(frame, property, active)
    }

    pub fn set_slot_editable(&mut self, frame: FrameId, property: PropertyId, editable: bool) -> ModelResult<()> {
        self.model.set_slot_editable(frame, property, editable)
    }

    /// Add a default slot-value. Returns `false` for an exact duplicate.
    pub fn add_slot_value(&mut self, frame: FrameId, property: PropertyId, value: Value) -> ModelResult<bool> {
        self.model.add_slot_value(frame, property, value)
    }

    pub fn frame_editor(&mut self, frame: FrameId) -> ModelResult<FrameEditor<'_>> {
        self.model.frame(frame)?;
        Ok(FrameEditor {
            model: &mut *self.model,
            frame,
        })
    }

    pub fn slot_editor(&mut self, frame: FrameId, property: PropertyId) -> ModelResult<SlotEditor<'_>> {
        self.model.slot(frame, property)?;
        Ok(SlotEditor {
            model: &mut *self.model,
            frame,
            property,
        })
    }

    pub fn property_editor(&mut self, property: PropertyId) -> ModelResult<PropertyEditor<'_>> {
        self.model.property(property)?;
        Ok(PropertyEditor {
            model: &mut *self.model,
            property,
        })
    }
}

/// Edits scoped to one frame.
pub struct FrameEditor<'a> {
    model: &'a mut Model,
    frame: FrameId,
}

impl FrameEditor<'_> {
    pub fn id(&self) -> FrameId {
        self.frame
    }

    pub fn add_super(&mut self, super_frame: FrameId) -> ModelResult<bool> {
        self.model.add_super_link(self.frame, super_frame)
    }

    pub fn remove_super(&mut self, super_frame: FrameId) -> bool {
        self.model.remove_super_link(self.frame, super_frame)
    }

    pub fn set_hidden(&mut self, hidden: bool) -> ModelResult<&mut Self> {
        self.model.set_hidden(self.frame, hidden)?;
        Ok(self)
    }

    pub fn set_source(&mut self, source: Source) -> ModelResult<&mut Self> {
        self.model.set_source(self.frame, source)?;
        Ok(self)
    }

    /// Install the reasoning strategy for instances of this frame.
    pub fn set_reasoner(&mut self, reasoner: Arc<dyn Reasoner>) -> ModelResult<&mut Self> {
        self.model.set_reasoner(self.frame, reasoner)?;
        Ok(self)
    }

    pub fn add_slot(
        &mut self,
        property: PropertyId,
        cardinality: Cardinality,
        value_type: ValueType,
    ) -> ModelResult<&mut Self> {
        self.model
            .add_slot(self.frame, ConceptSlot::new(property, cardinality, value_type))?;
        Ok(self)
    }

    pub fn add_slot_value(&mut self, property: PropertyId, value: Value) -> ModelResult<bool> {
        self.model.add_slot_value(self.frame, property, value)
    }

    pub fn remove_slot_value(&mut self, property: PropertyId, value: &Value) -> ModelResult<bool> {
        self.model.remove_slot_value(self.frame, property, value)
    }
}

/// Edits scoped to one slot of one frame.
pub struct SlotEditor<'a> {
    model: &'a mut Model,
    frame: FrameId,
    property: PropertyId,
}

impl SlotEditor<'_> {
    pub fn set_cardinality(&mut self, cardinality: Cardinality) -> ModelResult<&mut Self> {
        self.model
            .set_slot_cardinality(self.frame, self.property, cardinality)?;
        Ok(self)
    }

    pub fn set_value_type(&mut self, value_type: ValueType) -> ModelResult<&mut Self> {
        self.model
            .set_slot_value_type(self.frame, self.property, value_type)?;
        Ok(self)
    }

    pub fn set_active(&mut self, active: bool) -> ModelResult<&mut Self> {
        self.model.set_slot_active(self.frame, self.property, active)?;
        Ok(self)
    }

    pub fn set_editable(&mut self, editable: bool) -> ModelResult<&mut Self> {
        self.model
            .set_slot_editable(self.frame, self.property, editable)?;
        Ok(self)
    }

    pub fn set_source(&mut self, source: Source) -> ModelResult<&mut Self> {
        self.model.set_slot_source(self.frame, self.property, source)?;
        Ok(self)
    }

    pub fn add_value(&mut self, value: Value) -> ModelResult<bool> {
        self.model.add_slot_value(self.frame, self.property, value)
    }

    pub fn remove_value(&mut self, value: &Value) -> ModelResult<bool> {
        self.model.remove_slot_value(self.frame, self.property, value)
    }
}

/// Edits scoped to one property.
pub struct PropertyEditor<'a> {
    model: &'a mut Model,
    property: PropertyId,
}

impl PropertyEditor<'_> {
    pub fn id(&self) -> PropertyId {
        self.property
    }

    pub fn set_source(&mut self, source: Source) -> ModelResult<&mut Self> {
        self.model.property_mut(self.property)?.set_source(source);
        Ok(self)
    }
}
