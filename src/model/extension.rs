//! Extensions: anonymous specialisations of a model frame.
//!
//! An extension pairs a model frame with extra default slot-values. It is
//! validated against the extended frame's slot set, immediately when the
//! model is initialized, otherwise at the end of the running build pass so
//! that section builders may reference slots defined later.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{ModelError, ModelResult};
use crate::identity::{FrameId, PropertyId};
use crate::value::{FrameType, Value};

use super::Model;

#[derive(Debug)]
struct ExtensionData {
    extended: FrameId,
    slot_values: BTreeMap<PropertyId, Vec<Value>>,
    concrete: bool,
}

/// Shared handle to an extension. Cloning is cheap.
///
/// Abstract extensions compare structurally. A concrete extension is equal
/// only to itself (the same handle).
#[derive(Debug, Clone)]
pub struct Extension(Arc<ExtensionData>);

impl Extension {
    /// Create an extension of `base`.
    ///
    /// Extending an extension flattens onto its model frame; the new
    /// values replace the base's values for the same property.
    pub fn create(
        model: &Model,
        base: FrameType,
        slot_values: impl IntoIterator<Item = (PropertyId, Vec<Value>)>,
        concrete: bool,
    ) -> ModelResult<FrameType> {
        let (extended, mut values) = match base {
            FrameType::Model(f) => {
                model.frame(f)?;
                (f, BTreeMap::new())
            }
            FrameType::Extension(e) => (e.0.extended, e.0.slot_values.clone()),
            FrameType::Disjunction(_) => {
                return Err(ModelError::ExtensionOfDisjunction {
                    frame: model.describe(&base),
                });
            }
        };
        for (property, list) in slot_values {
            model.property(property)?;
            let mut deduped: Vec<Value> = Vec::with_capacity(list.len());
            for v in list {
                if !deduped.contains(&v) {
                    deduped.push(v);
                }
            }
            if deduped.is_empty() {
                values.remove(&property);
            } else {
                values.insert(property, deduped);
            }
        }

        let extension = Extension(Arc::new(ExtensionData {
            extended,
            slot_values: values,
            concrete,
        }));
        let pending = extension.clone();
        model.defer_or_run(Box::new(move |m| pending.validate(m)))?;
        Ok(FrameType::Extension(extension))
    }

    pub fn extended(&self) -> FrameId {
        self.0.extended
    }

    pub fn slot_values(&self) -> &BTreeMap<PropertyId, Vec<Value>> {
        &self.0.slot_values
    }

    pub fn values_for(&self, property: PropertyId) -> &[Value] {
        self.0
            .slot_values
            .get(&property)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn concrete(&self) -> bool {
        self.0.concrete
    }

    fn validate(&self, model: &Model) -> ModelResult<()> {
        let slots = model.merged_slots(&FrameType::Model(self.0.extended))?;
        let label = model.describe(&FrameType::Extension(self.clone()));
        for (property, values) in &self.0.slot_values {
            let slot = slots
                .get(property)
                .ok_or_else(|| ModelError::SlotValueWithoutSlot {
                    frame: label.clone(),
                    property: model.property_label(*property),
                })?;
            model.check_slot_values(&label, slot, values)?;
        }
        Ok(())
    }
}

impl PartialEq for Extension {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        if self.0.concrete || other.0.concrete {
            return false;
        }
        self.0.extended == other.0.extended
            && self.0.slot_values.len() == other.0.slot_values.len()
            && self.0.slot_values.iter().all(|(property, values)| {
                other.0.slot_values.get(property).is_some_and(|theirs| {
                    values.len() == theirs.len() && values.iter().all(|v| theirs.contains(v))
                })
            })
    }
}

impl Eq for Extension {}

impl Hash for Extension {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.extended.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cardinality::Cardinality;
    use crate::config::ModelConfig;
    use crate::identity::Identity;
    use crate::model::slot::ConceptSlot;

    struct Fixture {
        model: Model,
        dog: FrameId,
        colour: FrameId,
        red: FrameId,
        brown: FrameId,
        coat: PropertyId,
    }

    fn fixture() -> Fixture {
        let mut model = Model::new(ModelConfig::default());
        let root = model.root();
        let dog = model.add_frame(Identity::from_id("Dog"), false).unwrap();
        let colour = model.add_frame(Identity::from_id("Colour"), false).unwrap();
        let red = model.add_frame(Identity::from_id("Red"), false).unwrap();
        let brown = model.add_frame(Identity::from_id("Brown"), false).unwrap();
        model.add_super_link(dog, root).unwrap();
        model.add_super_link(colour, root).unwrap();
        model.add_super_link(red, colour).unwrap();
        model.add_super_link(brown, colour).unwrap();
        let coat = model.add_property(Identity::from_id("coat")).unwrap();
        model
            .add_slot(dog, ConceptSlot::new(coat, Cardinality::SingleValue, colour.into()))
            .unwrap();
        Fixture {
            model,
            dog,
            colour,
            red,
            brown,
            coat,
        }
    }

    fn extension(f: &Fixture, value: FrameId, concrete: bool) -> FrameType {
        Extension::create(&f.model, f.dog.into(), [(f.coat, vec![Value::from(value)])], concrete).unwrap()
    }

    #[test]
    fn abstract_extensions_compare_structurally() {
        let f = fixture();
        assert_eq!(extension(&f, f.red, false), extension(&f, f.red, false));
        assert_ne!(extension(&f, f.red, false), extension(&f, f.brown, false));
    }

    #[test]
    fn concrete_extension_equals_only_itself() {
        let f = fixture();
        let a = extension(&f, f.red, true);
        let b = extension(&f, f.red, true);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert!(f.model.subsumes(&a, &a));
        assert!(!f.model.subsumes(&a, &b));
    }

    #[test]
    fn extension_subsumption_follows_slot_values() {
        let f = fixture();
        let any_colour = extension(&f, f.colour, false);
        let red = extension(&f, f.red, false);
        assert!(f.model.subsumes(&any_colour, &red));
        assert!(!f.model.subsumes(&red, &any_colour));
        assert!(f.model.subsumes(&f.dog.into(), &red));
        assert!(!f.model.subsumes(&red, &f.dog.into()));
    }

    #[test]
    fn extending_an_extension_flattens() {
        let f = fixture();
        let red = extension(&f, f.red, false);
        let brown = Extension::create(&f.model, red, [(f.coat, vec![Value::from(f.brown)])], false).unwrap();
        let FrameType::Extension(e) = brown else {
            panic!("expected an extension");
        };
        assert_eq!(e.extended(), f.dog);
        assert_eq!(e.values_for(f.coat), &[Value::from(f.brown)]);
    }

    #[test]
    fn validation_deferred_until_complete() {
        let mut f = fixture();
        let other = f.model.add_property(Identity::from_id("other")).unwrap();
        Extension::create(&f.model, f.dog.into(), [(other, vec![Value::from(f.red)])], false).unwrap();
        assert!(matches!(
            f.model.complete_build(),
            Err(ModelError::SlotValueWithoutSlot { .. })
        ));
    }

    #[test]
    fn validation_immediate_once_initialized() {
        let mut f = fixture();
        f.model.complete_build().unwrap();
        let err = Extension::create(&f.model, f.dog.into(), [(f.coat, vec![Value::from(f.dog)])], false);
        assert!(matches!(err, Err(ModelError::InvalidSlotValue { .. })));
    }
}
