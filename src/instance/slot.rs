//! Instance slots and their asserted/fixed value lists.
//!
//! Every mutation is planned first against the current lists and only
//! applied by the owning graph once the plan succeeded, so a rejected
//! edit never leaves a slot half-changed.

use std::collections::BTreeSet;

use crate::cardinality::Cardinality;
use crate::error::{AccessError, ModelError};
use crate::identity::{InstanceId, PropertyId};
use crate::model::slot::ConceptSlot;
use crate::value::{fixed_values_legal, Value, ValueContext, ValueType};

/// A slot on an instance frame.
#[derive(Debug, Clone)]
pub struct InstanceSlot {
    property: PropertyId,
    cardinality: Cardinality,
    value_type: ValueType,
    base_value_type: ValueType,
    active: bool,
    editable: bool,
    derived: bool,
    model_defaults: Vec<Value>,
    pub(crate) values: SlotValueLists,
}

impl InstanceSlot {
    pub(crate) fn from_concept(slot: &ConceptSlot) -> Self {
        Self {
            property: slot.property(),
            cardinality: slot.cardinality(),
            value_type: slot.value_type().clone(),
            base_value_type: slot.value_type().clone(),
            active: slot.active(),
            editable: slot.editable(),
            derived: false,
            model_defaults: Vec::new(),
            values: SlotValueLists::default(),
        }
    }

    /// A reasoner-owned slot with no concept-level definition.
    pub(crate) fn new_derived(
        property: PropertyId,
        cardinality: Cardinality,
        value_type: ValueType,
        editable: bool,
    ) -> Self {
        Self {
            property,
            cardinality,
            base_value_type: value_type.clone(),
            value_type,
            active: true,
            editable,
            derived: true,
            model_defaults: Vec::new(),
            values: SlotValueLists::default(),
        }
    }

    pub fn property(&self) -> PropertyId {
        self.property
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Current value-type, possibly specialised by a reasoner.
    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    /// Value-type before any specialisation.
    pub fn base_value_type(&self) -> &ValueType {
        &self.base_value_type
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn editable(&self) -> bool {
        self.editable
    }

    pub fn derived(&self) -> bool {
        self.derived
    }

    pub fn asserted(&self) -> &[Value] {
        &self.values.asserted
    }

    pub fn fixed(&self) -> &[Value] {
        &self.values.fixed
    }

    /// Model-level default values last installed as fixed values.
    pub fn model_defaults(&self) -> &[Value] {
        &self.model_defaults
    }

    pub(crate) fn set_model_defaults(&mut self, values: Vec<Value>) {
        self.model_defaults = values;
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Adopt a new concept-level definition, keeping current values.
    pub(crate) fn realign(&mut self, slot: &ConceptSlot) {
        self.cardinality = slot.cardinality();
        self.base_value_type = slot.value_type().clone();
        self.value_type = slot.value_type().clone();
        self.active = slot.active();
        self.editable = slot.editable();
    }

    pub(crate) fn matches_concept(&self, slot: &ConceptSlot) -> bool {
        self.cardinality == slot.cardinality()
            && &self.base_value_type == slot.value_type()
            && self.active == slot.active()
            && self.editable == slot.editable()
    }

    pub(crate) fn set_value_type(&mut self, value_type: ValueType) {
        self.value_type = value_type;
    }
}

/// Result of planning a fixed-value replacement.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FixedPlan {
    pub(crate) fixed: Vec<Value>,
    pub(crate) asserted: Vec<Value>,
    pub(crate) pruned: usize,
}

/// Client-asserted and model-fixed values of one slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotValueLists {
    pub(crate) asserted: Vec<Value>,
    pub(crate) fixed: Vec<Value>,
}

impl SlotValueLists {
    pub fn asserted(&self) -> &[Value] {
        &self.asserted
    }

    pub fn fixed(&self) -> &[Value] {
        &self.fixed
    }

    /// Externally visible values: fixed values, then asserted values not
    /// made redundant by a fixed value.
    pub fn visible(&self, ctx: &dyn ValueContext) -> Vec<Value> {
        let mut out = self.fixed.clone();
        out.extend(
            self.asserted
                .iter()
                .filter(|a| !self.fixed.iter().any(|f| ctx.value_subsumes(a, f)))
                .cloned(),
        );
        out
    }

    /// Instances referenced from either list.
    pub(crate) fn instance_refs(&self) -> BTreeSet<InstanceId> {
        self.asserted
            .iter()
            .chain(self.fixed.iter())
            .filter_map(Value::instance)
            .collect()
    }

    fn redundant(&self, ctx: &dyn ValueContext, value: &Value) -> bool {
        self.fixed.contains(value)
            || self.asserted.contains(value)
            || self.fixed.iter().any(|f| ctx.value_subsumes(value, f))
    }

    /// Plan asserting `value`. `Ok(None)` means the value adds nothing.
    pub(crate) fn plan_add(
        &self,
        ctx: &dyn ValueContext,
        cardinality: Cardinality,
        value: &Value,
        property: &str,
    ) -> Result<Option<Vec<Value>>, AccessError> {
        if self.redundant(ctx, value) {
            return Ok(None);
        }
        let violation = || AccessError::CardinalityViolation {
            property: property.to_string(),
            cardinality: cardinality.to_string(),
        };
        match cardinality {
            Cardinality::SingleValue => {
                if !self.fixed.is_empty() {
                    return Err(violation());
                }
                match self.asserted.first() {
                    None => Ok(Some(vec![value.clone()])),
                    Some(existing) if ctx.value_subsumes(existing, value) => Ok(Some(vec![value.clone()])),
                    Some(existing) if ctx.value_subsumes(value, existing) => Ok(None),
                    Some(_) => Err(violation()),
                }
            }
            Cardinality::UniqueTypes => {
                let clashes = |other: &Value| ctx.same_value_type(other, value);
                if self.fixed.iter().any(clashes) || self.asserted.iter().any(clashes) {
                    return Err(violation());
                }
                if self.fixed.iter().any(|f| ctx.related_value_types(f, value)) {
                    return Err(violation());
                }
                let mut next: Vec<Value> = self
                    .asserted
                    .iter()
                    .filter(|a| !ctx.related_value_types(a, value))
                    .cloned()
                    .collect();
                next.push(value.clone());
                Ok(Some(next))
            }
            Cardinality::Free => {
                let mut next = self.asserted.clone();
                next.push(value.clone());
                Ok(Some(next))
            }
        }
    }

    /// Plan retracting `value`. `None` when it is not asserted.
    pub(crate) fn plan_remove(&self, value: &Value) -> Option<Vec<Value>> {
        if !self.asserted.contains(value) {
            return None;
        }
        Some(self.asserted.iter().filter(|a| *a != value).cloned().collect())
    }

    /// Plan replacing the fixed values, pruning asserted values the new
    /// fixed values make redundant or conflicting.
    pub(crate) fn plan_fixed(
        &self,
        ctx: &dyn ValueContext,
        cardinality: Cardinality,
        values: Vec<Value>,
        property: &str,
    ) -> Result<FixedPlan, ModelError> {
        let mut fixed: Vec<Value> = Vec::with_capacity(values.len());
        for v in values {
            if !fixed.contains(&v) {
                fixed.push(v);
            }
        }
        if !fixed_values_legal(ctx, cardinality, &fixed) {
            return Err(ModelError::IllegalFixedValues {
                property: property.to_string(),
                cardinality: cardinality.to_string(),
                count: fixed.len(),
            });
        }
        let asserted: Vec<Value> = if cardinality.single_value() && !fixed.is_empty() {
            Vec::new()
        } else {
            self.asserted
                .iter()
                .filter(|a| !fixed.contains(a) && !fixed.iter().any(|f| ctx.value_subsumes(a, f)))
                .filter(|a| {
                    !cardinality.unique_types()
                        || !fixed.iter().any(|f| {
                            ctx.same_value_type(f, a) || ctx.related_value_types(f, a)
                        })
                })
                .cloned()
                .collect()
        };
        let pruned = self.asserted.len() - asserted.len();
        Ok(FixedPlan {
            fixed,
            asserted,
            pruned,
        })
    }

    /// Asserted values still conforming to `value_type`.
    pub(crate) fn conforming(&self, ctx: &dyn ValueContext, value_type: &ValueType) -> Vec<Value> {
        self.asserted
            .iter()
            .filter(|a| ctx.conforms(value_type, a))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Number, NumberType};

    /// Integers under divisibility: `a` subsumes `b` when `a` divides `b`.
    /// Value-types are the numbers themselves, so a unique-types slot
    /// rejects equal numbers and replaces related ones.
    struct Divisibility;

    fn int(v: &Value) -> i64 {
        match v {
            Value::Number(Number::Int(i)) => *i,
            _ => 0,
        }
    }

    impl ValueContext for Divisibility {
        fn value_subsumes(&self, a: &Value, b: &Value) -> bool {
            int(a) != 0 && int(b) % int(a) == 0
        }

        fn value_type_of(&self, value: &Value) -> Option<ValueType> {
            match value {
                Value::Number(n) => Some(ValueType::Number(NumberType::exact(*n))),
                _ => None,
            }
        }

        fn value_type_subsumes(&self, a: &ValueType, b: &ValueType) -> bool {
            match (a, b) {
                (ValueType::Number(x), ValueType::Number(y)) => match (x.min(), y.min()) {
                    (Some(Number::Int(p)), Some(Number::Int(q))) => p != 0 && q % p == 0,
                    _ => false,
                },
                _ => false,
            }
        }

        fn conforms(&self, _: &ValueType, _: &Value) -> bool {
            true
        }
    }

    fn n(i: i64) -> Value {
        Value::Number(Number::Int(i))
    }

    fn lists(asserted: &[i64], fixed: &[i64]) -> SlotValueLists {
        SlotValueLists {
            asserted: asserted.iter().map(|i| n(*i)).collect(),
            fixed: fixed.iter().map(|i| n(*i)).collect(),
        }
    }

    #[test]
    fn single_value_refines_and_rejects_unrelated() {
        let ctx = Divisibility;
        let slot = lists(&[2], &[]);
        assert_eq!(
            slot.plan_add(&ctx, Cardinality::SingleValue, &n(4), "p").unwrap(),
            Some(vec![n(4)])
        );
        let slot = lists(&[4], &[]);
        assert_eq!(slot.plan_add(&ctx, Cardinality::SingleValue, &n(2), "p").unwrap(), None);
        assert!(matches!(
            slot.plan_add(&ctx, Cardinality::SingleValue, &n(3), "p"),
            Err(AccessError::CardinalityViolation { .. })
        ));
    }

    #[test]
    fn single_value_with_fixed_rejects_additions() {
        let ctx = Divisibility;
        let slot = lists(&[], &[6]);
        assert_eq!(slot.plan_add(&ctx, Cardinality::SingleValue, &n(3), "p").unwrap(), None);
        assert!(slot.plan_add(&ctx, Cardinality::SingleValue, &n(12), "p").is_err());
    }

    #[test]
    fn unique_types_rejects_equal_and_replaces_related() {
        let ctx = Divisibility;
        let slot = lists(&[2, 5], &[]);
        assert!(slot.plan_add(&ctx, Cardinality::UniqueTypes, &n(5), "p").unwrap().is_none());
        assert_eq!(
            slot.plan_add(&ctx, Cardinality::UniqueTypes, &n(10), "p").unwrap(),
            Some(vec![n(10)])
        );
        assert_eq!(
            slot.plan_add(&ctx, Cardinality::UniqueTypes, &n(7), "p").unwrap(),
            Some(vec![n(2), n(5), n(7)])
        );
    }

    #[test]
    fn free_collapses_exact_duplicates_only() {
        let ctx = Divisibility;
        let slot = lists(&[2], &[]);
        assert_eq!(slot.plan_add(&ctx, Cardinality::Free, &n(2), "p").unwrap(), None);
        assert_eq!(
            slot.plan_add(&ctx, Cardinality::Free, &n(4), "p").unwrap(),
            Some(vec![n(2), n(4)])
        );
    }

    #[test]
    fn asserted_value_subsuming_fixed_is_redundant() {
        let ctx = Divisibility;
        let slot = lists(&[], &[6]);
        assert_eq!(slot.plan_add(&ctx, Cardinality::Free, &n(3), "p").unwrap(), None);
        assert_eq!(slot.visible(&ctx), vec![n(6)]);
    }

    #[test]
    fn fixed_replacement_prunes_redundant_asserted() {
        let ctx = Divisibility;
        let slot = lists(&[3, 7], &[]);
        let plan = slot.plan_fixed(&ctx, Cardinality::Free, vec![6, 6].into_iter().map(n).collect(), "p").unwrap();
        assert_eq!(plan.fixed, vec![n(6)]);
        assert_eq!(plan.asserted, vec![n(7)]);
        assert_eq!(plan.pruned, 1);
    }

    #[test]
    fn illegal_fixed_values_rejected() {
        let ctx = Divisibility;
        let slot = SlotValueLists::default();
        let err = slot.plan_fixed(&ctx, Cardinality::SingleValue, vec![n(1), n(2)], "p");
        assert!(matches!(err, Err(ModelError::IllegalFixedValues { count: 2, .. })));
    }

    #[test]
    fn remove_restores_previous_visible_list() {
        let ctx = Divisibility;
        let mut slot = lists(&[5], &[6]);
        let before = slot.visible(&ctx);
        slot.asserted = slot.plan_add(&ctx, Cardinality::Free, &n(7), "p").unwrap().unwrap();
        slot.asserted = slot.plan_remove(&n(7)).unwrap();
        assert_eq!(slot.visible(&ctx), before);
        assert!(slot.plan_remove(&n(9)).is_none());
    }
}
