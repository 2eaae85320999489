//! Value-types and values.
//!
//! Every slot carries a [`ValueType`], a closed sum over the three kinds of
//! value-type entity: frame-types, numeric ranges, and meta-frame-types
//! (types used as values in their own right). Every slot value is a
//! [`Value`]: an instance reference, a frame-type used as a value, or a
//! number.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::cardinality::Cardinality;
use crate::error::{AccessError, ModelError, ModelResult};
use crate::identity::{FrameId, InstanceId};
use crate::model::disjunction::Disjunction;
use crate::model::extension::Extension;

// ---------------------------------------------------------------------------
// Numbers
// ---------------------------------------------------------------------------

/// Primitive number kind of a numeric value-type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NumberKind {
    Integer,
    Real,
}

impl fmt::Display for NumberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::Real => write!(f, "real"),
        }
    }
}

/// A concrete number. Reals compare and hash by bit pattern.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Number {
    Int(i64),
    Real(f64),
}

impl Number {
    pub fn kind(self) -> NumberKind {
        match self {
            Self::Int(_) => NumberKind::Integer,
            Self::Real(_) => NumberKind::Real,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Real(r) => r,
        }
    }

    /// Numeric ordering across kinds; `None` only when a NaN is involved.
    pub fn compare(self, other: Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Real(a), Self::Real(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for Number {}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Int(i) => {
                0u8.hash(state);
                i.hash(state);
            }
            Self::Real(r) => {
                1u8.hash(state);
                r.to_bits().hash(state);
            }
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
        }
    }
}

/// Numeric value-type: a primitive kind plus an inclusive, optionally
/// open-ended range. Equality and hashing cover kind and range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NumberType {
    kind: NumberKind,
    min: Option<Number>,
    max: Option<Number>,
}

impl NumberType {
    /// Unbounded range of the given kind.
    pub fn unbounded(kind: NumberKind) -> Self {
        Self {
            kind,
            min: None,
            max: None,
        }
    }

    /// Inclusive range. Integer ranges require integer bounds.
    pub fn range(kind: NumberKind, min: Option<Number>, max: Option<Number>) -> ModelResult<Self> {
        let bound_ok = |b: &Option<Number>| match (kind, b) {
            (NumberKind::Integer, Some(Number::Real(_))) => false,
            (_, Some(Number::Real(r))) => !r.is_nan(),
            _ => true,
        };
        let ordered = match (min, max) {
            (Some(lo), Some(hi)) => matches!(
                lo.compare(hi),
                Some(Ordering::Less | Ordering::Equal)
            ),
            _ => true,
        };
        if !bound_ok(&min) || !bound_ok(&max) || !ordered {
            return Err(ModelError::InvalidRange {
                min: min.map_or_else(|| "-inf".into(), |n| n.to_string()),
                max: max.map_or_else(|| "+inf".into(), |n| n.to_string()),
            });
        }
        Ok(Self { kind, min, max })
    }

    /// The single-point range holding exactly `n`.
    pub fn exact(n: Number) -> Self {
        Self {
            kind: n.kind(),
            min: Some(n),
            max: Some(n),
        }
    }

    pub fn kind(&self) -> NumberKind {
        self.kind
    }

    pub fn min(&self) -> Option<Number> {
        self.min
    }

    pub fn max(&self) -> Option<Number> {
        self.max
    }

    /// Whether `n` lies in this range. Real ranges admit integers.
    pub fn contains(&self, n: Number) -> bool {
        let kind_ok = match (self.kind, n) {
            (NumberKind::Integer, Number::Real(_)) => false,
            _ => true,
        };
        let above = self
            .min
            .is_none_or(|lo| matches!(lo.compare(n), Some(Ordering::Less | Ordering::Equal)));
        let below = self
            .max
            .is_none_or(|hi| matches!(n.compare(hi), Some(Ordering::Less | Ordering::Equal)));
        kind_ok && above && below
    }

    /// Range containment over the same kind.
    pub fn subsumes(&self, other: &NumberType) -> bool {
        if self.kind != other.kind {
            return false;
        }
        let lower = match (self.min, other.min) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => matches!(a.compare(b), Some(Ordering::Less | Ordering::Equal)),
        };
        let upper = match (self.max, other.max) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => matches!(b.compare(a), Some(Ordering::Less | Ordering::Equal)),
        };
        lower && upper
    }

    /// The value of a single-point range.
    pub fn single_point(&self) -> Option<Number> {
        match (self.min, self.max) {
            (Some(lo), Some(hi)) if lo == hi => Some(lo),
            _ => None,
        }
    }
}

impl fmt::Display for NumberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lo = self.min.map_or_else(|| "-inf".to_string(), |n| n.to_string());
        let hi = self.max.map_or_else(|| "+inf".to_string(), |n| n.to_string());
        write!(f, "{}[{lo}..{hi}]", self.kind)
    }
}

// ---------------------------------------------------------------------------
// Frame types
// ---------------------------------------------------------------------------

/// Concept-level type: a named model frame or an anonymous expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// A named frame participating in the hierarchy.
    Model(FrameId),
    /// Anonymous union of model frames.
    Disjunction(Disjunction),
    /// Anonymous specialisation of a model frame by slot-values.
    Extension(Extension),
}

impl FrameType {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Model(_) => "model frame",
            Self::Disjunction(_) => "disjunction",
            Self::Extension(_) => "extension",
        }
    }

    pub fn as_model(&self) -> Option<FrameId> {
        match self {
            Self::Model(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_expression(&self) -> bool {
        !matches!(self, Self::Model(_))
    }

    /// The model frames whose upward closure must contain a subsumer:
    /// the frame itself, a disjunction's disjuncts, an extension's base.
    pub fn subsumption_disjuncts(&self) -> Vec<FrameId> {
        match self {
            Self::Model(f) => vec![*f],
            Self::Disjunction(d) => d.disjuncts().collect(),
            Self::Extension(e) => vec![e.extended()],
        }
    }

    /// Every model frame this type refers to, including frames used in
    /// extension slot-values.
    pub fn mentioned_frames(&self) -> Vec<FrameId> {
        match self {
            Self::Model(f) => vec![*f],
            Self::Disjunction(d) => d.disjuncts().collect(),
            Self::Extension(e) => {
                let mut frames = vec![e.extended()];
                for values in e.slot_values().values() {
                    for v in values {
                        frames.extend(v.mentioned_frames());
                    }
                }
                frames
            }
        }
    }

    pub fn mentions(&self, frame: FrameId) -> bool {
        self.mentioned_frames().contains(&frame)
    }

    /// Concreteness as a value: only concrete extensions count.
    pub fn concrete(&self) -> bool {
        match self {
            Self::Extension(e) => e.concrete(),
            _ => false,
        }
    }
}

impl From<FrameId> for FrameType {
    fn from(f: FrameId) -> Self {
        Self::Model(f)
    }
}

// ---------------------------------------------------------------------------
// Value-types
// ---------------------------------------------------------------------------

/// The value-type of a slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Values are instances of (or, in queries, types below) the frame-type.
    Frame(FrameType),
    /// Values are numbers in the range.
    Number(NumberType),
    /// Values are frame-types below the root frame-type.
    MetaFrame(FrameType),
}

impl ValueType {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Frame(_) => "frame-type",
            Self::Number(_) => "numeric-type",
            Self::MetaFrame(_) => "meta-frame-type",
        }
    }

    pub fn as_frame_type(&self) -> Result<&FrameType, AccessError> {
        match self {
            Self::Frame(t) => Ok(t),
            other => Err(AccessError::WrongValueTypeKind {
                expected: "frame-type",
                actual: other.kind_name(),
            }),
        }
    }

    pub fn as_number_type(&self) -> Result<&NumberType, AccessError> {
        match self {
            Self::Number(n) => Ok(n),
            other => Err(AccessError::WrongValueTypeKind {
                expected: "numeric-type",
                actual: other.kind_name(),
            }),
        }
    }

    pub fn as_meta_frame_type(&self) -> Result<&FrameType, AccessError> {
        match self {
            Self::MetaFrame(t) => Ok(t),
            other => Err(AccessError::WrongValueTypeKind {
                expected: "meta-frame-type",
                actual: other.kind_name(),
            }),
        }
    }

    /// The value a slot of this type would default to.
    pub fn default_value(&self) -> Result<Value, AccessError> {
        match self {
            Self::Frame(t) | Self::MetaFrame(t) => Ok(Value::Frame(t.clone())),
            Self::Number(n) => n
                .single_point()
                .map(Value::Number)
                .ok_or_else(|| AccessError::UndefinedDefault {
                    value_type: n.to_string(),
                }),
        }
    }

    pub fn mentioned_frames(&self) -> Vec<FrameId> {
        match self {
            Self::Frame(t) | Self::MetaFrame(t) => t.mentioned_frames(),
            Self::Number(_) => Vec::new(),
        }
    }
}

impl From<FrameId> for ValueType {
    fn from(f: FrameId) -> Self {
        Self::Frame(FrameType::Model(f))
    }
}

impl From<NumberType> for ValueType {
    fn from(n: NumberType) -> Self {
        Self::Number(n)
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A slot value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// Reference to an instance frame.
    Instance(InstanceId),
    /// A frame-type used as a value.
    Frame(FrameType),
    Number(Number),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Instance(_) => "instance",
            Self::Frame(_) => "frame-type",
            Self::Number(_) => "number",
        }
    }

    pub fn as_instance(&self) -> Result<InstanceId, AccessError> {
        match self {
            Self::Instance(i) => Ok(*i),
            other => Err(AccessError::WrongValueKind {
                expected: "instance",
                actual: other.kind_name(),
            }),
        }
    }

    pub fn as_frame_type(&self) -> Result<&FrameType, AccessError> {
        match self {
            Self::Frame(t) => Ok(t),
            other => Err(AccessError::WrongValueKind {
                expected: "frame-type",
                actual: other.kind_name(),
            }),
        }
    }

    pub fn as_number(&self) -> Result<Number, AccessError> {
        match self {
            Self::Number(n) => Ok(*n),
            other => Err(AccessError::WrongValueKind {
                expected: "number",
                actual: other.kind_name(),
            }),
        }
    }

    pub fn instance(&self) -> Option<InstanceId> {
        match self {
            Self::Instance(i) => Some(*i),
            _ => None,
        }
    }

    pub fn mentioned_frames(&self) -> Vec<FrameId> {
        match self {
            Self::Frame(t) => t.mentioned_frames(),
            _ => Vec::new(),
        }
    }
}

impl From<InstanceId> for Value {
    fn from(i: InstanceId) -> Self {
        Self::Instance(i)
    }
}

impl From<FrameType> for Value {
    fn from(t: FrameType) -> Self {
        Self::Frame(t)
    }
}

impl From<FrameId> for Value {
    fn from(f: FrameId) -> Self {
        Self::Frame(FrameType::Model(f))
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Self::Number(n)
    }
}

// ---------------------------------------------------------------------------
// Value context
// ---------------------------------------------------------------------------

/// The relations slot-value bookkeeping needs, supplied by the model (for
/// concept-level slot-values) or by an instance graph (which also knows
/// the types of instance values).
pub trait ValueContext {
    /// Whether `a` subsumes `b`; a subsuming value adds nothing next to `b`.
    fn value_subsumes(&self, a: &Value, b: &Value) -> bool;

    /// The value-type a value belongs to most specifically.
    fn value_type_of(&self, value: &Value) -> Option<ValueType>;

    fn value_type_subsumes(&self, a: &ValueType, b: &ValueType) -> bool;

    /// Whether `value` belongs to `value_type`.
    fn conforms(&self, value_type: &ValueType, value: &Value) -> bool;

    /// Value-types that are equal.
    fn same_value_type(&self, a: &Value, b: &Value) -> bool {
        match (self.value_type_of(a), self.value_type_of(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    /// Value-types where one subsumes the other.
    fn related_value_types(&self, a: &Value, b: &Value) -> bool {
        match (self.value_type_of(a), self.value_type_of(b)) {
            (Some(x), Some(y)) => self.value_type_subsumes(&x, &y) || self.value_type_subsumes(&y, &x),
            _ => false,
        }
    }
}

/// Whether `values` can coexist as fixed values under `cardinality`.
pub fn fixed_values_legal(
    ctx: &dyn ValueContext,
    cardinality: Cardinality,
    values: &[Value],
) -> bool {
    match cardinality {
        Cardinality::SingleValue => values.len() <= 1,
        Cardinality::UniqueTypes => values.iter().enumerate().all(|(i, a)| {
            values[i + 1..]
                .iter()
                .all(|b| !ctx.same_value_type(a, b))
        }),
        Cardinality::Free => true,
    }
}
