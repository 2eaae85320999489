//! Rich diagnostic error types for the frame-kr engine.
//!
//! Two broad families exist. [`ModelError`] reports a malformed model
//! (duplicate identities, cyclic links, incompatible merges) and aborts the
//! build or edit that triggered it. [`AccessError`] reports client misuse of
//! the API at the call site. Both carry miette error codes and help text.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the frame-kr engine.
#[derive(Debug, Error, Diagnostic)]
pub enum KrError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Update(#[from] UpdateError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Structural / model errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ModelError {
    #[error("frame already defined: {identifier}")]
    #[diagnostic(
        code(kr::model::duplicate_frame),
        help(
            "Every model frame identity must be unique. Use `resolve_frame` \
             if the section builder may encounter the same frame twice."
        )
    )]
    DuplicateFrame { identifier: String },

    #[error("property already defined: {identifier}")]
    #[diagnostic(
        code(kr::model::duplicate_property),
        help("Use `resolve_property` to obtain an existing property by identity.")
    )]
    DuplicateProperty { identifier: String },

    #[error("cyclic link: {super_frame} is already subsumed by {frame}")]
    #[diagnostic(
        code(kr::model::cyclic_link),
        help(
            "Adding this super-frame link would make the hierarchy cyclic. \
             Check the section builders for inverted or duplicated links."
        )
    )]
    CyclicLink { frame: String, super_frame: String },

    #[error("incompatible value-types for slot {property}: {first} vs {second}")]
    #[diagnostic(
        code(kr::model::incompatible_value_types),
        help(
            "Merged slot definitions must have value-types where one subsumes \
             the other. Align the value-types on the inherited slots."
        )
    )]
    IncompatibleValueTypes {
        property: String,
        first: String,
        second: String,
    },

    #[error("illegal fixed values for slot {property}: {count} value(s) under {cardinality}")]
    #[diagnostic(
        code(kr::model::illegal_fixed_values),
        help(
            "The fixed values supplied for this slot cannot coexist under its \
             cardinality. Single-value slots take at most one fixed value; \
             unique-types slots take at most one value per value-type."
        )
    )]
    IllegalFixedValues {
        property: String,
        cardinality: String,
        count: usize,
    },

    #[error("disjunction has no disjuncts")]
    #[diagnostic(
        code(kr::model::empty_disjunction),
        help("Supply at least one model frame to `Disjunction::resolve`.")
    )]
    EmptyDisjunction,

    #[error("extension frames cannot participate in a disjunction: {frame}")]
    #[diagnostic(
        code(kr::model::extension_in_disjunction),
        help("Disjunctions range over model frames only. Use the extended frame instead.")
    )]
    ExtensionInDisjunction { frame: String },

    #[error("a disjunction cannot be extended: {frame}")]
    #[diagnostic(
        code(kr::model::extension_of_disjunction),
        help("Extensions specialise one model frame. Extend each disjunct separately.")
    )]
    ExtensionOfDisjunction { frame: String },

    #[error("invalid numeric range: min {min} exceeds max {max}")]
    #[diagnostic(
        code(kr::model::invalid_range),
        help("Numeric value-type ranges are inclusive and require min <= max.")
    )]
    InvalidRange { min: String, max: String },

    #[error("frame {frame} has slot-values for {property} but no such slot")]
    #[diagnostic(
        code(kr::model::slot_value_without_slot),
        help("Add a slot for the property on the frame or one of its ancestors.")
    )]
    SlotValueWithoutSlot { frame: String, property: String },

    #[error("invalid slot-value on {frame}.{property}: {message}")]
    #[diagnostic(
        code(kr::model::invalid_slot_value),
        help("Slot-values must conform to the value-type of the slot they fill.")
    )]
    InvalidSlotValue {
        frame: String,
        property: String,
        message: String,
    },

    #[error("the root frame cannot be removed")]
    #[diagnostic(
        code(kr::model::root_removal),
        help("The root anchors the hierarchy. Remove its sub-frames instead.")
    )]
    RootRemoval,

    #[error("the root frame cannot be hidden")]
    #[diagnostic(
        code(kr::model::root_hidden),
        help("Every exposed frame needs an exposed path to the root, so the root stays exposed.")
    )]
    RootHidden,

    #[error("unknown frame: {frame}")]
    #[diagnostic(
        code(kr::model::unknown_frame),
        help("The frame handle does not refer to a live frame. It may have been removed.")
    )]
    UnknownFrame { frame: String },

    #[error("unknown property: {property}")]
    #[diagnostic(
        code(kr::model::unknown_property),
        help("Register the property with `add_property` before using it.")
    )]
    UnknownProperty { property: String },

    #[error("frame {frame} has no slot for {property}")]
    #[diagnostic(
        code(kr::model::unknown_slot),
        help("Add the slot first with `add_slot`.")
    )]
    UnknownSlot { frame: String, property: String },
}

// ---------------------------------------------------------------------------
// Access / usage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum AccessError {
    #[error("value-type is a {actual}, not a {expected}")]
    #[diagnostic(
        code(kr::access::wrong_value_type_kind),
        help("Match on the `ValueType` variant before casting.")
    )]
    WrongValueTypeKind {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("value is a {actual}, not a {expected}")]
    #[diagnostic(
        code(kr::access::wrong_value_kind),
        help("Match on the `Value` variant before casting.")
    )]
    WrongValueKind {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("frame type is not instantiable: {frame}")]
    #[diagnostic(
        code(kr::access::not_instantiable),
        help(
            "Hidden frames and the root cannot be instantiated, and disjunctions \
             only as query instances. Check `Model::instantiable` first."
        )
    )]
    NotInstantiable { frame: String },

    #[error("slot {property} is inactive")]
    #[diagnostic(
        code(kr::access::inactive_slot),
        help("Inactive slots cannot be edited until the model or reasoner activates them.")
    )]
    InactiveSlot { property: String },

    #[error("slot {property} is not editable")]
    #[diagnostic(
        code(kr::access::non_editable_slot),
        help("Only editable slots accept asserted values. Derived slots are reasoner-owned.")
    )]
    NonEditableSlot { property: String },

    #[error("query instance {value} cannot be a value of concrete instance {container}")]
    #[diagnostic(
        code(kr::access::query_in_concrete),
        help(
            "Concrete instances may only reference concrete instances. Values \
             added to a query instance are promoted to query status instead."
        )
    )]
    QueryValueInConcrete { container: String, value: String },

    #[error("value does not conform to the value-type of slot {property}")]
    #[diagnostic(
        code(kr::access::invalid_value_type),
        help("The value must belong to the slot's current value-type.")
    )]
    InvalidValueType { property: String },

    #[error("abstract value not allowed in concrete slot {property}")]
    #[diagnostic(
        code(kr::access::abstract_value),
        help("Type-level values are only allowed in query instances. Instantiate the type instead.")
    )]
    AbstractValue { property: String },

    #[error("cardinality {cardinality} of slot {property} rejects the value")]
    #[diagnostic(
        code(kr::access::cardinality_violation),
        help("Remove the existing value first, or choose a value compatible with it.")
    )]
    CardinalityViolation {
        property: String,
        cardinality: String,
    },

    #[error("no default value defined for {value_type}")]
    #[diagnostic(
        code(kr::access::undefined_default),
        help("Only frame, meta-frame and single-point numeric value-types define a default.")
    )]
    UndefinedDefault { value_type: String },

    #[error("no section builder registered of type {type_name}")]
    #[diagnostic(
        code(kr::access::unknown_section_builder),
        help("Register the section builder with `ModelBuilder::register` first.")
    )]
    UnknownSectionBuilder { type_name: &'static str },

    #[error("unknown instance: {instance}")]
    #[diagnostic(
        code(kr::access::unknown_instance),
        help("The instance handle does not belong to this instance graph.")
    )]
    UnknownInstance { instance: String },

    #[error("instance {instance} has no slot for {property}")]
    #[diagnostic(
        code(kr::access::unknown_instance_slot),
        help("The slot may be inactive, derived, or not defined on the instance's type.")
    )]
    UnknownInstanceSlot { instance: String, property: String },

    #[error("manual update requested while auto-update is enabled")]
    #[diagnostic(
        code(kr::access::manual_update_disabled),
        help("Set `auto_update = false` in the model config to drive updates manually.")
    )]
    ManualUpdateDisabled,

    #[error("model unavailable: builder is {state}")]
    #[diagnostic(
        code(kr::access::model_unavailable),
        help("Run `ModelBuilder::build` to completion. A failed build cannot be resumed.")
    )]
    ModelUnavailable { state: String },

    #[error("instance {instance} is not a query instance")]
    #[diagnostic(
        code(kr::access::not_a_query),
        help("Store matching takes a query instance. Create one with `instantiate_query`.")
    )]
    NotAQuery { instance: String },
}

// ---------------------------------------------------------------------------
// Dynamic update errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum UpdateError {
    #[error("dynamic update did not converge within {passes} passes")]
    #[diagnostic(
        code(kr::update::no_convergence),
        help(
            "A reasoning strategy keeps reporting changes. Check that its updates \
             are idempotent, or raise `max_update_passes` in the model config."
        )
    )]
    NoConvergence { passes: usize },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read model config: {path}")]
    #[diagnostic(
        code(kr::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse model config: {path}")]
    #[diagnostic(
        code(kr::config::parse),
        help("Check the TOML syntax and field names in the config file. {message}")
    )]
    Parse { path: String, message: String },

    #[error("failed to write model config: {path}")]
    #[diagnostic(
        code(kr::config::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown cardinality label: {label}")]
    #[diagnostic(
        code(kr::config::cardinality),
        help("Use one of single-value, unique-types or free.")
    )]
    Cardinality { label: String },
}

/// Convenience alias for functions returning frame-kr results.
pub type KrResult<T> = std::result::Result<T, KrError>;

/// Result alias for structural operations.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_error_converts_to_kr_error() {
        let err = ModelError::DuplicateFrame {
            identifier: "Dog".into(),
        };
        let kr: KrError = err.into();
        assert!(matches!(kr, KrError::Model(ModelError::DuplicateFrame { .. })));
    }

    #[test]
    fn access_error_converts_to_kr_error() {
        let kr: KrError = AccessError::ManualUpdateDisabled.into();
        assert!(matches!(kr, KrError::Access(AccessError::ManualUpdateDisabled)));
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = ModelError::CyclicLink {
            frame: "Dog".into(),
            super_frame: "Beagle".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("Dog"));
        assert!(msg.contains("Beagle"));
    }
}
