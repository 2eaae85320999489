//! Identities and handles for named and anonymous entities.
//!
//! Every named entity (model frame, property) is keyed by an [`Identity`]:
//! an immutable identifier paired with a human-readable label. Frames,
//! properties and instance frames are addressed through cheap `Copy`
//! handles into their owning arenas.

use std::fmt;
use std::hash::{Hash, Hasher};

use petgraph::stable_graph::NodeIndex;
use serde::{Deserialize, Serialize};

/// Immutable (identifier, label) pair.
///
/// Equality and hashing use the identifier only; the label is display data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    identifier: String,
    label: String,
}

impl Identity {
    /// Create an identity with a distinct label.
    pub fn new(identifier: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            label: label.into(),
        }
    }

    /// Create an identity whose label is the identifier itself.
    pub fn from_id(identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self {
            label: identifier.clone(),
            identifier,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// Handle to a model frame node in the hierarchy arena.
///
/// Backed by a stable graph index, so removing other frames never
/// invalidates it. The arena reuses the slots of removed frames; the
/// serial tells a reused slot apart from the frame that held it before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId {
    node: NodeIndex,
    serial: u32,
}

impl FrameId {
    pub(crate) fn new(node: NodeIndex, serial: u32) -> Self {
        Self { node, serial }
    }

    pub(crate) fn node(self) -> NodeIndex {
        self.node
    }

    pub(crate) fn serial(self) -> u32 {
        self.serial
    }

    /// Raw arena index, useful for diagnostics.
    pub fn index(self) -> usize {
        self.node.index()
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.serial as usize == self.node.index() {
            write!(f, "frame:{}", self.node.index())
        } else {
            write!(f, "frame:{}#{}", self.node.index(), self.serial)
        }
    }
}

/// Handle to a concept-level property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PropertyId(pub(crate) u32);

impl PropertyId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "prop:{}", self.0)
    }
}

/// Handle to an instance frame within an [`InstanceGraph`](crate::instance::InstanceGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct InstanceId(pub(crate) u32);

impl InstanceId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inst:{}", self.0)
    }
}
