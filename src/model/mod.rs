//! The concept-level model: an arena of model frames and properties.
//!
//! Frames live in a `petgraph` [`StableDiGraph`] whose edges point from a
//! sub-frame to each of its direct super-frames. All hierarchy queries walk
//! these handle-based edges, so removing a frame and repairing its links
//! never involves owning references between frames.
//!
//! Structural edits go through the [`builder`](crate::builder); the model
//! itself only exposes read access publicly. Once a build completes the
//! model is immutable apart from its lazily filled caches, which are
//! concurrent maps, so a `&Model` can be shared across threads.

pub mod disjunction;
pub mod extension;
pub mod hierarchy;
pub mod index;
pub mod normalise;
pub mod slot;
pub mod synthetic;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::{ModelError, ModelResult};
use crate::identity::{FrameId, Identity, PropertyId};
use crate::instance::reasoner::{NoOpReasoner, Reasoner};
use crate::value::{FrameType, Value};

use self::hierarchy::HierarchyCache;
use self::index::ReferenceIndex;
use self::slot::ConceptSlot;
use self::synthetic::SyntheticFrameCache;

/// Where an entity's definition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    #[default]
    Unspecified,
    Internal,
    External,
    Dual,
}

impl Source {
    /// Combine two provenance tags. Differing specified sources yield `Dual`.
    pub fn combine(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::Unspecified, b) => b,
            (a, Self::Unspecified) => a,
            _ => Self::Dual,
        }
    }
}

/// Visibility filter for hierarchy queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    Exposed,
    Hidden,
    #[default]
    All,
}

impl Visibility {
    pub fn admits(self, hidden: bool) -> bool {
        match self {
            Self::Exposed => !hidden,
            Self::Hidden => hidden,
            Self::All => true,
        }
    }
}

/// A concept-level property.
#[derive(Debug, Clone)]
pub struct Property {
    identity: Identity,
    source: Source,
}

impl Property {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub(crate) fn set_source(&mut self, source: Source) {
        self.source = source;
    }
}

/// Node weight of the frame arena.
#[derive(Debug)]
pub struct FrameNode {
    identity: Identity,
    serial: u32,
    hidden: bool,
    source: Source,
    slots: BTreeMap<PropertyId, ConceptSlot>,
    slot_values: BTreeMap<PropertyId, Vec<Value>>,
    reasoner: Arc<dyn Reasoner>,
}

impl FrameNode {
    fn new(identity: Identity, serial: u32, hidden: bool) -> Self {
        Self {
            identity,
            serial,
            hidden,
            source: Source::Unspecified,
            slots: BTreeMap::new(),
            slot_values: BTreeMap::new(),
            reasoner: Arc::new(NoOpReasoner),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn hidden(&self) -> bool {
        self.hidden
    }

    pub fn source(&self) -> Source {
        self.source
    }

    /// Slots defined directly on this frame.
    pub fn slots(&self) -> &BTreeMap<PropertyId, ConceptSlot> {
        &self.slots
    }

    /// Default slot-values defined directly on this frame.
    pub fn slot_values(&self) -> &BTreeMap<PropertyId, Vec<Value>> {
        &self.slot_values
    }

    pub fn reasoner(&self) -> &Arc<dyn Reasoner> {
        &self.reasoner
    }

    /// Carries slots or default slot-values of its own.
    pub fn structured(&self) -> bool {
        !self.slots.is_empty() || !self.slot_values.is_empty()
    }
}

/// Validation queued until the complete stage.
pub(crate) type DeferredCheck = Box<dyn FnOnce(&Model) -> ModelResult<()> + Send>;

/// Counts reported by the complete stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionReport {
    pub frames_validated: usize,
    pub deferred_checks: usize,
}

/// The frame-kr concept model.
pub struct Model {
    config: ModelConfig,
    graph: StableDiGraph<FrameNode, ()>,
    root: FrameId,
    frames_by_identifier: HashMap<String, FrameId>,
    properties: Vec<Property>,
    properties_by_identifier: HashMap<String, PropertyId>,
    cache: HierarchyCache,
    references: ReferenceIndex,
    synthetic: SyntheticFrameCache,
    deferred: Mutex<Vec<DeferredCheck>>,
    initialized: bool,
    /// Serial for the next added frame; never reused.
    next_serial: u32,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("root", &self.root)
            .field("frames", &self.graph.node_count())
            .field("properties", &self.properties.len())
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl Model {
    /// Create a model holding only the root frame.
    pub fn new(config: ModelConfig) -> Self {
        let mut graph = StableDiGraph::new();
        let root_identity = Identity::new(config.root_identifier.clone(), config.root_label.clone());
        let root = FrameId::new(graph.add_node(FrameNode::new(root_identity, 0, false)), 0);
        let mut frames_by_identifier = HashMap::new();
        frames_by_identifier.insert(config.root_identifier.clone(), root);
        Self {
            config,
            graph,
            root,
            frames_by_identifier,
            properties: Vec::new(),
            properties_by_identifier: HashMap::new(),
            cache: HierarchyCache::default(),
            references: ReferenceIndex::default(),
            synthetic: SyntheticFrameCache::default(),
            deferred: Mutex::new(Vec::new()),
            initialized: false,
            next_serial: 1,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn root(&self) -> FrameId {
        self.root
    }

    /// Whether the last build pass completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// A removed frame's handle stays unknown even after its arena slot
    /// is reused.
    pub fn frame(&self, frame: FrameId) -> ModelResult<&FrameNode> {
        self.graph
            .node_weight(frame.node())
            .filter(|n| n.serial == frame.serial())
            .ok_or_else(|| ModelError::UnknownFrame {
                frame: frame.to_string(),
            })
    }

    pub(crate) fn frame_mut(&mut self, frame: FrameId) -> ModelResult<&mut FrameNode> {
        self.graph
            .node_weight_mut(frame.node())
            .filter(|n| n.serial == frame.serial())
            .ok_or_else(|| ModelError::UnknownFrame {
                frame: frame.to_string(),
            })
    }

    pub fn contains_frame(&self, frame: FrameId) -> bool {
        self.frame(frame).is_ok()
    }

    pub fn frame_by_identifier(&self, identifier: &str) -> Option<FrameId> {
        self.frames_by_identifier.get(identifier).copied()
    }

    /// All live frames in arena order.
    pub fn frames(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.graph
            .node_indices()
            .map(|node| FrameId::new(node, self.graph[node].serial))
    }

    /// Handle for a live arena node.
    pub(crate) fn frame_at(&self, node: NodeIndex) -> FrameId {
        FrameId::new(node, self.graph[node].serial)
    }

    pub fn frame_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn property(&self, property: PropertyId) -> ModelResult<&Property> {
        self.properties
            .get(property.index())
            .ok_or_else(|| ModelError::UnknownProperty {
                property: property.to_string(),
            })
    }

    pub fn property_by_identifier(&self, identifier: &str) -> Option<PropertyId> {
        self.properties_by_identifier.get(identifier).copied()
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    /// Display label of a frame, or its handle when it is gone.
    pub fn label(&self, frame: FrameId) -> String {
        self.frame(frame)
            .map_or_else(|_| frame.to_string(), |n| n.identity.label().to_string())
    }

    pub fn property_label(&self, property: PropertyId) -> String {
        self.property(property)
            .map_or_else(|_| property.to_string(), |p| p.identity.label().to_string())
    }

    /// Human-readable rendering of a frame-type.
    pub fn describe(&self, frame_type: &FrameType) -> String {
        match frame_type {
            FrameType::Model(f) => self.label(*f),
            FrameType::Disjunction(d) => {
                let parts: Vec<String> = d.disjuncts().map(|f| self.label(f)).collect();
                format!("({})", parts.join(" | "))
            }
            FrameType::Extension(e) => {
                let parts: Vec<String> = e
                    .slot_values()
                    .iter()
                    .map(|(p, vs)| format!("{}={}", self.property_label(*p), vs.len()))
                    .collect();
                let marker = if e.concrete() { "!" } else { "" };
                format!("{}{marker}[{}]", self.label(e.extended()), parts.join(", "))
            }
        }
    }

    /// Whether instances of `frame_type` may be created. Disjunctions are
    /// instantiable only as query instances.
    pub fn instantiable(&self, frame_type: &FrameType, query: bool) -> bool {
        match frame_type {
            FrameType::Model(f) => {
                *f != self.root && self.frame(*f).is_ok_and(|n| !n.hidden)
            }
            FrameType::Extension(e) => self.instantiable(&FrameType::Model(e.extended()), query),
            FrameType::Disjunction(d) => {
                query && d.disjuncts().all(|f| self.instantiable(&FrameType::Model(f), true))
            }
        }
    }

    /// The reasoning strategy governing instances of `frame_type`.
    /// Expressions delegate to their underlying model frame.
    pub fn reasoner_for(&self, frame_type: &FrameType) -> Arc<dyn Reasoner> {
        let frame = match frame_type {
            FrameType::Model(f) => *f,
            FrameType::Extension(e) => e.extended(),
            FrameType::Disjunction(d) => d.subsumer(self),
        };
        self.frame(frame)
            .map_or_else(|_| Arc::new(NoOpReasoner) as Arc<dyn Reasoner>, |n| Arc::clone(&n.reasoner))
    }

    /// Snapshot of the hierarchy for display.
    pub fn summary(&self) -> ModelSummary {
        let frames = self
            .frames()
            .filter_map(|f| {
                let node = self.frame(f).ok()?;
                Some(FrameSummary {
                    identifier: node.identity.identifier().to_string(),
                    label: node.identity.label().to_string(),
                    hidden: node.hidden,
                    supers: self
                        .supers(f, Visibility::All)
                        .into_iter()
                        .map(|s| self.label(s))
                        .collect(),
                    slots: node
                        .slots
                        .values()
                        .map(|s| format!("{} ({})", self.property_label(s.property()), s.cardinality()))
                        .collect(),
                })
            })
            .collect();
        ModelSummary {
            root: self.label(self.root),
            frames,
            properties: self.properties.len(),
        }
    }

    // -----------------------------------------------------------------------
    // Construction (reached through the builder)
    // -----------------------------------------------------------------------

    pub(crate) fn add_frame(&mut self, identity: Identity, hidden: bool) -> ModelResult<FrameId> {
        if self.frames_by_identifier.contains_key(identity.identifier()) {
            return Err(ModelError::DuplicateFrame {
                identifier: identity.identifier().to_string(),
            });
        }
        let key = identity.identifier().to_string();
        let serial = self.next_serial;
        self.next_serial += 1;
        let frame = FrameId::new(self.graph.add_node(FrameNode::new(identity, serial, hidden)), serial);
        self.frames_by_identifier.insert(key, frame);
        self.invalidate();
        tracing::debug!(frame = %frame, hidden, "added frame");
        Ok(frame)
    }

    pub(crate) fn add_property(&mut self, identity: Identity) -> ModelResult<PropertyId> {
        if self.properties_by_identifier.contains_key(identity.identifier()) {
            return Err(ModelError::DuplicateProperty {
                identifier: identity.identifier().to_string(),
            });
        }
        let id = PropertyId(self.properties.len() as u32);
        self.properties_by_identifier
            .insert(identity.identifier().to_string(), id);
        self.properties.push(Property {
            identity,
            source: Source::Unspecified,
        });
        Ok(id)
    }

    pub(crate) fn property_mut(&mut self, property: PropertyId) -> ModelResult<&mut Property> {
        self.properties
            .get_mut(property.index())
            .ok_or_else(|| ModelError::UnknownProperty {
                property: property.to_string(),
            })
    }

    pub(crate) fn set_hidden(&mut self, frame: FrameId, hidden: bool) -> ModelResult<()> {
        if frame == self.root && hidden {
            return Err(ModelError::RootHidden);
        }
        self.frame_mut(frame)?.hidden = hidden;
        self.invalidate();
        Ok(())
    }

    pub(crate) fn set_source(&mut self, frame: FrameId, source: Source) -> ModelResult<()> {
        self.frame_mut(frame)?.source = source;
        Ok(())
    }

    pub(crate) fn set_reasoner(&mut self, frame: FrameId, reasoner: Arc<dyn Reasoner>) -> ModelResult<()> {
        self.frame_mut(frame)?.reasoner = reasoner;
        Ok(())
    }

    pub(crate) fn references(&self) -> &ReferenceIndex {
        &self.references
    }

    pub(crate) fn references_mut(&mut self) -> &mut ReferenceIndex {
        &mut self.references
    }

    /// Drop every derived cache after a structural change.
    pub(crate) fn invalidate(&mut self) {
        self.cache.clear();
        self.synthetic.clear();
    }

    // -----------------------------------------------------------------------
    // Build lifecycle
    // -----------------------------------------------------------------------

    /// Enter a build pass: the model is uninitialized until it completes.
    pub(crate) fn begin_build(&mut self) {
        self.initialized = false;
        self.invalidate();
    }

    /// Queue a validation for the complete stage, or run it now if the
    /// model is already initialized.
    pub(crate) fn defer_or_run(&self, check: DeferredCheck) -> ModelResult<()> {
        if self.initialized {
            return check(self);
        }
        self.deferred
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(check);
        Ok(())
    }

    /// Validate every frame, drain deferred checks, and mark initialized.
    pub(crate) fn complete_build(&mut self) -> ModelResult<CompletionReport> {
        let frames: Vec<FrameId> = self.frames().collect();
        if self.config.parallel_validation {
            frames.par_iter().try_for_each(|&f| self.validate_frame(f))?;
        } else {
            frames.iter().try_for_each(|&f| self.validate_frame(f))?;
        }

        let checks = std::mem::take(
            &mut *self.deferred.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let deferred_checks = checks.len();
        for check in checks {
            check(self)?;
        }

        self.initialized = true;
        let report = CompletionReport {
            frames_validated: frames.len(),
            deferred_checks,
        };
        tracing::info!(
            frames = report.frames_validated,
            deferred = report.deferred_checks,
            properties = self.properties.len(),
            "model initialized"
        );
        Ok(report)
    }

    /// Drop deferred checks queued by a failed pass.
    pub(crate) fn discard_deferred(&mut self) {
        self.deferred
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Serializable hierarchy snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub root: String,
    pub frames: Vec<FrameSummary>,
    pub properties: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameSummary {
    pub identifier: String,
    pub label: String,
    pub hidden: bool,
    pub supers: Vec<String>,
    pub slots: Vec<String>,
}
