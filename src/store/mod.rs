//! Identity-keyed instance store.
//!
//! [`InstanceStore`] maps identities to concrete instances of one
//! [`InstanceGraph`] in a concurrent hashmap (DashMap). Query matching is
//! delegated to the first registered [`InstanceMatcher`] that handles the
//! query's type.

pub mod matcher;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::{AccessError, KrResult};
use crate::identity::{Identity, InstanceId};
use crate::instance::InstanceGraph;
use crate::value::FrameType;

pub use matcher::InstanceMatcher;

#[derive(Debug, Default)]
pub struct InstanceStore {
    entries: DashMap<Identity, InstanceId>,
    matchers: Vec<Box<dyn InstanceMatcher>>,
}

impl InstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a matcher. Matchers are consulted in registration order.
    pub fn register_matcher(&mut self, matcher: Box<dyn InstanceMatcher>) -> &mut Self {
        tracing::debug!(matcher = matcher.name(), "registered instance matcher");
        self.matchers.push(matcher);
        self
    }

    fn matcher_for(&self, graph: &InstanceGraph<'_>, frame_type: &FrameType) -> Option<&dyn InstanceMatcher> {
        self.matchers
            .iter()
            .find(|m| m.handles_type(graph.model(), frame_type))
            .map(|m| m.as_ref())
    }

    /// Store a concrete instance under `identity`. Returns `false` for a
    /// taken identity or a query instance.
    pub fn add(&self, graph: &InstanceGraph<'_>, instance: InstanceId, identity: Identity) -> KrResult<bool> {
        let frame = graph.frame(instance)?;
        if frame.is_query() {
            return Ok(false);
        }
        match self.entries.entry(identity.clone()) {
            Entry::Occupied(_) => return Ok(false),
            Entry::Vacant(e) => {
                e.insert(instance);
            }
        }
        if let Some(matcher) = self.matcher_for(graph, frame.frame_type()) {
            matcher.add(graph, instance, &identity);
        }
        Ok(true)
    }

    /// Remove the instance stored under `identity`, provided its type is
    /// subsumed by `frame_type`.
    pub fn remove(&self, graph: &InstanceGraph<'_>, frame_type: &FrameType, identity: &Identity) -> bool {
        let Some(instance) = self.get(graph, frame_type, identity) else {
            return false;
        };
        if self.entries.remove(identity).is_none() {
            return false;
        }
        if let Ok(frame) = graph.frame(instance) {
            if let Some(matcher) = self.matcher_for(graph, frame.frame_type()) {
                matcher.remove(graph, instance, identity);
            }
        }
        true
    }

    /// The instance stored under `identity`, if its type is subsumed by
    /// `frame_type`.
    pub fn get(&self, graph: &InstanceGraph<'_>, frame_type: &FrameType, identity: &Identity) -> Option<InstanceId> {
        let instance = *self.entries.get(identity)?.value();
        graph
            .instance_subsumed_by(frame_type, instance)
            .then_some(instance)
    }

    /// Identities matching a query instance; empty when no matcher
    /// handles the query's type.
    pub fn match_query(&self, graph: &InstanceGraph<'_>, query: InstanceId) -> KrResult<Vec<Identity>> {
        let frame = graph.frame(query)?;
        if !frame.is_query() {
            return Err(AccessError::NotAQuery {
                instance: graph.describe_instance(query),
            }
            .into());
        }
        Ok(self
            .matcher_for(graph, frame.frame_type())
            .map(|m| m.matches(graph, query))
            .unwrap_or_default())
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
