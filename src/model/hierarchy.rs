//! Hierarchy traversal, subsumption, and link maintenance.
//!
//! Ancestor and descendant sets are computed by a breadth-first crawler
//! over super- or sub-links with a visited-set, filtered by visibility,
//! and cached per (frame, visibility) until the next structural change.
//! Direct subsumption tests do not build full ancestor sets: they run a
//! single-target upward search that stops as soon as the target is found.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use petgraph::Direction;

use crate::error::{ModelError, ModelResult};
use crate::identity::FrameId;
use crate::value::FrameType;

use super::{Model, Visibility};

/// Lazily filled ancestor/descendant caches.
#[derive(Debug, Default)]
pub(crate) struct HierarchyCache {
    ancestors: DashMap<(FrameId, Visibility), Arc<Vec<FrameId>>>,
    descendants: DashMap<(FrameId, Visibility), Arc<Vec<FrameId>>>,
    structured: DashMap<FrameId, Arc<Vec<FrameId>>>,
}

impl HierarchyCache {
    pub(crate) fn clear(&self) {
        self.ancestors.clear();
        self.descendants.clear();
        self.structured.clear();
    }
}

impl Model {
    fn neighbours(&self, frame: FrameId, direction: Direction) -> Vec<FrameId> {
        if !self.contains_frame(frame) {
            return Vec::new();
        }
        let mut out: Vec<FrameId> = self
            .graph
            .neighbors_directed(frame.node(), direction)
            .map(|node| self.frame_at(node))
            .collect();
        out.sort();
        out.dedup();
        out
    }

    fn hidden_frame(&self, frame: FrameId) -> bool {
        self.frame(frame).is_ok_and(|n| n.hidden)
    }

    /// Direct super-frames. With a visibility filter, frames that fail the
    /// filter are looked through to the closest admitted frames beyond them.
    pub fn supers(&self, frame: FrameId, visibility: Visibility) -> Vec<FrameId> {
        self.closest(frame, Direction::Outgoing, visibility)
    }

    /// Direct sub-frames, filtered as for [`Model::supers`].
    pub fn subs(&self, frame: FrameId, visibility: Visibility) -> Vec<FrameId> {
        self.closest(frame, Direction::Incoming, visibility)
    }

    fn closest(&self, frame: FrameId, direction: Direction, visibility: Visibility) -> Vec<FrameId> {
        if visibility == Visibility::All {
            return self.neighbours(frame, direction);
        }
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        let mut queue: VecDeque<FrameId> = self.neighbours(frame, direction).into();
        while let Some(next) = queue.pop_front() {
            if !visited.insert(next) {
                continue;
            }
            if visibility.admits(self.hidden_frame(next)) {
                if !out.contains(&next) {
                    out.push(next);
                }
            } else {
                queue.extend(self.neighbours(next, direction));
            }
        }
        out
    }

    /// Breadth-first closure over links in one direction, excluding the
    /// start frame, keeping frames admitted by `visibility`.
    fn crawl(&self, frame: FrameId, direction: Direction, visibility: Visibility) -> Vec<FrameId> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(frame);
        let mut queue: VecDeque<FrameId> = self.neighbours(frame, direction).into();
        while let Some(next) = queue.pop_front() {
            if !visited.insert(next) {
                continue;
            }
            if visibility.admits(self.hidden_frame(next)) {
                out.push(next);
            }
            queue.extend(self.neighbours(next, direction));
        }
        out
    }

    /// All strict ancestors, nearest first.
    pub fn ancestors(&self, frame: FrameId, visibility: Visibility) -> Arc<Vec<FrameId>> {
        if let Some(hit) = self.cache.ancestors.get(&(frame, visibility)) {
            return Arc::clone(hit.value());
        }
        let computed = Arc::new(self.crawl(frame, Direction::Outgoing, visibility));
        self.cache
            .ancestors
            .insert((frame, visibility), Arc::clone(&computed));
        computed
    }

    /// All strict descendants, nearest first.
    pub fn descendants(&self, frame: FrameId, visibility: Visibility) -> Arc<Vec<FrameId>> {
        if let Some(hit) = self.cache.descendants.get(&(frame, visibility)) {
            return Arc::clone(hit.value());
        }
        let computed = Arc::new(self.crawl(frame, Direction::Incoming, visibility));
        self.cache
            .descendants
            .insert((frame, visibility), Arc::clone(&computed));
        computed
    }

    /// Ancestors carrying slots or default slot-values of their own.
    pub fn structured_ancestors(&self, frame: FrameId) -> Arc<Vec<FrameId>> {
        if let Some(hit) = self.cache.structured.get(&frame) {
            return Arc::clone(hit.value());
        }
        let computed: Vec<FrameId> = self
            .ancestors(frame, Visibility::All)
            .iter()
            .copied()
            .filter(|a| self.frame(*a).is_ok_and(|n| n.structured()))
            .collect();
        let computed = Arc::new(computed);
        self.cache.structured.insert(frame, Arc::clone(&computed));
        computed
    }

    /// Whether model frame `a` subsumes model frame `b`.
    pub fn frame_subsumes(&self, a: FrameId, b: FrameId) -> bool {
        if a == b || a == self.root {
            return self.contains_frame(b);
        }
        if !self.contains_frame(b) {
            return false;
        }
        if let Some(hit) = self.cache.ancestors.get(&(b, Visibility::All)) {
            return hit.contains(&a);
        }
        let mut visited = HashSet::new();
        let mut stack = vec![b];
        while let Some(next) = stack.pop() {
            if !visited.insert(next) {
                continue;
            }
            for up in self.graph.neighbors_directed(next.node(), Direction::Outgoing) {
                let up = self.frame_at(up);
                if up == a {
                    return true;
                }
                stack.push(up);
            }
        }
        false
    }

    /// Whether frame-type `a` subsumes frame-type `b`.
    pub fn subsumes(&self, a: &FrameType, b: &FrameType) -> bool {
        if a == b {
            return true;
        }
        match a {
            FrameType::Model(fa) => b
                .subsumption_disjuncts()
                .iter()
                .all(|d| self.frame_subsumes(*fa, *d)),
            FrameType::Disjunction(da) => b
                .subsumption_disjuncts()
                .iter()
                .all(|d| da.disjuncts().any(|x| self.frame_subsumes(x, *d))),
            FrameType::Extension(ea) => {
                if ea.concrete() {
                    return false;
                }
                match b {
                    FrameType::Disjunction(db) => db
                        .disjuncts()
                        .all(|d| self.subsumes(a, &FrameType::Model(d))),
                    _ => {
                        b.subsumption_disjuncts()
                            .iter()
                            .all(|d| self.frame_subsumes(ea.extended(), *d))
                            && self.extension_values_subsume(ea, b)
                    }
                }
            }
        }
    }

    /// Every slot-value of `ext` must subsume some value `b` carries for
    /// the same property, inherited or its own.
    fn extension_values_subsume(
        &self,
        ext: &super::extension::Extension,
        b: &FrameType,
    ) -> bool {
        let b_values = self.merged_slot_values(b);
        ext.slot_values().iter().all(|(property, required)| {
            let Some(available) = b_values.get(property) else {
                return false;
            };
            required
                .iter()
                .all(|r| available.iter().any(|v| self.model_value_subsumes(r, v)))
        })
    }

    // -----------------------------------------------------------------------
    // Link maintenance
    // -----------------------------------------------------------------------

    /// Add a direct super-link. Returns `false` if the link already exists.
    pub(crate) fn add_super_link(&mut self, frame: FrameId, super_frame: FrameId) -> ModelResult<bool> {
        self.frame(frame)?;
        self.frame(super_frame)?;
        if frame == super_frame || self.frame_subsumes(frame, super_frame) {
            return Err(ModelError::CyclicLink {
                frame: self.label(frame),
                super_frame: self.label(super_frame),
            });
        }
        if self.graph.contains_edge(frame.node(), super_frame.node()) {
            return Ok(false);
        }
        self.graph.add_edge(frame.node(), super_frame.node(), ());
        self.invalidate();
        Ok(true)
    }

    /// Remove a direct super-link. Returns `false` if there was none.
    pub(crate) fn remove_super_link(&mut self, frame: FrameId, super_frame: FrameId) -> bool {
        if !self.contains_frame(frame) || !self.contains_frame(super_frame) {
            return false;
        }
        let Some(edge) = self.graph.find_edge(frame.node(), super_frame.node()) else {
            return false;
        };
        self.graph.remove_edge(edge);
        self.invalidate();
        true
    }

    /// Remove a frame, re-linking each former sub-frame to each former
    /// super-frame, and purge every slot and default slot-value that
    /// refers to it. Handles to the removed frame must not be reused.
    pub(crate) fn remove_frame(&mut self, frame: FrameId) -> ModelResult<()> {
        if frame == self.root {
            return Err(ModelError::RootRemoval);
        }
        self.frame(frame)?;
        let supers = self.neighbours(frame, Direction::Outgoing);
        let subs = self.neighbours(frame, Direction::Incoming);

        let slot_refs = self.references.slots_referencing(frame);
        let value_refs = self.references.value_owners(frame);

        let removed = self
            .graph
            .remove_node(frame.node())
            .ok_or_else(|| ModelError::UnknownFrame {
                frame: frame.to_string(),
            })?;
        self.frames_by_identifier.remove(removed.identity.identifier());
        for (property, slot) in &removed.slots {
            self.references
                .unindex_slot(frame, *property, slot.value_type());
        }
        for (property, values) in &removed.slot_values {
            self.references.unindex_values(frame, *property, values);
        }

        let mut relinked = 0usize;
        for &sub in &subs {
            for &sup in &supers {
                if !self.graph.contains_edge(sub.node(), sup.node()) {
                    self.graph.add_edge(sub.node(), sup.node(), ());
                    relinked += 1;
                }
            }
            if self.graph.neighbors_directed(sub.node(), Direction::Outgoing).next().is_none() {
                self.graph.add_edge(sub.node(), self.root.node(), ());
                relinked += 1;
            }
        }

        let mut purged_slots = 0usize;
        for (container, property) in slot_refs {
            if container != frame && self.purge_slot(container, property) {
                purged_slots += 1;
            }
        }
        let mut purged_values = 0usize;
        for (owner, property) in value_refs {
            if owner != frame {
                purged_values += self.purge_values_mentioning(owner, property, frame);
            }
        }

        self.invalidate();
        tracing::debug!(
            frame = %frame,
            label = removed.identity.label(),
            relinked,
            purged_slots,
            purged_values,
            "removed frame"
        );
        Ok(())
    }
}
