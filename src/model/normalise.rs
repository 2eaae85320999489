//! Hierarchy normalisation, run by every build pass.
//!
//! After normalisation:
//! - every frame but the root has at least one super-frame;
//! - every exposed frame but the root has an exposed direct super-frame,
//!   so following exposed supers always reaches the root;
//! - no direct link is redundant, where a link `f -> s` is redundant when
//!   another direct super of `f` already reaches `s`. A link from an
//!   exposed frame to an exposed super is kept when it is the only
//!   exposed route past hidden intermediates.

use petgraph::Direction;

use crate::identity::FrameId;

use super::{Model, Visibility};

/// Link changes made by one normalisation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormaliseReport {
    pub root_links_added: usize,
    pub exposure_links_added: usize,
    pub redundant_links_removed: usize,
}

impl Model {
    pub(crate) fn normalise(&mut self) -> NormaliseReport {
        self.invalidate();
        let mut report = NormaliseReport::default();
        let root = self.root;
        let frames: Vec<FrameId> = self.frames().filter(|f| *f != root).collect();

        for &frame in &frames {
            if self.direct(frame).is_empty() {
                self.graph.add_edge(frame.node(), root.node(), ());
                report.root_links_added += 1;
            }
        }

        for &frame in &frames {
            if self.is_hidden(frame) {
                continue;
            }
            let exposed_direct = self.direct(frame).into_iter().any(|s| !self.is_hidden(s));
            if exposed_direct {
                continue;
            }
            let mut targets = self.supers(frame, Visibility::Exposed);
            if targets.is_empty() {
                targets.push(root);
            }
            for target in targets {
                if !self.graph.contains_edge(frame.node(), target.node()) {
                    self.graph.add_edge(frame.node(), target.node(), ());
                    report.exposure_links_added += 1;
                }
            }
        }

        for &frame in &frames {
            let supers = self.direct(frame);
            let frame_hidden = self.is_hidden(frame);
            for &sup in &supers {
                let redundant = supers.iter().any(|&other| {
                    other != sup
                        && self.graph.contains_edge(frame.node(), other.node())
                        && self.frame_subsumes(sup, other)
                        && (frame_hidden || self.is_hidden(sup) || !self.is_hidden(other))
                });
                if redundant {
                    if let Some(edge) = self.graph.find_edge(frame.node(), sup.node()) {
                        self.graph.remove_edge(edge);
                        report.redundant_links_removed += 1;
                    }
                }
            }
        }

        self.invalidate();
        tracing::info!(
            root_links = report.root_links_added,
            exposure_links = report.exposure_links_added,
            redundant_removed = report.redundant_links_removed,
            "normalised hierarchy"
        );
        report
    }

    fn direct(&self, frame: FrameId) -> Vec<FrameId> {
        self.graph
            .neighbors_directed(frame.node(), Direction::Outgoing)
            .map(|node| self.frame_at(node))
            .collect()
    }

    fn is_hidden(&self, frame: FrameId) -> bool {
        self.frame(frame).is_ok_and(|n| n.hidden())
    }
}
