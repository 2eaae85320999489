//! Backward fixed-point update propagation.
//!
//! A change to an instance's asserted values asks that instance's reasoner
//! to recompute, then walks back through the instances that hold it as a
//! slot-value. One pass visits each instance at most once; passes repeat
//! until a pass reports no reasoner change.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AccessError, KrResult, UpdateError};
use crate::identity::InstanceId;

use super::InstanceGraph;

/// One kind of recomputation a reasoner may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateOp {
    InferredTypes,
    SuggestedTypes,
    SlotStructure,
    SlotValues,
}

impl UpdateOp {
    pub const ALL: [UpdateOp; 4] = [
        UpdateOp::InferredTypes,
        UpdateOp::SuggestedTypes,
        UpdateOp::SlotStructure,
        UpdateOp::SlotValues,
    ];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for UpdateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InferredTypes => write!(f, "inferred-types"),
            Self::SuggestedTypes => write!(f, "suggested-types"),
            Self::SlotStructure => write!(f, "slot-structure"),
            Self::SlotValues => write!(f, "slot-values"),
        }
    }
}

/// A set of [`UpdateOp`]s.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct UpdateOps(u8);

impl UpdateOps {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(0b1111);

    pub fn contains(self, op: UpdateOp) -> bool {
        self.0 & op.bit() != 0
    }

    #[must_use]
    pub fn with(self, op: UpdateOp) -> Self {
        Self(self.0 | op.bit())
    }

    #[must_use]
    pub fn without(self, op: UpdateOp) -> Self {
        Self(self.0 & !op.bit())
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = UpdateOp> {
        UpdateOp::ALL.into_iter().filter(move |op| self.contains(*op))
    }
}

impl From<UpdateOp> for UpdateOps {
    fn from(op: UpdateOp) -> Self {
        Self::NONE.with(op)
    }
}

impl FromIterator<UpdateOp> for UpdateOps {
    fn from_iter<I: IntoIterator<Item = UpdateOp>>(iter: I) -> Self {
        iter.into_iter().fold(Self::NONE, Self::with)
    }
}

impl fmt::Debug for UpdateOps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Outcome of one propagation sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Passes run, including the final quiet pass.
    pub passes: usize,
    /// Reasoner invocations across all passes.
    pub frames_updated: usize,
    /// Whether any reasoner reported a change.
    pub changed: bool,
}

impl InstanceGraph<'_> {
    /// Propagate from `trigger` until a pass reports no change.
    pub(crate) fn propagate(&mut self, trigger: InstanceId, ops: UpdateOps) -> KrResult<UpdateReport> {
        let limit = self.model().config().max_update_passes.max(1);
        let mut report = UpdateReport::default();
        loop {
            if report.passes == limit {
                return Err(UpdateError::NoConvergence { passes: limit }.into());
            }
            report.passes += 1;
            let (updated, changed) = self.propagation_pass(trigger, ops)?;
            report.frames_updated += updated;
            tracing::debug!(trigger = %trigger, pass = report.passes, updated, changed, "propagation pass");
            if !changed {
                break;
            }
            report.changed = true;
        }
        Ok(report)
    }

    fn propagation_pass(&mut self, trigger: InstanceId, ops: UpdateOps) -> KrResult<(usize, bool)> {
        let mut visited: HashSet<InstanceId> = HashSet::new();
        let mut stack = vec![trigger];
        let mut updated = 0;
        let mut any_changed = false;
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let changed = self.update_frame_once(id, ops)?;
            updated += 1;
            any_changed |= changed;
            if changed || id == trigger {
                let referrers = self.frame(id)?.referencing_frames();
                stack.extend(referrers.into_iter().filter(|r| !visited.contains(r)));
            }
        }
        Ok((updated, any_changed))
    }

    /// Client-requested sweep from one instance. Only available when the
    /// model runs in manual update mode.
    pub fn update(&mut self, instance: InstanceId, ops: UpdateOps) -> KrResult<UpdateReport> {
        self.ensure_manual()?;
        self.frame(instance)?;
        let result = self.propagate(instance, ops);
        self.flush_events();
        result
    }

    /// Client-requested sweep over every instance.
    pub fn update_all(&mut self, ops: UpdateOps) -> KrResult<UpdateReport> {
        self.ensure_manual()?;
        let mut total = UpdateReport::default();
        let ids: Vec<InstanceId> = self.instances().collect();
        for id in ids {
            match self.propagate(id, ops) {
                Ok(report) => {
                    total.passes += report.passes;
                    total.frames_updated += report.frames_updated;
                    total.changed |= report.changed;
                }
                Err(err) => {
                    self.flush_events();
                    return Err(err);
                }
            }
        }
        self.flush_events();
        tracing::info!(passes = total.passes, updated = total.frames_updated, "manual update sweep");
        Ok(total)
    }

    fn ensure_manual(&self) -> KrResult<()> {
        if self.auto_update() {
            return Err(AccessError::ManualUpdateDisabled.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_set_membership() {
        let ops = UpdateOps::NONE.with(UpdateOp::SlotValues).with(UpdateOp::InferredTypes);
        assert!(ops.contains(UpdateOp::SlotValues));
        assert!(!ops.contains(UpdateOp::SlotStructure));
        assert!(ops.without(UpdateOp::SlotValues).without(UpdateOp::InferredTypes).is_empty());
        assert_eq!(UpdateOp::ALL.into_iter().collect::<UpdateOps>(), UpdateOps::ALL);
        assert_eq!(UpdateOps::ALL.iter().count(), 4);
    }

    #[test]
    fn op_names_are_kebab_case() {
        let json = serde_json::to_string(&UpdateOp::SuggestedTypes).unwrap();
        assert_eq!(json, "\"suggested-types\"");
        assert_eq!(UpdateOp::SlotStructure.to_string(), "slot-structure");
    }
}
