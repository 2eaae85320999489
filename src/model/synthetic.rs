//! Synthetic slot value-type frames.
//!
//! When a reasoner narrows a slot's value-type to a subset of a frame's
//! sub-frames, it asks the model for a synthetic frame standing for that
//! subset. Synthetic frames are created on demand, shared, and cached per
//! model. Concurrent requests for the same (super, subs) key converge on a
//! single frame: a lock-free read first, then a per-supertype lock with a
//! second lookup before creation.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;

use crate::error::{ModelError, ModelResult};
use crate::identity::{FrameId, Identity};
use crate::value::FrameType;

use super::Model;
use super::disjunction::Disjunction;

/// An anonymous value-type frame standing for a subset of sub-frames.
#[derive(Debug)]
pub struct SyntheticFrame {
    id: u64,
    identity: Identity,
    super_frame: FrameId,
    subs: Vec<FrameId>,
    value_type: FrameType,
}

impl SyntheticFrame {
    /// Creation sequence number, unique within one model.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn super_frame(&self) -> FrameId {
        self.super_frame
    }

    pub fn subs(&self) -> &[FrameId] {
        &self.subs
    }

    /// The frame-type the synthetic frame stands for: the union of its subs.
    pub fn value_type(&self) -> &FrameType {
        &self.value_type
    }
}

type SyntheticKey = (FrameId, Vec<FrameId>);

#[derive(Debug, Default)]
pub(crate) struct SyntheticFrameCache {
    frames: DashMap<SyntheticKey, Arc<SyntheticFrame>>,
    locks: DashMap<FrameId, Arc<Mutex<()>>>,
    next_id: AtomicU64,
}

impl SyntheticFrameCache {
    fn get_or_create<F>(&self, key: SyntheticKey, create: F) -> ModelResult<Arc<SyntheticFrame>>
    where
        F: FnOnce(u64) -> ModelResult<SyntheticFrame>,
    {
        if let Some(hit) = self.frames.get(&key) {
            return Ok(Arc::clone(hit.value()));
        }
        let lock = Arc::clone(self.locks.entry(key.0).or_default().value());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        // Double-check after acquiring the supertype lock
        if let Some(hit) = self.frames.get(&key) {
            return Ok(Arc::clone(hit.value()));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = Arc::new(create(id)?);
        self.frames.insert(key, Arc::clone(&frame));
        Ok(frame)
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn clear(&self) {
        self.frames.clear();
        self.locks.clear();
    }
}

impl Model {
    /// The shared synthetic frame for `subs` below `super_frame`.
    ///
    /// Every sub must lie strictly below the super. The subs are sorted and
    /// deduplicated before lookup, so argument order does not matter.
    pub fn synthetic_value_type(&self, super_frame: FrameId, subs: &[FrameId]) -> ModelResult<Arc<SyntheticFrame>> {
        self.frame(super_frame)?;
        let subs: Vec<FrameId> = subs.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        if subs.is_empty() {
            return Err(ModelError::EmptyDisjunction);
        }
        for &sub in &subs {
            if sub == super_frame || !self.frame_subsumes(super_frame, sub) {
                return Err(ModelError::InvalidSlotValue {
                    frame: self.label(super_frame),
                    property: "synthetic value-type".into(),
                    message: format!("{} is not a sub-frame", self.label(sub)),
                });
            }
        }
        let key = (super_frame, subs.clone());
        self.synthetic.get_or_create(key, |id| {
            let value_type = Disjunction::resolve(self, subs.iter().copied().map(FrameType::Model))?;
            let labels: Vec<String> = subs.iter().map(|s| self.label(*s)).collect();
            let identifier = format!("{}#synthetic{id}", self.label(super_frame));
            let label = format!("{}[{}]", self.label(super_frame), labels.join("|"));
            tracing::debug!(super_frame = %super_frame, subs = subs.len(), id, "created synthetic frame");
            Ok(SyntheticFrame {
                id,
                identity: Identity::new(identifier, label),
                super_frame,
                subs: subs.clone(),
                value_type,
            })
        })
    }

    /// Number of synthetic frames currently cached.
    pub fn synthetic_count(&self) -> usize {
        self.synthetic.len()
    }
}
