//! Query-matcher plug-in contract.

use std::fmt;

use crate::identity::{Identity, InstanceId};
use crate::instance::InstanceGraph;
use crate::model::Model;
use crate::value::FrameType;

/// Answers query instances for the stored instances of the types it
/// handles. Matchers are notified of every store addition and removal
/// whose instance type they handle.
pub trait InstanceMatcher: Send + Sync {
    fn name(&self) -> &str;

    fn handles_type(&self, model: &Model, frame_type: &FrameType) -> bool;

    fn add(&self, graph: &InstanceGraph<'_>, instance: InstanceId, identity: &Identity);

    fn remove(&self, graph: &InstanceGraph<'_>, instance: InstanceId, identity: &Identity);

    /// Identities of stored instances matching `query`.
    fn matches(&self, graph: &InstanceGraph<'_>, query: InstanceId) -> Vec<Identity>;
}

impl fmt::Debug for dyn InstanceMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceMatcher({})", self.name())
    }
}
