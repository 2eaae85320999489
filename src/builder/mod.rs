//! Staged model construction.
//!
//! A [`ModelBuilder`] owns the model under construction and a list of
//! [`SectionBuilder`]s. Each call to [`ModelBuilder::build`] is one pass:
//!
//! 1. **Building**: section builders edit the model through a
//!    [`ModelEditor`]. The first pass runs every section builder; later
//!    passes run only those that support incremental builds.
//! 2. **Normalizing**: orphans are linked to the root, exposed frames get
//!    an exposed path to the root, and redundant links are removed.
//! 3. **Complete**: every frame's slot structure and default slot-values
//!    are validated and deferred extension checks run.
//!
//! Any error fails the builder permanently; a partially built model is
//! never handed out.

pub mod editor;

use std::any::Any;
use std::fmt;

use crate::config::ModelConfig;
use crate::error::{AccessError, KrResult};
use crate::model::Model;

pub use editor::{FrameEditor, ModelEditor, PropertyEditor, SlotEditor};

/// A client-owned unit of model construction.
pub trait SectionBuilder: Any + Send {
    /// Human-readable name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Whether this builder runs again on incremental passes.
    fn supports_incremental_build(&self) -> bool {
        false
    }

    fn build(&mut self, editor: &mut ModelEditor<'_>) -> KrResult<()>;
}

impl fmt::Debug for dyn SectionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectionBuilder")
            .field("name", &self.name())
            .field("incremental", &self.supports_incremental_build())
            .finish()
    }
}

/// Lifecycle state of a [`ModelBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Uninitialized,
    Building { incremental: bool },
    Normalizing,
    Complete,
    Failed,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Building { incremental: false } => write!(f, "building"),
            Self::Building { incremental: true } => write!(f, "building (incremental)"),
            Self::Normalizing => write!(f, "normalizing"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Owns a model through its build passes.
#[derive(Debug)]
pub struct ModelBuilder {
    model: Model,
    sections: Vec<Box<dyn SectionBuilder>>,
    state: BuildState,
    passes: usize,
}

impl ModelBuilder {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            model: Model::new(config),
            sections: Vec::new(),
            state: BuildState::Uninitialized,
            passes: 0,
        }
    }

    /// Register a section builder; it runs in registration order.
    pub fn register<S: SectionBuilder>(&mut self, section: S) -> &mut Self {
        self.sections.push(Box::new(section));
        self
    }

    /// Look up a registered section builder by concrete type.
    pub fn section<S: SectionBuilder>(&self) -> KrResult<&S> {
        self.sections
            .iter()
            .find_map(|s| {
                let any: &dyn Any = &**s;
                any.downcast_ref::<S>()
            })
            .ok_or_else(|| {
                AccessError::UnknownSectionBuilder {
                    type_name: std::any::type_name::<S>(),
                }
                .into()
            })
    }

    pub fn section_mut<S: SectionBuilder>(&mut self) -> KrResult<&mut S> {
        self.sections
            .iter_mut()
            .find_map(|s| {
                let any: &mut dyn Any = &mut **s;
                any.downcast_mut::<S>()
            })
            .ok_or_else(|| {
                AccessError::UnknownSectionBuilder {
                    type_name: std::any::type_name::<S>(),
                }
                .into()
            })
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Number of completed passes.
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Editor for mechanisms outside the section builders. Edits made
    /// here take effect on the next pass's normalisation and validation.
    pub fn editor(&mut self) -> KrResult<ModelEditor<'_>> {
        self.ensure_usable()?;
        Ok(ModelEditor::new(&mut self.model))
    }

    /// Run one build pass and return the completed model.
    pub fn build(&mut self) -> KrResult<&Model> {
        self.ensure_usable()?;
        let incremental = self.passes > 0;
        match self.run_pass(incremental) {
            Ok(()) => {
                self.state = BuildState::Complete;
                self.passes += 1;
                Ok(&self.model)
            }
            Err(err) => {
                tracing::warn!(stage = %self.state, error = %err, "model build failed");
                self.state = BuildState::Failed;
                self.model.discard_deferred();
                Err(err)
            }
        }
    }

    fn run_pass(&mut self, incremental: bool) -> KrResult<()> {
        self.state = BuildState::Building { incremental };
        self.model.begin_build();
        let runnable = self
            .sections
            .iter()
            .filter(|s| !incremental || s.supports_incremental_build())
            .count();
        tracing::info!(incremental, sections = runnable, "building model");

        for section in self.sections.iter_mut() {
            if incremental && !section.supports_incremental_build() {
                continue;
            }
            tracing::debug!(section = section.name(), "running section builder");
            let mut editor = ModelEditor::new(&mut self.model);
            section.build(&mut editor)?;
        }

        self.state = BuildState::Normalizing;
        self.model.normalise();
        self.model.complete_build()?;
        Ok(())
    }

    /// The completed model.
    pub fn model(&self) -> KrResult<&Model> {
        match self.state {
            BuildState::Complete => Ok(&self.model),
            state => Err(AccessError::ModelUnavailable {
                state: state.to_string(),
            }
            .into()),
        }
    }

    /// Take ownership of the completed model.
    pub fn into_model(self) -> KrResult<Model> {
        match self.state {
            BuildState::Complete => Ok(self.model),
            state => Err(AccessError::ModelUnavailable {
                state: state.to_string(),
            }
            .into()),
        }
    }

    fn ensure_usable(&self) -> KrResult<()> {
        if self.state == BuildState::Failed {
            return Err(AccessError::ModelUnavailable {
                state: self.state.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{KrError, ModelError};
    use crate::identity::Identity;

    #[derive(Debug, Default)]
    struct Animals {
        runs: usize,
    }

    impl SectionBuilder for Animals {
        fn build(&mut self, editor: &mut ModelEditor<'_>) -> KrResult<()> {
            self.runs += 1;
            let animal = editor.resolve_frame(Identity::from_id("Animal"), false)?;
            let dog = editor.resolve_frame(Identity::from_id("Dog"), false)?;
            editor.add_super(dog, animal)?;
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct Extras {
        runs: usize,
    }

    impl SectionBuilder for Extras {
        fn supports_incremental_build(&self) -> bool {
            true
        }

        fn build(&mut self, editor: &mut ModelEditor<'_>) -> KrResult<()> {
            self.runs += 1;
            editor.resolve_frame(Identity::from_id(format!("Extra{}", self.runs)), false)?;
            Ok(())
        }
    }

    struct Broken;

    impl SectionBuilder for Broken {
        fn build(&mut self, editor: &mut ModelEditor<'_>) -> KrResult<()> {
            editor.add_frame(Identity::from_id("Twice"), false)?;
            editor.add_frame(Identity::from_id("Twice"), false)?;
            Ok(())
        }
    }

    #[test]
    fn first_pass_runs_all_sections_later_passes_incremental_only() {
        let mut builder = ModelBuilder::new(ModelConfig::default());
        builder.register(Animals::default()).register(Extras::default());
        builder.build().unwrap();
        builder.build().unwrap();
        assert_eq!(builder.section::<Animals>().unwrap().runs, 1);
        assert_eq!(builder.section::<Extras>().unwrap().runs, 2);
        assert_eq!(builder.passes(), 2);
        let model = builder.model().unwrap();
        assert!(model.frame_by_identifier("Extra2").is_some());
        assert!(model.is_initialized());
    }

    #[test]
    fn unregistered_section_lookup_fails() {
        let builder = ModelBuilder::new(ModelConfig::default());
        let err = builder.section::<Animals>().unwrap_err();
        assert!(matches!(
            err,
            KrError::Access(AccessError::UnknownSectionBuilder { .. })
        ));
    }

    #[test]
    fn failed_build_makes_model_unavailable() {
        let mut builder = ModelBuilder::new(ModelConfig::default());
        builder.register(Broken);
        let err = builder.build().unwrap_err();
        assert!(matches!(err, KrError::Model(ModelError::DuplicateFrame { .. })));
        assert_eq!(builder.state(), BuildState::Failed);
        assert!(builder.model().is_err());
        assert!(builder.build().is_err());
    }

    #[test]
    fn model_unavailable_before_first_build() {
        let builder = ModelBuilder::new(ModelConfig::default());
        assert!(matches!(
            builder.model(),
            Err(KrError::Access(AccessError::ModelUnavailable { .. }))
        ));
    }
}
