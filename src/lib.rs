// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # frame-kr
//!
//! A frame-based knowledge-representation engine: a concept-level type
//! hierarchy with multiple inheritance, an algebra of anonymous type
//! expressions, slots with cardinality-driven merge semantics, and an
//! instance layer kept consistent by backward fixed-point propagation.
//!
//! ## Architecture
//!
//! - **Model** (`model`): petgraph arena of model frames, subsumption with
//!   cached ancestor sets, disjunction and extension expressions, slots
//! - **Builder** (`builder`): staged construction through section builders,
//!   then normalisation and validation
//! - **Instances** (`instance`): instance frames with asserted and fixed
//!   slot-values, pluggable reasoners, reactive update propagation
//! - **Store** (`store`): identity-keyed instance map with pluggable query
//!   matchers
//!
//! ## Library usage
//!
//! ```no_run
//! use frame_kr::builder::{ModelBuilder, ModelEditor, SectionBuilder};
//! use frame_kr::config::ModelConfig;
//! use frame_kr::error::KrResult;
//! use frame_kr::identity::Identity;
//! use frame_kr::instance::InstanceGraph;
//!
//! struct Animals;
//!
//! impl SectionBuilder for Animals {
//!     fn build(&mut self, editor: &mut ModelEditor<'_>) -> KrResult<()> {
//!         let animal = editor.add_frame(Identity::from_id("Animal"), false)?;
//!         let dog = editor.add_frame(Identity::from_id("Dog"), false)?;
//!         editor.add_super(dog, animal)?;
//!         Ok(())
//!     }
//! }
//!
//! let mut builder = ModelBuilder::new(ModelConfig::default());
//! builder.register(Animals);
//! let model = builder.build().unwrap();
//! let dog = model.frame_by_identifier("Dog").unwrap();
//! let mut graph = InstanceGraph::new(model);
//! let rex = graph.instantiate(dog).unwrap();
//! ```

pub mod builder;
pub mod cardinality;
pub mod config;
pub mod error;
pub mod identity;
pub mod instance;
pub mod model;
pub mod setalgo;
pub mod store;
pub mod value;
