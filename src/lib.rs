//! # almanac
//!
//! A versioned knowledge-library and publication engine: accumulates,
//! versions, and republishes small bodies of reference knowledge that
//! downstream computations pin to immutably for reproducibility.
//!
//! ## Architecture
//!
//! - **Versioned store** (`store`): immutable snapshots plus one active
//!   pointer per knowledge domain — in-memory reference or redb-durable
//! - **Generic manager** (`manager`): the publish workflow, shared across
//!   domains through two hooks on [`manager::KnowledgeDomain`]
//! - **Mapping library** (`mapping`): text patterns → target codes, refined
//!   from recorded analyst overrides via the learning loop (`learning`)
//! - **Assumption library** (`assumption`): sector-scoped default values
//! - **Scenario patterns** (`scenario`): unversioned archetypes merged by
//!   cosine similarity with rolling-average profiles
//! - **Publication** (`publication`): quality gate + full-cycle orchestrator
//!
//! ## Library usage
//!
//! ```
//! use almanac::learning::{InMemoryLearningLoop, OverrideRecord};
//! use almanac::publication::{CycleRequest, PublicationOrchestrator, PublicationQualityGate};
//!
//! let mut orchestrator = PublicationOrchestrator::in_memory();
//! let mut learning = InMemoryLearningLoop::new();
//! learning.record_override(OverrideRecord::new("steel rebar supply", "S02", "S02"));
//! learning.record_override(OverrideRecord::new("steel rebar supply", "S02", "S02"));
//!
//! let gate = PublicationQualityGate::default();
//! let outcome = orchestrator
//!     .publish_new_cycle(CycleRequest {
//!         learning_loop: Some(&learning),
//!         steward_approved: true,
//!         quality_gate: Some(&gate),
//!         ..CycleRequest::bare("steward")
//!     })
//!     .unwrap();
//! assert!(outcome.mapping_version.is_some());
//! ```

pub mod assumption;
pub mod config;
pub mod error;
pub mod learning;
pub mod manager;
pub mod mapping;
pub mod publication;
pub mod scenario;
pub mod store;

pub use config::AlmanacConfig;
pub use error::{AlmanacError, AlmanacResult};
