//! # mesh-checkpoint — interrupt/session checkpoint storage
//!
//! A swarm or graph run can pause mid-execution on a tool-call interrupt
//! (see `mesh_core::interrupt::InterruptState`) and be resumed by a later,
//! unrelated HTTP request. This crate is the storage seam that makes that
//! possible: [`traits::Checkpointer`] persists and retrieves an opaque,
//! already-serialized checkpoint keyed by run id, and [`memory`] provides a
//! process-local backend suitable for development and single-instance
//! deployments.
//!
//! This crate intentionally knows nothing about what a checkpoint contains —
//! the orchestrator decides that shape (`mesh_core::interrupt::OrchestratorCheckpoint`)
//! and serializes it to a `serde_json::Value` before handing it here, via
//! [`serializer::CheckpointSerializer`].

pub mod error;
pub mod memory;
pub mod serializer;
pub mod traits;

pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointer;
pub use serializer::{CheckpointSerializer, JsonCheckpointSerializer};
pub use traits::Checkpointer;
