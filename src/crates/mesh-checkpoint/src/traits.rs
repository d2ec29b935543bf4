//! Storage abstraction for interrupt/session checkpoints.
//!
//! A run that pauses on an interrupt (`mesh_core::interrupt::InterruptState`)
//! needs its state to survive past the end of the HTTP request that produced
//! it, so it can be resumed by a later request. [`Checkpointer`] is the seam
//! that lets the run supervisor persist that state without this crate (or
//! the trait) knowing anything about the orchestrator's own types — the
//! payload is an opaque, already-serialized `serde_json::Value`.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Persists and retrieves a run's checkpoint.
///
/// Implementations keep at most one checkpoint per `run_id`: a later
/// [`save`](Checkpointer::save) replaces whatever was stored before, matching
/// how an orchestrator resumes from its most recent interrupt rather than
/// replaying history.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Store (or replace) the checkpoint for `run_id`.
    async fn save(&self, run_id: &str, checkpoint: Value) -> Result<()>;

    /// Load the checkpoint for `run_id`, if one has been saved.
    async fn load(&self, run_id: &str) -> Result<Option<Value>>;

    /// Drop the checkpoint for `run_id`. No-op if none exists.
    ///
    /// Backends that need to reclaim storage eagerly (on run completion)
    /// should override this; the default suits backends like
    /// [`InMemoryCheckpointer`](crate::memory::InMemoryCheckpointer) where
    /// leaving a stale entry costs little until process restart.
    async fn delete(&self, run_id: &str) -> Result<()> {
        let _ = run_id;
        Ok(())
    }
}
