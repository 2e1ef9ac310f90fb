//! Stage agents, one per delegating pipeline stage.
//!
//! Each agent reads its inputs from the [`ContextStore`](crate::core::context::ContextStore),
//! delegates to a [`Worker`](crate::io::worker::Worker) and writes exactly one
//! output key. An agent that returns an error leaves its key unset; the
//! orchestrator's gate decides what that means for the run.

use anyhow::{Result, bail};

use crate::core::stage::Stage;
use crate::io::worker::WorkerOutput;

pub mod analyzer;
pub mod corrector;
pub mod drafter;
pub mod fetcher;
pub mod poster;

/// Worker output as text, rejecting an empty reply.
pub(crate) fn non_empty_text(stage: Stage, output: WorkerOutput) -> Result<String> {
    let text = output.into_text();
    if text.trim().is_empty() {
        bail!("{stage} produced an empty reply");
    }
    Ok(text)
}
