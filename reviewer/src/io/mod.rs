//! Side-effecting operations: processes, config, prompts, schemas and the
//! reasoning-worker backend.
//!
//! Everything that touches the filesystem or spawns a child lives here so the
//! [`crate::core`] modules stay pure.

pub mod config;
pub mod process;
pub mod prompt;
pub mod sandbox;
pub mod schema;
pub mod worker;
