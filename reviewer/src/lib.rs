//! Automated pull-request review pipeline.
//!
//! A review run gathers PR context, delegates analysis and drafting to a
//! reasoning worker, repairs the draft against a schema and optionally posts
//! it back. The crate keeps the same split as its sibling tools:
//!
//! - **[`core`]**: Pure, deterministic logic (request normalization, the
//!   context store, the stage state machine). No I/O.
//! - **[`io`]**: Side-effecting operations (child processes, config, prompts,
//!   schemas, the worker backend).
//! - **[`agents`]**: One module per delegating stage.
//!
//! [`pipeline`] sequences the stages and [`api`] exposes the request/response
//! surface used by the CLI and the HTTP server.

pub mod agents;
pub mod api;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
