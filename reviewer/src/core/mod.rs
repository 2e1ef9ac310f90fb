//! Deterministic, pure logic shared by the reviewer.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod context;
pub mod pr_ref;
pub mod request;
pub mod stage;
pub mod types;
