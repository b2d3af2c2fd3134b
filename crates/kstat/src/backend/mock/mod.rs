//! Mock kstat backend for testing without a kernel.
//!
//! Provides an in-memory kstat chain with simulated reads and fault
//! injection, plus pre-built scenarios.

mod backend;
mod scenarios;

pub use backend::{MockBackend, MockNamed, RawGenerator};
