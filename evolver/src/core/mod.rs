//! Deterministic, pure logic shared by the evolution engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! candidates and return deterministic outputs suitable for tests.

pub mod fitness;
pub mod params;
pub mod ranking;
pub mod termination;
pub mod types;
