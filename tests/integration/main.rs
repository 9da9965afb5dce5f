//! Integration tests for the marketplace core.
//!
//! Exercises the full placement → settlement lifecycle against an
//! in-memory store, including the concurrency and idempotency guarantees.

mod support;

mod betting_flow;
mod settlement_flow;
