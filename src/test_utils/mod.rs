//! Test utilities.
//!
//! This module provides:
//! - Test data factories for creating valid test fixtures
//! - An in-memory store implementing every repository trait
//! - Scripted and recording stand-ins for the gateway, job queue, clock and hooks
//! - `TestBilling`, which wires all use cases over those, and `TestAppStateBuilder`
//!   for HTTP route tests

mod app_state_builder;
mod billing_mocks;
mod collaborator_mocks;
mod factories;
mod harness;

pub use app_state_builder::*;
pub use billing_mocks::*;
pub use collaborator_mocks::*;
pub use factories::*;
pub use harness::*;
