//! Testing utilities and mock implementations
//!
//! Lets the workflow and HTTP routes be tested without a model server.

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
