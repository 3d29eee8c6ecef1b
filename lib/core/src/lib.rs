//! Core domain types and utilities for odin.
//!
//! This crate provides the error-handling foundation and the strongly-typed
//! identifiers shared by the access library and the server.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, TriggerId};
