//! # nstun-common
//!
//! Shared error definitions, configuration model, constants, and value
//! types used across the nstun workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and knows nothing about processes or namespaces.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
