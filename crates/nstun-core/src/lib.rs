//! # nstun-core
//!
//! Linux primitives for provisioning a TUN device inside a network
//! namespace.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: opening, identifying, joining and discovering network
//!   namespaces.
//! - **Interfaces**: bringing a link up, assigning an IPv6 address, and
//!   setting its MTU in the current namespace.
//! - **TUN devices**: creating and configuring a named TUN interface.
//!
//! Nothing here knows about process boundaries: [`tun::create`] switches the
//! namespace of whoever calls it.
//!
//! All unsafe system calls are encapsulated in safe wrappers with
//! `// SAFETY:` documentation.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod interface;
pub mod namespace;
mod sys;
pub mod tun;
