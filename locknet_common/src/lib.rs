//! LOCKNET Common Library
//!
//! This crate provides the shared types, synchronization protocol and
//! configuration loading utilities for all LOCKNET workspace crates.
//!
//! # Module Structure
//!
//! - [`hw`] - Hardware-facing words and compartment state types
//! - [`protocol`] - Column ↔ coordinator synchronization protocol
//! - [`wire`] - JSON-line transport helpers with bounded timeouts
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Shared timing and sizing constants
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! Add to your `Cargo.toml` with alias for shorter imports:
//! ```toml
//! [dependencies]
//! locknet = { package = "locknet_common", path = "../locknet_common" }
//! ```
//!
//! Then import:
//! ```rust
//! use locknet_common::prelude::*;
//! ```

pub mod config;
pub mod consts;
pub mod hw;
pub mod prelude;
pub mod protocol;
pub mod wire;
