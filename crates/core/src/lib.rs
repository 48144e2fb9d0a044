//! Game Shop Core - Shared types library.
//!
//! This crate provides the domain types used across all Game Shop components:
//! - `storefront` - Cart store, checkout orchestration, and the backend REST client
//! - `cli` - Command-line front end driving the storefront library
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no storage
//! access, no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, emails, quantities, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
