//! Infrastructure layer.
//!
//! Configuration loading, logging setup and the composition root that turns
//! a configuration into a ready-to-use operation context.
//!
//! # Submodules
//!
//! - [`bootstrap`] - Composition root for runtime wiring
//! - [`config`] - Configuration loading and validation

pub mod bootstrap;
pub mod config;
