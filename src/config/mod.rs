//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Config struct definitions and loading
//! - [`defaults`]: serde default value functions
//! - [`validation`]: startup checks that report every problem at once

mod defaults;
mod types;
mod validation;

pub use types::{
    BenchConfig, Config, DelayRange, IdleConfig, LoopbackConfig, RelayConfig, RelayKind,
};
pub use validation::validate;
