// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loading and validation for the courier fleet.
//!
//! Configuration is TOML merged in layers (compiled defaults, system file,
//! user XDG file, local file, `COURIER_*` environment variables) and
//! validated once at startup so every later consumer can trust the values.

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    AgentConfig, CourierConfig, DriverConfig, LimitsConfig, ProxyConfig, RetryConfig,
    StorageConfig, SupervisorConfig, TimeoutsConfig,
};
pub use validation::validate_config;
