// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./leadwire.toml` > `~/.config/leadwire/leadwire.toml`
//! > `/etc/leadwire/leadwire.toml` with environment variable overrides via the
//! `LEADWIRE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::LeadwireConfig;

/// System-wide config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/leadwire/leadwire.toml";

/// Config file in the working directory.
pub const LOCAL_CONFIG_PATH: &str = "leadwire.toml";

/// Sections whose keys may be overridden from the environment.
const ENV_SECTIONS: &[&str] = &[
    "pipeline",
    "storage",
    "reconnect",
    "filter",
    "classifier",
    "delivery",
    "feedback",
    "metrics",
];

/// Path of the per-user config file, if a config dir exists.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("leadwire").join("leadwire.toml"))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/leadwire/leadwire.toml` (system-wide)
/// 3. `~/.config/leadwire/leadwire.toml` (user XDG config)
/// 4. `./leadwire.toml` (local directory)
/// 5. `LEADWIRE_*` environment variables
pub fn load_config() -> Result<LeadwireConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<LeadwireConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LeadwireConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<LeadwireConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LeadwireConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for the XDG lookup, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(LeadwireConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Environment provider mapping `LEADWIRE_<SECTION>_<KEY>` to `section.key`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `LEADWIRE_CLASSIFIER_API_KEY` maps to `classifier.api_key`.
fn env_provider() -> Env {
    Env::prefixed("LEADWIRE_")
        .ignore(&["VERBOSE"])
        .map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
