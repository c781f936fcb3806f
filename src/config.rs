// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Runtime configuration read from the process environment.
//!
//! | Variable | Default | Notes |
//! |---|---|---|
//! | `APP_ENV` | `development` | `development`, `local`, `test` or `production` |
//! | `PORT` | `3000` | unparseable values fall back to the default |
//! | `API_PREFIX` | `/api` | prepended to every route |

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_API_PREFIX: &str = "/api";

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown environment '{0}' (expected development, local, test or production)")]
    UnknownEnvironment(String),
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Local,
    Test,
    Production,
}

impl Environment {
    /// Whether internal failure detail may be shown to callers.
    pub fn exposes_internal_errors(self) -> bool {
        matches!(self, Self::Development | Self::Local)
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "local" => Ok(Self::Local),
            "test" => Ok(Self::Test),
            "production" => Ok(Self::Production),
            _ => Err(ConfigError::UnknownEnvironment(s.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Development => "development",
            Self::Local => "local",
            Self::Test => "test",
            Self::Production => "production",
        };
        f.write_str(name)
    }
}

/// Settings for an HTTP front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub environment: Environment,
    pub port: u16,
    pub api_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            port: DEFAULT_PORT,
            api_prefix: DEFAULT_API_PREFIX.to_string(),
        }
    }
}

impl ServerConfig {
    /// Reads `APP_ENV`, `PORT` and `API_PREFIX`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("APP_ENV") {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => Environment::default(),
        };
        let port = lookup("PORT")
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let api_prefix = lookup("API_PREFIX")
            .map(|raw| normalize_prefix(&raw))
            .unwrap_or_else(|| DEFAULT_API_PREFIX.to_string());

        Ok(Self {
            environment,
            port,
            api_prefix,
        })
    }
}

/// `api/` and `/api` both become `/api`; blank becomes the empty prefix.
fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
