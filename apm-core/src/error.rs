// Copyright 2025 Sushanth (https://github.com/sushanthpy)
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

//! APM error types
//!
//! Only set-up paths (configuration loading) can fail. Anything raised while
//! handling a host notification is absorbed and reported through `tracing`.

use thiserror::Error;

/// Result type for APM set-up operations
pub type Result<T> = std::result::Result<T, ApmError>;

/// Errors that can occur while configuring the monitor
#[derive(Debug, Error)]
pub enum ApmError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(String),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

impl From<toml::de::Error> for ApmError {
    fn from(err: toml::de::Error) -> Self {
        ApmError::ConfigParse(err.to_string())
    }
}

impl From<serde_json::Error> for ApmError {
    fn from(err: serde_json::Error) -> Self {
        ApmError::ConfigParse(err.to_string())
    }
}
