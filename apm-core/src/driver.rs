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

//! Driver contract and small built-in drivers.

use crate::context::RequestContext;
use crate::event::{Event, EventKind, Severity, SeverityMask};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for driver calls.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors a driver can report back to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("Driver failed: {0}")]
    Failed(String),

    #[error("Driver panicked: {0}")]
    Panicked(String),
}

impl DriverError {
    pub fn failed(message: impl Into<String>) -> Self {
        DriverError::Failed(message.into())
    }
}

/// A reporting backend.
///
/// `want_event` runs for every captured event and must stay cheap.
/// `process_event` runs only when `want_event` returned `true`; it receives
/// the event (severity, file, line, message and trace text) and the request
/// context, extracted on first use.
///
/// Both calls run on the request thread and block it until they return.
/// Errors and panics are contained by the registry.
pub trait Driver: Send + Sync {
    /// Driver name, used in diagnostics.
    fn name(&self) -> &str;

    fn want_event(&self, kind: EventKind, severity: Severity, message: &str) -> DriverResult<bool>;

    fn process_event(&self, event: &Event, request: &RequestContext) -> DriverResult<()>;
}

/// Common interest filter for drivers: an enable switch, an error-reporting
/// mask, and whether exceptions are wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub error_reporting: SeverityMask,

    #[serde(default = "default_true")]
    pub exceptions: bool,
}

fn default_true() -> bool {
    true
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            enabled: true,
            error_reporting: SeverityMask::ALL,
            exceptions: true,
        }
    }
}

impl EventFilter {
    /// Accept errors whose severity is in `mask`, plus exceptions.
    pub fn errors(mask: SeverityMask) -> Self {
        Self {
            error_reporting: mask,
            ..Self::default()
        }
    }

    pub fn matches(&self, kind: EventKind, severity: Severity) -> bool {
        if !self.enabled {
            return false;
        }
        match kind {
            EventKind::Exception => self.exceptions,
            EventKind::Error => self.error_reporting.contains(severity),
        }
    }
}

/// Driver that writes accepted events to the diagnostic log.
pub struct LoggingDriver {
    name: String,
    filter: EventFilter,
}

impl LoggingDriver {
    pub fn new(name: impl Into<String>, filter: EventFilter) -> Self {
        Self {
            name: name.into(),
            filter,
        }
    }
}

impl Driver for LoggingDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn want_event(&self, kind: EventKind, severity: Severity, _message: &str) -> DriverResult<bool> {
        Ok(self.filter.matches(kind, severity))
    }

    fn process_event(&self, event: &Event, request: &RequestContext) -> DriverResult<()> {
        tracing::info!(
            driver = %self.name,
            kind = %event.kind,
            severity = %event.severity,
            file = %event.source_file,
            line = event.source_line,
            uri = request.uri.as_deref().unwrap_or(""),
            silenced = event.silenced,
            "{}",
            event.message
        );
        Ok(())
    }
}

/// Driver that delegates `process_event` to a closure.
pub struct CallbackDriver<F>
where
    F: Fn(&Event, &RequestContext) -> DriverResult<()> + Send + Sync,
{
    name: String,
    filter: EventFilter,
    callback: F,
}

impl<F> CallbackDriver<F>
where
    F: Fn(&Event, &RequestContext) -> DriverResult<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, filter: EventFilter, callback: F) -> Self {
        Self {
            name: name.into(),
            filter,
            callback,
        }
    }
}

impl<F> Driver for CallbackDriver<F>
where
    F: Fn(&Event, &RequestContext) -> DriverResult<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn want_event(&self, kind: EventKind, severity: Severity, _message: &str) -> DriverResult<bool> {
        Ok(self.filter.matches(kind, severity))
    }

    fn process_event(&self, event: &Event, request: &RequestContext) -> DriverResult<()> {
        (self.callback)(event, request)
    }
}
