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

//! Captured events and severity levels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of host notification an event was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Error,
    Exception,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Error => "error",
            EventKind::Exception => "exception",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of an error, using the host runtime's bit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Severity(pub i32);

impl Severity {
    pub const ERROR: Severity = Severity(1);
    pub const WARNING: Severity = Severity(2);
    pub const PARSE: Severity = Severity(4);
    pub const NOTICE: Severity = Severity(8);
    pub const CORE_ERROR: Severity = Severity(16);
    pub const CORE_WARNING: Severity = Severity(32);
    pub const COMPILE_ERROR: Severity = Severity(64);
    pub const COMPILE_WARNING: Severity = Severity(128);
    pub const USER_ERROR: Severity = Severity(256);
    pub const USER_WARNING: Severity = Severity(512);
    pub const USER_NOTICE: Severity = Severity(1024);
    pub const STRICT: Severity = Severity(2048);
    pub const RECOVERABLE_ERROR: Severity = Severity(4096);
    pub const DEPRECATED: Severity = Severity(8192);
    pub const USER_DEPRECATED: Severity = Severity(16384);
    /// Severity attached to every thrown exception.
    pub const EXCEPTION: Severity = Severity(1 << 15);

    /// Human readable label, `"Unknown"` for values outside the known set.
    pub fn name(&self) -> &'static str {
        match *self {
            Severity::ERROR => "Error",
            Severity::WARNING => "Warning",
            Severity::PARSE => "Parse error",
            Severity::NOTICE => "Notice",
            Severity::CORE_ERROR => "Core error",
            Severity::CORE_WARNING => "Core warning",
            Severity::COMPILE_ERROR => "Compile error",
            Severity::COMPILE_WARNING => "Compile warning",
            Severity::USER_ERROR => "User error",
            Severity::USER_WARNING => "User warning",
            Severity::USER_NOTICE => "User notice",
            Severity::STRICT => "Strict standards",
            Severity::RECOVERABLE_ERROR => "Recoverable error",
            Severity::DEPRECATED => "Deprecated",
            Severity::USER_DEPRECATED => "User deprecated",
            Severity::EXCEPTION => "Exception",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

/// Bit mask over severities, the per-driver "error reporting" level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeverityMask(pub i32);

impl SeverityMask {
    /// Every error severity.
    pub const ALL: SeverityMask = SeverityMask(32767);
    pub const NONE: SeverityMask = SeverityMask(0);

    pub fn contains(&self, severity: Severity) -> bool {
        self.0 & severity.0 != 0
    }

    pub fn with(self, severity: Severity) -> Self {
        SeverityMask(self.0 | severity.0)
    }

    pub fn without(self, severity: Severity) -> Self {
        SeverityMask(self.0 & !severity.0)
    }
}

impl Default for SeverityMask {
    fn default() -> Self {
        SeverityMask::ALL
    }
}

/// A captured error or exception.
///
/// Built once per notification and handed by reference to every interested
/// driver. The core never stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub severity: Severity,
    pub message: String,
    pub source_file: String,
    pub source_line: u32,
    /// Formatted call stack, present when stack capture is enabled.
    pub stacktrace: Option<String>,
    /// Whether the event was raised inside a suppression block.
    pub silenced: bool,
}

impl Event {
    pub fn new(
        kind: EventKind,
        severity: Severity,
        source_file: impl Into<String>,
        source_line: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            source_file: source_file.into(),
            source_line,
            stacktrace: None,
            silenced: false,
        }
    }

    pub fn with_stacktrace(mut self, stacktrace: impl Into<String>) -> Self {
        self.stacktrace = Some(stacktrace.into());
        self
    }

    pub fn with_silenced(mut self, silenced: bool) -> Self {
        self.silenced = silenced;
        self
    }

    /// Trace text as drivers receive it: empty when none was captured.
    pub fn stacktrace_text(&self) -> &str {
        self.stacktrace.as_deref().unwrap_or("")
    }
}
