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

//! Synchronous stack trace capture.

use std::fmt::Write;
use std::panic::{self, AssertUnwindSafe};

/// Captures the current call stack as text.
///
/// Implementations must never fail the caller: when nothing can be captured
/// they return an empty string.
pub trait StackCapturer: Send + Sync {
    fn capture(&self) -> String;
}

/// One frame of a call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub function: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl StackFrame {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            file: None,
            line: None,
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }
}

/// Render frames as `#<n> <function> called at [<file>:<line>]`, one per line.
pub fn format_frames(frames: &[StackFrame]) -> String {
    let mut out = String::new();
    for (index, frame) in frames.iter().enumerate() {
        let _ = write!(out, "#{index} {}", frame.function);
        match (&frame.file, frame.line) {
            (Some(file), Some(line)) => {
                let _ = write!(out, " called at [{file}:{line}]");
            }
            (Some(file), None) => {
                let _ = write!(out, " called at [{file}]");
            }
            _ => {}
        }
        out.push('\n');
    }
    out
}

/// Captures the native stack of the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktraceCapturer;

impl BacktraceCapturer {
    pub fn new() -> Self {
        Self
    }

    fn frames() -> Vec<StackFrame> {
        let mut frames = Vec::new();
        backtrace::trace(|frame| {
            backtrace::resolve_frame(frame, |symbol| {
                let function = symbol
                    .name()
                    .map(|name| name.to_string())
                    .unwrap_or_else(|| "<unknown>".to_string());
                frames.push(StackFrame {
                    function,
                    file: symbol.filename().map(|f| f.display().to_string()),
                    line: symbol.lineno(),
                });
            });
            true
        });

        // Drop the capture machinery itself from the top of the stack.
        let own = frames
            .iter()
            .rposition(|f| f.function.contains("BacktraceCapturer"))
            .map(|i| i + 1)
            .unwrap_or(0);
        frames.split_off(own)
    }
}

impl StackCapturer for BacktraceCapturer {
    fn capture(&self) -> String {
        match panic::catch_unwind(AssertUnwindSafe(Self::frames)) {
            Ok(frames) => format_frames(&frames),
            Err(_) => {
                tracing::warn!("Stack capture panicked, continuing without a trace");
                String::new()
            }
        }
    }
}
