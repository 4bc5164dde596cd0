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

//! APM Core
//!
//! In-process error and exception capture for an embedded script runtime.
//! Host notifications are turned into [`Event`]s, optionally enriched with a
//! stack trace and the request context, and offered to every registered
//! [`Driver`] in registration order.
//!
//! # Architecture
//!
//! - [`StackCapturer`]: one-shot stack-to-text capture, once per event
//! - [`SuppressionTracker`]: single-flag suppression state with observer chaining
//! - [`RequestContextCache`]: lazy, idempotent per-request metadata extraction
//! - [`DriverRegistry`]: ordered fan-out with per-driver failure containment
//! - [`EventDispatcher`]: builds the event and drives the fan-out
//! - [`Monitor`]: host-facing entry points
//!
//! Everything runs synchronously on the thread that raised the notification.
//!
//! # Example
//!
//! ```rust
//! use apm_core::{ApmConfig, CallbackDriver, EventFilter, Monitor, Severity, SeverityMask};
//!
//! let mut monitor = Monitor::builder()
//!     .with_config(ApmConfig::default().with_store_stacktrace(false))
//!     .with_driver(CallbackDriver::new(
//!         "stderr",
//!         EventFilter::errors(SeverityMask::ALL),
//!         |event, _request| {
//!             eprintln!("{}: {}", event.severity, event.message);
//!             Ok(())
//!         },
//!     ))
//!     .build();
//!
//! let report = monitor.on_error(Severity::WARNING, "app.src", 42, "disk full");
//! assert_eq!(report.map(|r| r.accepted), Some(1));
//! ```

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod event;
pub mod host;
pub mod monitor;
pub mod registry;
pub mod stacktrace;
pub mod suppression;

pub use config::{ApmConfig, SilencedPolicy};
pub use context::{PrivacyOptions, RequestContext, RequestContextCache, RequestScope};
pub use dispatcher::{EventDispatcher, Notification};
pub use driver::{CallbackDriver, Driver, DriverError, DriverResult, EventFilter, LoggingDriver};
pub use error::{ApmError, Result};
pub use event::{Event, EventKind, Severity, SeverityMask};
pub use host::{EmptySource, HostTable, HostValue, RequestSource, StaticSource, TableKind};
pub use monitor::{ErrorHandler, Monitor, MonitorBuilder};
pub use registry::{DispatchReport, DriverFailure, DriverRegistry, FailureStage};
pub use stacktrace::{format_frames, BacktraceCapturer, StackCapturer, StackFrame};
pub use suppression::{SignalObserver, SuppressionState, SuppressionTracker};

/// `tracing` target prefix used by every diagnostic this crate emits.
pub const DIAGNOSTIC_TARGET: &str = "apm_core";
