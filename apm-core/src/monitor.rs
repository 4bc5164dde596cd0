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

//! Host-facing entry points.
//!
//! A [`Monitor`] owns one instance of every pipeline component and exposes
//! one method per host notification. Hosts call these synchronously from the
//! thread handling the request; every method returns without affecting the
//! observed script, whatever the drivers do.

use crate::config::ApmConfig;
use crate::context::{RequestContext, RequestScope};
use crate::dispatcher::{EventDispatcher, Notification};
use crate::driver::Driver;
use crate::event::Severity;
use crate::host::{EmptySource, HostTable, RequestSource};
use crate::registry::{DispatchReport, DriverRegistry};
use crate::stacktrace::{BacktraceCapturer, StackCapturer};
use crate::suppression::{SignalObserver, SuppressionState, SuppressionTracker};
use std::fmt;

/// Error handler that was installed before the monitor hooked the host.
pub type ErrorHandler = Box<dyn FnMut(Severity, &str, u32, &str) + Send>;

/// Error and exception monitor for one host process or thread.
pub struct Monitor {
    config: ApmConfig,
    dispatcher: EventDispatcher,
    suppression: SuppressionTracker,
    request: RequestScope,
    previous_error: Option<ErrorHandler>,
}

impl Monitor {
    /// Monitor with no drivers, capturing native stacks.
    pub fn new(config: ApmConfig) -> Self {
        MonitorBuilder::new().with_config(config).build()
    }

    /// Create a builder for a monitor with drivers and chained handlers.
    pub fn builder() -> MonitorBuilder {
        MonitorBuilder::new()
    }

    /// Append a driver after construction.
    pub fn register_driver(&mut self, driver: impl Driver + 'static) {
        self.dispatcher.registry_mut().register(driver);
    }

    /// An error was raised. The previous error handler, if any, always runs
    /// afterwards, even when capture is disabled.
    pub fn on_error(
        &mut self,
        severity: Severity,
        file: &str,
        line: u32,
        message: &str,
    ) -> Option<DispatchReport> {
        let report = self.dispatcher.dispatch(
            Notification::error(severity, file, line, message),
            &self.config,
            self.suppression.state(),
            &mut self.request,
        );

        if let Some(previous) = self.previous_error.as_mut() {
            previous(severity, file, line, message);
        }

        report
    }

    /// An exception was thrown.
    pub fn on_exception(&mut self, file: &str, line: u32, message: &str) -> Option<DispatchReport> {
        self.dispatcher.dispatch(
            Notification::exception(file, line, message),
            &self.config,
            self.suppression.state(),
            &mut self.request,
        )
    }

    /// An exception object was thrown.
    ///
    /// Reads its `message`, `file` and `line` properties; properties that are
    /// missing or of the wrong type become empty. A missing object is ignored.
    pub fn on_thrown(&mut self, exception: Option<&HostTable>) -> Option<DispatchReport> {
        if !self.config.event_enabled {
            return None;
        }
        let exception = exception?;
        let line = exception
            .get_int("line")
            .and_then(|l| u32::try_from(l).ok())
            .unwrap_or(0);
        self.on_exception(
            exception.get_str("file").unwrap_or(""),
            line,
            exception.get_str("message").unwrap_or(""),
        )
    }

    /// The host entered an error suppression block.
    pub fn on_begin_suppression(&mut self) {
        self.suppression.begin_suppression();
    }

    /// The host left an error suppression block.
    pub fn on_end_suppression(&mut self) {
        self.suppression.end_suppression();
    }

    /// A new request begins: install its tables and forget the previous
    /// request's context and suppression state.
    pub fn on_request_start(&mut self, source: Box<dyn RequestSource>) {
        tracing::trace!("Request start");
        self.request.replace_source(source);
        self.suppression.reset_state();
    }

    /// The request finished: drop its tables, context and suppression state.
    pub fn on_request_end(&mut self) {
        tracing::trace!("Request end");
        self.request.replace_source(Box::new(EmptySource));
        self.suppression.reset_state();
    }

    pub fn config(&self) -> &ApmConfig {
        &self.config
    }

    pub fn registry(&self) -> &DriverRegistry {
        self.dispatcher.registry()
    }

    pub fn suppression_state(&self) -> SuppressionState {
        self.suppression.state()
    }

    /// Context of the current request, if a driver already asked for it.
    pub fn request_context(&self) -> Option<&RequestContext> {
        self.request.cache().cached()
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .field("suppression", &self.suppression)
            .field("request", &self.request)
            .field("previous_error", &self.previous_error.is_some())
            .finish()
    }
}

/// Builder for creating a [`Monitor`] with custom settings.
#[derive(Default)]
pub struct MonitorBuilder {
    config: ApmConfig,
    registry: DriverRegistry,
    capturer: Option<Box<dyn StackCapturer>>,
    previous_error: Option<ErrorHandler>,
    previous_begin: Option<SignalObserver>,
    previous_end: Option<SignalObserver>,
}

impl MonitorBuilder {
    /// Create a builder with the default configuration and no drivers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the capture configuration.
    pub fn with_config(mut self, config: ApmConfig) -> Self {
        self.config = config;
        self
    }

    /// Append a driver; drivers run in the order they are added.
    pub fn with_driver(mut self, driver: impl Driver + 'static) -> Self {
        self.registry.register(driver);
        self
    }

    /// Replace the native stack capturer, e.g. with one that walks the
    /// script VM's own call stack.
    pub fn with_capturer(mut self, capturer: impl StackCapturer + 'static) -> Self {
        self.capturer = Some(Box::new(capturer));
        self
    }

    /// Chain to the error handler the host had before the monitor.
    pub fn with_previous_error_handler(
        mut self,
        handler: impl FnMut(Severity, &str, u32, &str) + Send + 'static,
    ) -> Self {
        self.previous_error = Some(Box::new(handler));
        self
    }

    /// Chain to the suppression observers the host had before the monitor.
    pub fn with_previous_suppression_observers(
        mut self,
        begin: Option<SignalObserver>,
        end: Option<SignalObserver>,
    ) -> Self {
        self.previous_begin = begin;
        self.previous_end = end;
        self
    }

    /// Build the monitor.
    pub fn build(self) -> Monitor {
        let capturer = self
            .capturer
            .unwrap_or_else(|| Box::new(BacktraceCapturer::new()));
        let request = RequestScope::idle(self.config.privacy());

        Monitor {
            dispatcher: EventDispatcher::new(self.registry, capturer),
            suppression: SuppressionTracker::with_previous(self.previous_begin, self.previous_end),
            request,
            previous_error: self.previous_error,
            config: self.config,
        }
    }
}
