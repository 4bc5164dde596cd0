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

//! Event dispatcher: builds the event and fans it out.

use crate::config::{ApmConfig, SilencedPolicy};
use crate::context::RequestScope;
use crate::event::{Event, EventKind, Severity};
use crate::registry::{panic_message, DispatchReport, DriverRegistry};
use crate::stacktrace::{BacktraceCapturer, StackCapturer};
use crate::suppression::SuppressionState;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// A raw host notification, before it becomes an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification<'a> {
    pub kind: EventKind,
    pub severity: Severity,
    pub file: &'a str,
    pub line: u32,
    pub message: &'a str,
}

impl<'a> Notification<'a> {
    /// An error raised with the given severity.
    pub fn error(severity: Severity, file: &'a str, line: u32, message: &'a str) -> Self {
        Self {
            kind: EventKind::Error,
            severity,
            file,
            line,
            message,
        }
    }

    /// A thrown exception, always at [`Severity::EXCEPTION`].
    pub fn exception(file: &'a str, line: u32, message: &'a str) -> Self {
        Self {
            kind: EventKind::Exception,
            severity: Severity::EXCEPTION,
            file,
            line,
            message,
        }
    }
}

/// Turns notifications into events and hands them to the registry.
pub struct EventDispatcher {
    registry: DriverRegistry,
    capturer: Box<dyn StackCapturer>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(DriverRegistry::new(), Box::new(BacktraceCapturer::new()))
    }
}

impl EventDispatcher {
    /// Create a dispatcher over `registry` using `capturer` for stack traces.
    pub fn new(registry: DriverRegistry, capturer: Box<dyn StackCapturer>) -> Self {
        Self { registry, capturer }
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DriverRegistry {
        &mut self.registry
    }

    /// Process one notification.
    ///
    /// Returns `None` when capture is disabled or the event was discarded by
    /// the silenced policy. The stack is captured at most once, before the
    /// fan-out, and shared by every driver.
    pub fn dispatch(
        &self,
        notification: Notification<'_>,
        config: &ApmConfig,
        suppression: SuppressionState,
        request: &mut RequestScope,
    ) -> Option<DispatchReport> {
        if !config.event_enabled {
            return None;
        }

        let silenced = suppression == SuppressionState::Silenced;
        if silenced && config.silenced_policy == SilencedPolicy::Discard {
            tracing::trace!(file = notification.file, line = notification.line, "Discarding silenced event");
            return None;
        }

        let mut event = Event::new(
            notification.kind,
            notification.severity,
            notification.file,
            notification.line,
            notification.message,
        )
        .with_silenced(silenced);

        if config.store_stacktrace {
            event.stacktrace = Some(self.capture());
        }

        tracing::debug!(
            kind = %event.kind,
            severity = event.severity.0,
            drivers = self.registry.len(),
            "Dispatch loop begin"
        );
        let report = self.registry.dispatch(&event, request);
        tracing::debug!(
            accepted = report.accepted,
            failures = report.failures.len(),
            "Dispatch loop end"
        );

        Some(report)
    }

    /// Run the capturer, turning a panic into an empty trace.
    fn capture(&self) -> String {
        match panic::catch_unwind(AssertUnwindSafe(|| self.capturer.capture())) {
            Ok(trace) => trace,
            Err(payload) => {
                tracing::warn!(
                    error = %panic_message(payload.as_ref()),
                    "Stack capture failed, dispatching without a trace"
                );
                String::new()
            }
        }
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::driver::{CallbackDriver, EventFilter};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingCapturer(Arc<AtomicUsize>);

    impl StackCapturer for CountingCapturer {
        fn capture(&self) -> String {
            self.0.fetch_add(1, Ordering::SeqCst);
            "#0 handler called at [app.src:42]\n".to_string()
        }
    }

    struct PanickingCapturer;

    impl StackCapturer for PanickingCapturer {
        fn capture(&self) -> String {
            panic!("vm stack unavailable");
        }
    }

    fn recording_dispatcher(
        drivers: usize,
        captures: &Arc<AtomicUsize>,
    ) -> (EventDispatcher, Arc<Mutex<Vec<Event>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = DriverRegistry::new();
        for i in 0..drivers {
            let seen = seen.clone();
            registry.register(CallbackDriver::new(
                format!("driver-{i}"),
                EventFilter::default(),
                move |event: &Event, _: &RequestContext| {
                    seen.lock().push(event.clone());
                    Ok(())
                },
            ));
        }
        let dispatcher = EventDispatcher::new(registry, Box::new(CountingCapturer(captures.clone())));
        (dispatcher, seen)
    }

    #[test]
    fn test_disabled_is_a_no_op() {
        let captures = Arc::new(AtomicUsize::new(0));
        let (dispatcher, seen) = recording_dispatcher(2, &captures);
        let config = ApmConfig::default().with_event_enabled(false);
        let mut scope = RequestScope::idle(config.privacy());

        let report = dispatcher.dispatch(
            Notification::error(Severity::ERROR, "a.src", 1, "x"),
            &config,
            SuppressionState::Normal,
            &mut scope,
        );

        assert!(report.is_none());
        assert_eq!(captures.load(Ordering::SeqCst), 0);
        assert!(seen.lock().is_empty());
        assert!(!scope.cache().is_initialized());
    }

    #[test]
    fn test_stack_captured_once_for_all_drivers() {
        let captures = Arc::new(AtomicUsize::new(0));
        let (dispatcher, seen) = recording_dispatcher(3, &captures);
        let config = ApmConfig::default();
        let mut scope = RequestScope::idle(config.privacy());

        let report = dispatcher
            .dispatch(
                Notification::error(Severity::WARNING, "app.src", 42, "disk full"),
                &config,
                SuppressionState::Normal,
                &mut scope,
            )
            .unwrap();

        assert_eq!(report.accepted, 3);
        assert_eq!(captures.load(Ordering::SeqCst), 1);
        let seen = seen.lock();
        assert!(seen
            .iter()
            .all(|e| e.stacktrace_text() == "#0 handler called at [app.src:42]\n"));
    }

    #[test]
    fn test_no_capture_when_stacktrace_disabled() {
        let captures = Arc::new(AtomicUsize::new(0));
        let (dispatcher, seen) = recording_dispatcher(1, &captures);
        let config = ApmConfig::default().with_store_stacktrace(false);
        let mut scope = RequestScope::idle(config.privacy());

        dispatcher.dispatch(
            Notification::exception("lib.src", 7, "Unexpected token"),
            &config,
            SuppressionState::Normal,
            &mut scope,
        );

        assert_eq!(captures.load(Ordering::SeqCst), 0);
        let seen = seen.lock();
        assert_eq!(seen[0].kind, EventKind::Exception);
        assert_eq!(seen[0].severity, Severity::EXCEPTION);
        assert_eq!(seen[0].stacktrace, None);
    }

    #[test]
    fn test_silenced_policy() {
        let captures = Arc::new(AtomicUsize::new(0));
        let (dispatcher, seen) = recording_dispatcher(1, &captures);
        let notification = Notification::error(Severity::NOTICE, "a.src", 5, "undefined index");

        let forward = ApmConfig::default();
        let mut scope = RequestScope::idle(forward.privacy());
        dispatcher.dispatch(notification, &forward, SuppressionState::Silenced, &mut scope);
        assert!(seen.lock()[0].silenced);

        let discard = ApmConfig::default().with_silenced_policy(SilencedPolicy::Discard);
        let report = dispatcher.dispatch(notification, &discard, SuppressionState::Silenced, &mut scope);
        assert!(report.is_none());
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(captures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_capture_panic_becomes_empty_trace() {
        let captures = Arc::new(AtomicUsize::new(0));
        let (mut dispatcher, seen) = recording_dispatcher(2, &captures);
        dispatcher.capturer = Box::new(PanickingCapturer);
        let config = ApmConfig::default();
        let mut scope = RequestScope::idle(config.privacy());

        let report = dispatcher
            .dispatch(
                Notification::error(Severity::ERROR, "app.src", 9, "db gone"),
                &config,
                SuppressionState::Normal,
                &mut scope,
            )
            .unwrap();

        assert_eq!(report.accepted, 2);
        assert!(report.all_successful());
        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|e| e.stacktrace.as_deref() == Some("")));
    }
}
