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

//! Driver registry and ordered fan-out.

use crate::context::RequestScope;
use crate::driver::{Driver, DriverError, DriverResult};
use crate::event::Event;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Which driver call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    WantEvent,
    ProcessEvent,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::WantEvent => f.write_str("want_event"),
            FailureStage::ProcessEvent => f.write_str("process_event"),
        }
    }
}

/// A driver failure that was contained during dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverFailure {
    /// Position of the driver in registration order.
    pub index: usize,
    pub driver: String,
    pub stage: FailureStage,
    pub error: DriverError,
}

/// Outcome of fanning one event out to the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Drivers asked whether they want the event.
    pub offered: usize,
    /// Drivers that accepted it.
    pub accepted: usize,
    pub failures: Vec<DriverFailure>,
}

impl DispatchReport {
    /// True when no driver failed.
    pub fn all_successful(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Ordered collection of drivers.
///
/// Dispatch order is registration order. Registering the same driver twice
/// makes it see every event twice.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: Vec<Box<dyn Driver>>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a driver. No identity check is made.
    pub fn register(&mut self, driver: impl Driver + 'static) {
        self.register_boxed(Box::new(driver));
    }

    /// Append an already boxed driver.
    pub fn register_boxed(&mut self, driver: Box<dyn Driver>) {
        tracing::debug!(driver = %driver.name(), position = self.drivers.len(), "Registering driver");
        self.drivers.push(driver);
    }

    /// Number of registered drivers, duplicates included.
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Driver names in dispatch order.
    pub fn driver_names(&self) -> Vec<&str> {
        self.drivers.iter().map(|d| d.name()).collect()
    }

    /// Offer `event` to every driver in order.
    ///
    /// A failing or panicking driver is logged and skipped; the remaining
    /// drivers still run. A failed `want_event` counts as "not interested".
    /// The request context is extracted only once a driver accepts.
    pub fn dispatch(&self, event: &Event, request: &mut RequestScope) -> DispatchReport {
        let mut report = DispatchReport {
            offered: self.drivers.len(),
            ..Default::default()
        };

        for (index, driver) in self.drivers.iter().enumerate() {
            let wanted = guarded(|| driver.want_event(event.kind, event.severity, &event.message));
            let wanted = match wanted {
                Ok(wanted) => wanted,
                Err(error) => {
                    report.failures.push(contain(index, driver.as_ref(), FailureStage::WantEvent, error));
                    false
                }
            };
            if !wanted {
                continue;
            }

            report.accepted += 1;
            let context = request.context();
            if let Err(error) = guarded(|| driver.process_event(event, context)) {
                report
                    .failures
                    .push(contain(index, driver.as_ref(), FailureStage::ProcessEvent, error));
            }
        }

        report
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.driver_names())
            .finish()
    }
}

fn guarded<T>(call: impl FnOnce() -> DriverResult<T>) -> DriverResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => Err(DriverError::Panicked(panic_message(payload.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn contain(index: usize, driver: &dyn Driver, stage: FailureStage, error: DriverError) -> DriverFailure {
    tracing::warn!(
        driver = %driver.name(),
        position = index,
        stage = %stage,
        error = %error,
        "Driver failed, continuing with the next one"
    );
    DriverFailure {
        index,
        driver: driver.name().to_string(),
        stage,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::driver::{CallbackDriver, EventFilter};
    use crate::event::{EventKind, Severity, SeverityMask};
    use crate::host::EmptySource;
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Log = Arc<Mutex<Vec<String>>>;

    struct ScriptedDriver {
        name: String,
        wants: bool,
        log: Log,
    }

    impl ScriptedDriver {
        fn new(name: &str, wants: bool, log: &Log) -> Self {
            Self {
                name: name.to_string(),
                wants,
                log: log.clone(),
            }
        }
    }

    impl Driver for ScriptedDriver {
        fn name(&self) -> &str {
            &self.name
        }

        fn want_event(&self, _kind: EventKind, _severity: Severity, _message: &str) -> DriverResult<bool> {
            self.log.lock().push(format!("want:{}", self.name));
            Ok(self.wants)
        }

        fn process_event(&self, _event: &Event, _request: &RequestContext) -> DriverResult<()> {
            self.log.lock().push(format!("process:{}", self.name));
            Ok(())
        }
    }

    fn error_event() -> Event {
        Event::new(EventKind::Error, Severity::WARNING, "app.src", 42, "disk full")
    }

    #[test]
    fn test_dispatch_order_and_acceptance() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = DriverRegistry::new();
        registry.register(ScriptedDriver::new("a", true, &log));
        registry.register(ScriptedDriver::new("b", false, &log));
        registry.register(ScriptedDriver::new("c", true, &log));

        let mut scope = RequestScope::new(Box::new(EmptySource), Default::default());
        let report = registry.dispatch(&error_event(), &mut scope);

        assert_eq!(
            log.lock().as_slice(),
            &["want:a", "process:a", "want:b", "want:c", "process:c"]
        );
        assert_eq!(report.offered, 3);
        assert_eq!(report.accepted, 2);
        assert!(report.all_successful());
    }

    #[test]
    fn test_duplicate_registration_dispatches_twice() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = DriverRegistry::new();
        registry.register(ScriptedDriver::new("a", true, &log));
        registry.register(ScriptedDriver::new("a", true, &log));
        assert_eq!(registry.driver_names(), vec!["a", "a"]);

        let mut scope = RequestScope::new(Box::new(EmptySource), Default::default());
        registry.dispatch(&error_event(), &mut scope);

        assert_eq!(log.lock().iter().filter(|e| *e == "process:a").count(), 2);
    }

    #[test]
    fn test_failing_driver_is_contained() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = DriverRegistry::new();
        registry.register(CallbackDriver::new("broken", EventFilter::default(), |_, _| {
            Err(DriverError::failed("database is gone"))
        }));
        registry.register(ScriptedDriver::new("b", true, &log));

        let mut scope = RequestScope::new(Box::new(EmptySource), Default::default());
        let report = registry.dispatch(&error_event(), &mut scope);

        assert_eq!(log.lock().as_slice(), &["want:b", "process:b"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].driver, "broken");
        assert_eq!(report.failures[0].stage, FailureStage::ProcessEvent);
        assert_eq!(report.failures[0].error, DriverError::failed("database is gone"));
    }

    #[test]
    fn test_panicking_driver_is_contained() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = DriverRegistry::new();
        registry.register(CallbackDriver::new("panics", EventFilter::default(), |_, _| {
            panic!("socket closed")
        }));
        registry.register(ScriptedDriver::new("b", true, &log));

        let mut scope = RequestScope::new(Box::new(EmptySource), Default::default());
        let report = registry.dispatch(&error_event(), &mut scope);

        assert_eq!(log.lock().as_slice(), &["want:b", "process:b"]);
        assert_eq!(
            report.failures[0].error,
            DriverError::Panicked("socket closed".to_string())
        );
    }

    #[test]
    fn test_failed_want_event_counts_as_not_interested() {
        struct Picky;

        impl Driver for Picky {
            fn name(&self) -> &str {
                "picky"
            }

            fn want_event(&self, _: EventKind, _: Severity, _: &str) -> DriverResult<bool> {
                Err(DriverError::failed("config missing"))
            }

            fn process_event(&self, _: &Event, _: &RequestContext) -> DriverResult<()> {
                unreachable!("never accepted")
            }
        }

        let mut registry = DriverRegistry::new();
        registry.register(Picky);

        let mut scope = RequestScope::new(Box::new(EmptySource), Default::default());
        let report = registry.dispatch(&error_event(), &mut scope);

        assert_eq!(report.accepted, 0);
        assert_eq!(report.failures[0].stage, FailureStage::WantEvent);
    }

    #[test]
    fn test_context_not_extracted_without_takers() {
        let mut registry = DriverRegistry::new();
        registry.register(CallbackDriver::new(
            "quiet",
            EventFilter::errors(SeverityMask::NONE),
            |_, _| Ok(()),
        ));

        let mut scope = RequestScope::new(Box::new(EmptySource), Default::default());
        registry.dispatch(&error_event(), &mut scope);

        assert!(!scope.cache().is_initialized());
    }
}
