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

//! Tracking of error-suppression blocks.
//!
//! The state is a single flag, not a nesting counter: the host's suppression
//! construct does not count either, so `begin, begin, end` ends up `Normal`.

use std::fmt;

/// Observer of a begin or end suppression signal.
pub type SignalObserver = Box<dyn FnMut() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuppressionState {
    #[default]
    Normal,
    Silenced,
}

/// Two-state tracker that chains to any observers installed before it.
#[derive(Default)]
pub struct SuppressionTracker {
    state: SuppressionState,
    previous_begin: Option<SignalObserver>,
    previous_end: Option<SignalObserver>,
}

impl SuppressionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker that forwards every transition to the observers that
    /// held the signals before it.
    pub fn with_previous(
        previous_begin: Option<SignalObserver>,
        previous_end: Option<SignalObserver>,
    ) -> Self {
        Self {
            state: SuppressionState::Normal,
            previous_begin,
            previous_end,
        }
    }

    pub fn begin_suppression(&mut self) {
        self.state = SuppressionState::Silenced;
        if let Some(previous) = self.previous_begin.as_mut() {
            previous();
        }
    }

    pub fn end_suppression(&mut self) {
        self.state = SuppressionState::Normal;
        if let Some(previous) = self.previous_end.as_mut() {
            previous();
        }
    }

    pub fn state(&self) -> SuppressionState {
        self.state
    }

    pub fn is_silenced(&self) -> bool {
        self.state == SuppressionState::Silenced
    }

    /// Return to `Normal` at a request boundary. Observers are not notified.
    pub fn reset_state(&mut self) {
        self.state = SuppressionState::Normal;
    }
}

impl fmt::Debug for SuppressionTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuppressionTracker")
            .field("state", &self.state)
            .field("previous_begin", &self.previous_begin.is_some())
            .field("previous_end", &self.previous_end.is_some())
            .finish()
    }
}
