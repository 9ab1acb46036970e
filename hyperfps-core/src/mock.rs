//! Mock controller and settings for testing.

use crate::controller::RateController;
use crate::error::RateError;
use crate::rate::RefreshRate;
use crate::settings::SettingsBackend;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// =============================================================================
// MockRateController
// =============================================================================

#[derive(Debug, Default)]
struct MockState {
    current: Option<RefreshRate>,
    applied: Vec<RefreshRate>,
    failures: VecDeque<RateError>,
}

/// A mock refresh rate controller for testing.
///
/// This allows testing code that depends on [`RateController`] without a
/// device. Failures can be queued, and a gated mock blocks every `apply` until
/// its [`ApplyGate`] is opened.
///
/// # Example
///
/// ```
/// use hyperfps_core::{MockRateController, RateController, RateError, RefreshRate};
///
/// let mock = MockRateController::new();
/// let rate = RefreshRate::new(120).unwrap();
/// mock.apply(rate).unwrap();
/// assert_eq!(mock.current_rate(), Some(rate));
///
/// mock.fail_next(RateError::Unknown("unplugged".into()));
/// assert!(mock.apply(rate).is_err());
/// ```
pub struct MockRateController {
    state: Mutex<MockState>,
    gate: Option<ApplyGate>,
}

impl MockRateController {
    /// A mock that accepts every rate and reads back nothing until written.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            gate: None,
        }
    }

    /// A mock whose platform already reports `rate`.
    pub fn with_current(rate: RefreshRate) -> Self {
        let mock = Self::new();
        lock(&mock.state).current = Some(rate);
        mock
    }

    /// A mock whose `apply` blocks until the returned gate is opened.
    pub fn gated() -> (Self, ApplyGate) {
        let gate = ApplyGate::default();
        let mock = Self {
            state: Mutex::new(MockState::default()),
            gate: Some(gate.clone()),
        };
        (mock, gate)
    }

    /// Fail the next `apply` with `error`. Queued failures are used in order.
    pub fn fail_next(&self, error: RateError) {
        lock(&self.state).failures.push_back(error);
    }

    /// Every rate that was applied successfully, oldest first.
    pub fn applied(&self) -> Vec<RefreshRate> {
        lock(&self.state).applied.clone()
    }
}

impl Default for MockRateController {
    fn default() -> Self {
        Self::new()
    }
}

impl RateController for MockRateController {
    fn apply(&self, rate: RefreshRate) -> Result<(), RateError> {
        if let Some(gate) = &self.gate {
            gate.wait();
        }

        let mut state = lock(&self.state);
        if let Some(err) = state.failures.pop_front() {
            return Err(err);
        }

        state.current = Some(rate);
        state.applied.push(rate);
        Ok(())
    }

    fn current_rate(&self) -> Option<RefreshRate> {
        lock(&self.state).current
    }
}

/// Releases applies blocked in a gated [`MockRateController`].
#[derive(Debug, Clone, Default)]
pub struct ApplyGate {
    inner: Arc<(Mutex<GateState>, Condvar)>,
}

#[derive(Debug, Default)]
struct GateState {
    open: bool,
    waiting: usize,
}

impl ApplyGate {
    /// Let every current and future apply through.
    pub fn open(&self) {
        let (state, cvar) = &*self.inner;
        lock(state).open = true;
        cvar.notify_all();
    }

    /// Block until at least `count` applies are waiting at the gate.
    pub fn wait_for_waiters(&self, count: usize) {
        let (state, cvar) = &*self.inner;
        let mut guard = lock(state);
        while guard.waiting < count && !guard.open {
            guard = cvar.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
    }

    fn wait(&self) {
        let (state, cvar) = &*self.inner;
        let mut guard = lock(state);
        guard.waiting += 1;
        cvar.notify_all();
        while !guard.open {
            guard = cvar.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
        guard.waiting -= 1;
    }
}

// =============================================================================
// MemorySettings
// =============================================================================

/// An in-memory [`SettingsBackend`].
///
/// Keys registered with [`reject`](Self::reject) fail both reads and writes.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, u32>>,
    rejected: Mutex<HashMap<String, RateError>>,
}

impl MemorySettings {
    /// Empty settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every access to `key` fail with `error`.
    pub fn reject(&self, key: &str, error: RateError) {
        lock(&self.rejected).insert(key.to_string(), error);
    }

    /// The stored value of `key`, bypassing rejections.
    pub fn value(&self, key: &str) -> Option<u32> {
        lock(&self.values).get(key).copied()
    }
}

impl SettingsBackend for MemorySettings {
    fn put_int(&self, key: &str, value: u32) -> Result<(), RateError> {
        if let Some(err) = lock(&self.rejected).get(key) {
            return Err(err.clone());
        }
        lock(&self.values).insert(key.to_string(), value);
        Ok(())
    }

    fn get_int(&self, key: &str) -> Result<Option<u32>, RateError> {
        if let Some(err) = lock(&self.rejected).get(key) {
            return Err(err.clone());
        }
        Ok(self.value(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hz(value: u32) -> RefreshRate {
        RefreshRate::new(value).unwrap()
    }

    #[test]
    fn test_queued_failures_are_used_in_order() {
        let mock = MockRateController::with_current(hz(60));
        mock.fail_next(RateError::PermissionDenied {
            channel: "user_refresh_rate".to_string(),
        });
        mock.fail_next(RateError::Unknown("busy".into()));

        assert!(matches!(
            mock.apply(hz(120)),
            Err(RateError::PermissionDenied { .. })
        ));
        assert!(matches!(mock.apply(hz(120)), Err(RateError::Unknown(_))));
        assert_eq!(mock.current_rate(), Some(hz(60)));

        mock.apply(hz(120)).unwrap();
        assert_eq!(mock.applied(), vec![hz(120)]);
    }

    #[test]
    fn test_rejected_key_fails_reads_and_writes() {
        let settings = MemorySettings::new();
        settings.put_int("peak_refresh_rate", 90).unwrap();
        settings.reject("peak_refresh_rate", RateError::Unknown("locked".into()));

        assert!(settings.get_int("peak_refresh_rate").is_err());
        assert!(settings.put_int("peak_refresh_rate", 120).is_err());
        assert_eq!(settings.value("peak_refresh_rate"), Some(90));
    }
}
