//! Local call budget gating upstream lookups.
//!
//! The budget is a process-wide allowance, independent of any real
//! upstream quota: it exists to keep bulk operations from turning into
//! accidental request storms. Every resolver call costs one unit; once
//! the budget hits zero it restores itself to the maximum after a fixed
//! cooldown.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

/// Number of lookups allowed before the cooldown kicks in.
pub const DEFAULT_CALL_BUDGET: u32 = 100;

/// How long an exhausted budget waits before restoring to its maximum.
pub const RESET_COOLDOWN: Duration = Duration::from_secs(60);

/// Notification emitted by a [`RateBudget`] observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetEvent {
    /// The remaining level after a charge or a restoration.
    Level(u32),
    /// The cooldown elapsed and the budget returned to its maximum.
    Restored,
}

type Observer = Box<dyn Fn(BudgetEvent) + Send + Sync>;

/// A bounded allowance of upstream calls with a cooldown-based reset.
///
/// Invariant: `0 <= remaining <= max`. Charging floors at zero and, on
/// the transition to exactly zero, schedules a single restoration to the
/// maximum after the cooldown. Charging again while a restoration is
/// pending does not reschedule it. The restoration deadline is applied
/// lazily on the next observation of the budget, which is equivalent to
/// a one-shot timer under the crate's single-threaded sequencing.
///
/// # Example
///
/// ```
/// use roblox_avail::budget::RateBudget;
///
/// let budget = RateBudget::new();
/// assert!(budget.ensure_available().is_ok());
/// budget.charge(1);
/// assert_eq!(budget.remaining(), budget.max() - 1);
/// ```
pub struct RateBudget {
    max: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
    observer: Option<Observer>,
}

#[derive(Debug)]
struct Inner {
    current: u32,
    reset_at: Option<Instant>,
}

impl RateBudget {
    /// Create a budget with the default allowance and cooldown.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CALL_BUDGET, RESET_COOLDOWN)
    }

    /// Create a budget with a custom allowance and cooldown.
    #[must_use]
    pub fn with_limits(max: u32, cooldown: Duration) -> Self {
        Self {
            max,
            cooldown,
            inner: Mutex::new(Inner {
                current: max,
                reset_at: None,
            }),
            observer: None,
        }
    }

    /// Attach an observer that receives level changes and restorations.
    ///
    /// The observer runs while the budget's internal lock is held; it
    /// must not call back into the budget.
    #[must_use]
    pub fn with_observer(mut self, observer: impl Fn(BudgetEvent) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Fail if the budget is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`BudgetExhausted`] when no allowance remains, carrying
    /// the time until the pending restoration when one is scheduled.
    pub fn ensure_available(&self) -> Result<(), BudgetExhausted> {
        let mut inner = self.lock();
        self.restore_if_due(&mut inner);
        if inner.current == 0 {
            return Err(BudgetExhausted {
                retry_in: inner
                    .reset_at
                    .map(|at| at.saturating_duration_since(Instant::now())),
            });
        }
        Ok(())
    }

    /// Subtract `cost` from the allowance, flooring at zero.
    ///
    /// On the transition to zero a single restoration to the maximum is
    /// scheduled after the cooldown; an already-pending restoration is
    /// left untouched.
    pub fn charge(&self, cost: u32) {
        let mut inner = self.lock();
        self.restore_if_due(&mut inner);
        inner.current = inner.current.saturating_sub(cost);
        debug!(remaining = inner.current, max = self.max, "budget charged");
        self.notify(BudgetEvent::Level(inner.current));
        if inner.current == 0 && inner.reset_at.is_none() {
            inner.reset_at = Some(Instant::now() + self.cooldown);
        }
    }

    /// The allowance currently remaining.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        let mut inner = self.lock();
        self.restore_if_due(&mut inner);
        inner.current
    }

    /// The allowance this budget restores to.
    #[must_use]
    pub fn max(&self) -> u32 {
        self.max
    }

    fn restore_if_due(&self, inner: &mut Inner) {
        if inner.reset_at.is_some_and(|at| Instant::now() >= at) {
            inner.current = self.max;
            inner.reset_at = None;
            debug!(max = self.max, "budget restored");
            self.notify(BudgetEvent::Restored);
            self.notify(BudgetEvent::Level(inner.current));
        }
    }

    fn notify(&self, event: BudgetEvent) {
        if let Some(observer) = &self.observer {
            observer(event);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RateBudget {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RateBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateBudget")
            .field("max", &self.max)
            .field("cooldown", &self.cooldown)
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

/// The local call budget is exhausted.
#[derive(Debug, Clone, Copy)]
pub struct BudgetExhausted {
    /// Time until the pending restoration, when one is scheduled.
    pub retry_in: Option<Duration>,
}

impl fmt::Display for BudgetExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.retry_in {
            Some(wait) => write!(
                f,
                "call budget exhausted; retry in {}s",
                wait.as_secs().max(1)
            ),
            None => write!(f, "call budget exhausted"),
        }
    }
}

impl std::error::Error for BudgetExhausted {}
