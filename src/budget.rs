// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-class request budgets.
//!
//! The backend enforces its own request-rate ceiling with hard rejection,
//! so the gateway gates every remote call locally first. Each operation
//! class (read, write, delete, list) has an independent fixed window that
//! resets on expiry.
//!
//! Exhaustion is a normal, high-frequency condition: [`RequestBudget::admit`]
//! returns `false`, it never errors and never blocks.
//!
//! # Example
//!
//! ```
//! use datastore_gateway::{BudgetConfig, OpClass, RequestBudget};
//! use std::time::Duration;
//!
//! let budget = RequestBudget::new(BudgetConfig {
//!     max_per_window: 2,
//!     read_window: Duration::from_secs(60),
//!     ..Default::default()
//! });
//!
//! assert!(budget.admit(OpClass::Read));
//! assert!(budget.admit(OpClass::Read));
//! assert!(!budget.admit(OpClass::Read)); // exhausted
//! assert!(budget.admit(OpClass::Write)); // independent class
//! ```

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::GatewayConfig;

/// Operation class for budgeting and metrics. The backend apportions quota
/// by call type, so each class gets its own window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpClass {
    Read,
    Write,
    Delete,
    List,
}

impl OpClass {
    pub const ALL: [OpClass; 4] = [Self::Read, Self::Write, Self::Delete, Self::List];

    /// Lowercase label for logs and metric tags.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
            Self::List => "list",
        }
    }
}

impl std::fmt::Display for OpClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Window sizing for the four operation classes.
#[derive(Debug, Clone)]
pub struct BudgetConfig {
    /// Requests allowed per window, for every class.
    pub max_per_window: u32,
    pub read_window: Duration,
    pub write_window: Duration,
    pub delete_window: Duration,
    pub list_window: Duration,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_per_window: 100,
            read_window: Duration::from_secs(6),
            write_window: Duration::from_secs(6),
            delete_window: Duration::from_secs(6),
            list_window: Duration::from_secs(60),
        }
    }
}

impl BudgetConfig {
    #[must_use]
    pub fn from_gateway(config: &GatewayConfig) -> Self {
        Self {
            max_per_window: config.budget_per_window,
            read_window: Duration::from_secs(config.read_window_secs),
            write_window: Duration::from_secs(config.write_window_secs),
            delete_window: Duration::from_secs(config.delete_window_secs),
            list_window: Duration::from_secs(config.list_window_secs),
        }
    }

    fn window_for(&self, class: OpClass) -> Duration {
        match class {
            OpClass::Read => self.read_window,
            OpClass::Write => self.write_window,
            OpClass::Delete => self.delete_window,
            OpClass::List => self.list_window,
        }
    }
}

/// One class's window state. `remaining` never goes negative; the window
/// rolls lazily inside the accessors, so no background task is needed.
#[derive(Debug)]
struct WindowState {
    remaining: u32,
    window_start: Instant,
}

struct ClassBudget {
    state: Mutex<WindowState>,
    window: Duration,
    max_per_window: u32,
}

impl ClassBudget {
    fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            state: Mutex::new(WindowState {
                remaining: max_per_window,
                window_start: Instant::now(),
            }),
            window,
            max_per_window,
        }
    }

    fn roll_if_expired(&self, state: &mut WindowState, now: Instant) {
        if now.duration_since(state.window_start) >= self.window {
            state.remaining = self.max_per_window;
            state.window_start = now;
        }
    }

    fn admit(&self) -> bool {
        let mut state = self.state.lock();
        self.roll_if_expired(&mut state, Instant::now());
        if state.remaining > 0 {
            state.remaining -= 1;
            true
        } else {
            false
        }
    }

    fn remaining(&self) -> u32 {
        let mut state = self.state.lock();
        self.roll_if_expired(&mut state, Instant::now());
        state.remaining
    }

    fn time_until_reset(&self) -> Duration {
        let mut state = self.state.lock();
        let now = Instant::now();
        self.roll_if_expired(&mut state, now);
        self.window
            .saturating_sub(now.duration_since(state.window_start))
    }
}

/// Process-wide request gate, one fixed window per operation class.
///
/// Admission is a pure, non-blocking check. Consumption is final: a call
/// admitted and later cancelled is not refunded.
pub struct RequestBudget {
    read: ClassBudget,
    write: ClassBudget,
    delete: ClassBudget,
    list: ClassBudget,
}

impl RequestBudget {
    #[must_use]
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            read: ClassBudget::new(config.max_per_window, config.window_for(OpClass::Read)),
            write: ClassBudget::new(config.max_per_window, config.window_for(OpClass::Write)),
            delete: ClassBudget::new(config.max_per_window, config.window_for(OpClass::Delete)),
            list: ClassBudget::new(config.max_per_window, config.window_for(OpClass::List)),
        }
    }

    fn class(&self, class: OpClass) -> &ClassBudget {
        match class {
            OpClass::Read => &self.read,
            OpClass::Write => &self.write,
            OpClass::Delete => &self.delete,
            OpClass::List => &self.list,
        }
    }

    /// Try to admit one request of the given class.
    ///
    /// Returns `true` and consumes one unit when budget remains in the
    /// current window; `false` immediately otherwise. Never blocks.
    pub fn admit(&self, class: OpClass) -> bool {
        self.class(class).admit()
    }

    /// Requests left in the current window.
    #[must_use]
    pub fn remaining(&self, class: OpClass) -> u32 {
        self.class(class).remaining()
    }

    /// How long until the class's window rolls and the budget refills.
    /// For callers that prefer to wait rather than fail fast.
    #[must_use]
    pub fn time_until_reset(&self, class: OpClass) -> Duration {
        self.class(class).time_until_reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_windows(max: u32, window_ms: u64) -> BudgetConfig {
        let w = Duration::from_millis(window_ms);
        BudgetConfig {
            max_per_window: max,
            read_window: w,
            write_window: w,
            delete_window: w,
            list_window: w,
        }
    }

    #[test]
    fn test_admits_up_to_max_then_denies() {
        let budget = RequestBudget::new(tiny_windows(5, 60_000));

        for _ in 0..5 {
            assert!(budget.admit(OpClass::Read));
        }
        assert!(!budget.admit(OpClass::Read));
        assert_eq!(budget.remaining(OpClass::Read), 0);
    }

    #[test]
    fn test_classes_are_independent() {
        let budget = RequestBudget::new(tiny_windows(1, 60_000));

        assert!(budget.admit(OpClass::Read));
        assert!(!budget.admit(OpClass::Read));

        // Other classes untouched
        assert!(budget.admit(OpClass::Write));
        assert!(budget.admit(OpClass::Delete));
        assert!(budget.admit(OpClass::List));
    }

    #[test]
    fn test_remaining_never_negative() {
        let budget = RequestBudget::new(tiny_windows(2, 60_000));

        for _ in 0..10 {
            let _ = budget.admit(OpClass::Write);
        }
        assert_eq!(budget.remaining(OpClass::Write), 0);
    }

    #[tokio::test]
    async fn test_window_reset_refills_to_max() {
        let budget = RequestBudget::new(tiny_windows(3, 30));

        assert!(budget.admit(OpClass::Read));
        assert!(budget.admit(OpClass::Read));
        assert_eq!(budget.remaining(OpClass::Read), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;

        // Window rolled: back to exactly max
        assert_eq!(budget.remaining(OpClass::Read), 3);
        assert!(budget.admit(OpClass::Read));
    }

    #[tokio::test]
    async fn test_denied_then_admitted_after_reset() {
        let budget = RequestBudget::new(tiny_windows(1, 30));

        assert!(budget.admit(OpClass::List));
        assert!(!budget.admit(OpClass::List));

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(budget.admit(OpClass::List));
    }

    #[test]
    fn test_time_until_reset_within_window() {
        let budget = RequestBudget::new(tiny_windows(1, 60_000));

        let t = budget.time_until_reset(OpClass::Read);
        assert!(t <= Duration::from_secs(60));
        assert!(t > Duration::from_secs(59));
    }

    #[tokio::test]
    async fn test_time_until_reset_shrinks() {
        let budget = RequestBudget::new(tiny_windows(1, 200));

        let t1 = budget.time_until_reset(OpClass::Read);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let t2 = budget.time_until_reset(OpClass::Read);

        assert!(t2 < t1);
    }

    #[test]
    fn test_admit_is_non_blocking_under_contention() {
        use std::sync::Arc;

        let budget = Arc::new(RequestBudget::new(tiny_windows(1_000, 60_000)));
        let mut handles = vec![];

        for _ in 0..8 {
            let b = budget.clone();
            handles.push(std::thread::spawn(move || {
                let mut admitted = 0u32;
                for _ in 0..200 {
                    if b.admit(OpClass::Read) {
                        admitted += 1;
                    }
                }
                admitted
            }));
        }

        let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        // 8 * 200 = 1600 attempts against a budget of 1000: exactly 1000 admitted
        assert_eq!(total, 1_000);
    }

    #[test]
    fn test_op_class_labels() {
        assert_eq!(OpClass::Read.label(), "read");
        assert_eq!(OpClass::List.label(), "list");
        assert_eq!(format!("{}", OpClass::Delete), "delete");
    }

    #[test]
    fn test_config_from_gateway() {
        let gw = GatewayConfig {
            budget_per_window: 42,
            read_window_secs: 7,
            list_window_secs: 90,
            ..Default::default()
        };
        let config = BudgetConfig::from_gateway(&gw);
        assert_eq!(config.max_per_window, 42);
        assert_eq!(config.read_window, Duration::from_secs(7));
        assert_eq!(config.list_window, Duration::from_secs(90));
    }
}
