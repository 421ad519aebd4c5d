use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{sleep, Instant, Sleep};

/// A cancellable one-shot deadline for use inside `select!` loops.
///
/// At most one deadline is armed at a time. [`fired`](Self::fired) completes
/// once when the armed deadline passes and is pending forever while idle, so
/// an unarmed timer never wins a `select!`.
#[derive(Default)]
pub struct Timer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer to fire `after` from now.
    ///
    /// Replaces any deadline already armed. Returns `true` if one was.
    pub fn schedule(&mut self, after: Duration) -> bool {
        let replaced = self.sleep.is_some();
        self.sleep = Some(Box::pin(sleep(after)));
        replaced
    }

    /// Disarm the timer. Returns `true` if a deadline was armed.
    pub fn cancel(&mut self) -> bool {
        self.sleep.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    /// The armed deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.sleep.as_ref().map(|s| s.deadline())
    }

    /// Wait for the armed deadline, then disarm.
    ///
    /// Cancel safe: dropping the future before it completes leaves the
    /// deadline armed.
    pub async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(s) => {
                s.as_mut().await;
                self.sleep = None;
            }
            None => pending::<()>().await,
        }
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("deadline", &self.deadline())
            .finish()
    }
}
