use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic millisecond source.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall clock, measured from construction.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Deterministic clock: every reading advances time by `step_ms`.
///
/// The first reading returns 0, so a budget built on it sees `step_ms`
/// elapsed at its first check.
pub struct FixedStepClock {
    step_ms: u64,
    ticks: AtomicU64,
}

impl FixedStepClock {
    pub fn new(step_ms: u64) -> Self {
        Self {
            step_ms,
            ticks: AtomicU64::new(0),
        }
    }
}

impl Clock for FixedStepClock {
    fn now_ms(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::SeqCst) * self.step_ms
    }
}

/// Cooperative time budget for one sync invocation.
///
/// Callers check `has_remaining` between units of work. The budget never
/// interrupts work in flight.
pub struct ExecutionBudget {
    ceiling_ms: u64,
    clock: Arc<dyn Clock>,
    started_ms: u64,
    resume_point: Option<String>,
}

impl ExecutionBudget {
    pub fn new(ceiling_ms: u64) -> Self {
        Self::with_clock(ceiling_ms, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(ceiling_ms: u64, clock: Arc<dyn Clock>) -> Self {
        let started_ms = clock.now_ms();
        Self {
            ceiling_ms,
            clock,
            started_ms,
            resume_point: None,
        }
    }

    pub fn ceiling_ms(&self) -> u64 {
        self.ceiling_ms
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.clock.now_ms().saturating_sub(self.started_ms)
    }

    pub fn remaining_ms(&self) -> u64 {
        self.ceiling_ms.saturating_sub(self.elapsed_ms())
    }

    pub fn has_remaining(&self) -> bool {
        self.elapsed_ms() < self.ceiling_ms
    }

    pub fn mark_resume_point(&mut self, id: impl Into<String>) {
        self.resume_point = Some(id.into());
    }

    pub fn resume_point(&self) -> Option<&str> {
        self.resume_point.as_deref()
    }
}
