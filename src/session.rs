use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use crate::util::{format_mmss, per_step, percent};

/// Source of monotonic time for the session clock
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// How far the replay has advanced in each sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayCursor {
    pub mouse: usize,
    pub key: usize,
}

impl ReplayCursor {
    /// Steps completed: a step needs both its mouse and key token
    pub fn step(&self) -> usize {
        self.mouse.min(self.key)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionClock {
    pub started_at: Option<Instant>,
    pub started_wall: Option<DateTime<Local>>,
}

impl SessionClock {
    pub fn start_if_needed(&mut self, now: Instant) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
            self.started_wall = Some(Local::now());
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.started_at
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default()
    }
}

/// One progress report, emitted after every keyboard action
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub step: usize,
    pub total: usize,
    pub percent: f64,
    pub elapsed: Duration,
    pub eta: Duration,
    pub mouse: Option<String>,
    pub key: String,
}

impl Progress {
    pub fn compute(
        cursor: ReplayCursor,
        total: usize,
        elapsed: Duration,
        mouse: Option<&str>,
        key: &str,
    ) -> Self {
        let step = cursor.step();
        let remaining = total.saturating_sub(step);
        Self {
            step,
            total,
            percent: percent(step, total),
            elapsed,
            eta: per_step(elapsed, step) * remaining as u32,
            mouse: mouse.map(str::to_string),
            key: key.to_string(),
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[progress] step {}/{} ({:5.1}%) | elapsed {} | eta {} | mouse={} key={}",
            self.step,
            self.total,
            self.percent,
            format_mmss(self.elapsed),
            format_mmss(self.eta),
            self.mouse.as_deref().unwrap_or("-"),
            self.key,
        )
    }
}
