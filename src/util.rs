use std::time::Duration;

/// `MM:SS`, truncating fractional seconds. Minutes keep counting past 59.
pub fn format_mmss(d: Duration) -> String {
    let secs = d.as_secs();
    let (m, s) = (secs / 60, secs % 60);
    format!("{m:02}:{s:02}")
}

pub fn percent(done: usize, total: usize) -> f64 {
    match total {
        0 => 100.0,
        total => 100.0 * done as f64 / total as f64,
    }
}

/// Average duration per completed step, zero before the first step
pub fn per_step(elapsed: Duration, steps: usize) -> Duration {
    match steps {
        positive if positive > 0 => elapsed.div_f64(steps as f64),
        _ => Duration::ZERO,
    }
}
