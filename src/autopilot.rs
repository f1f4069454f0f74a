use std::io::{self, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::choreography::Choreography;
use crate::hook::{InputProvider, StdinProvider};
use crate::prompt::{classify, PromptKind};
use crate::session::{Clock, Progress, ReplayCursor, SessionClock, SystemClock};
use crate::util::format_mmss;

/// How the image-path prompt is answered
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ImagePolicy {
    /// answer with the configured default image
    #[default]
    Auto,
    /// show the default as a hint and let the operator type the path
    Ask,
}

/// Stands in for the operator: answers the delegate's prompts from the
/// choreography and reports progress on `out`.
pub struct Autopilot<W: Write, C: Clock = SystemClock> {
    plan: Choreography,
    image: PathBuf,
    policy: ImagePolicy,
    cursor: ReplayCursor,
    clock: C,
    session: SessionClock,
    out: W,
    fallback: Box<dyn InputProvider>,
}

impl<W: Write> Autopilot<W> {
    pub fn new(plan: Choreography, image: PathBuf, out: W) -> Self {
        Self::with_clock(plan, image, out, SystemClock)
    }
}

impl<W: Write, C: Clock> Autopilot<W, C> {
    pub fn with_clock(plan: Choreography, image: PathBuf, out: W, clock: C) -> Self {
        Self {
            plan,
            image,
            policy: ImagePolicy::default(),
            cursor: ReplayCursor::default(),
            clock,
            session: SessionClock::default(),
            out,
            fallback: Box::new(StdinProvider),
        }
    }

    pub fn policy(mut self, policy: ImagePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Where operator answers come from when the policy asks for them
    pub fn fallback(mut self, fallback: Box<dyn InputProvider>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn cursor(&self) -> ReplayCursor {
        self.cursor
    }

    pub fn plan(&self) -> &Choreography {
        &self.plan
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Answer one prompt. Never blocks except when the image policy is `ask`.
    pub fn resolve_prompt(&mut self, prompt: &str) -> String {
        let kind = classify(prompt);
        debug!(kind = ?kind, cursor = ?self.cursor, "resolving prompt");
        match kind {
            Some(PromptKind::ImagePath) => self.image_path(),
            Some(PromptKind::StopConfirmation) | None => {
                self.emit("");
                String::new()
            }
            Some(PromptKind::MouseAction) => self.mouse_action(),
            Some(PromptKind::KeyboardAction) => self.keyboard_action(),
        }
    }

    /// Progress as of the last keyboard action, if the session has started
    pub fn progress(&self) -> Option<Progress> {
        self.session.started_at?;
        let mouse = last_consumed(self.cursor.mouse).and_then(|i| self.plan.mouse_at(i));
        let key = last_consumed(self.cursor.key)
            .and_then(|i| self.plan.key_at(i))
            .unwrap_or_default();
        Some(Progress::compute(
            self.cursor,
            self.plan.total(),
            self.session.elapsed(self.clock.now()),
            mouse,
            key,
        ))
    }

    /// `[done]` line for the end of the run
    pub fn summary(&self) -> String {
        let elapsed = self.session.elapsed(self.clock.now());
        let started = self
            .session
            .started_wall
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "[done] {}/{} steps | elapsed {} | started {}",
            self.cursor.step(),
            self.plan.total(),
            format_mmss(elapsed),
            started
        )
    }

    pub fn emit_summary(&mut self) {
        let line = self.summary();
        self.emit(&line);
    }

    fn image_path(&mut self) -> String {
        match self.policy {
            ImagePolicy::Auto => {
                let path = self.image.display().to_string();
                self.emit(&path);
                path
            }
            ImagePolicy::Ask => {
                let hint = format!(
                    "[hint] paste your image path (e.g. {}) and press Enter",
                    self.image.display()
                );
                self.emit(&hint);
                match self.fallback.read_line("") {
                    Ok(answer) => answer,
                    Err(err) => {
                        warn!(error = %err, "could not read image path from operator");
                        String::new()
                    }
                }
            }
        }
    }

    fn mouse_action(&mut self) -> String {
        self.session.start_if_needed(self.clock.now());
        let answer = self
            .plan
            .mouse_at(self.cursor.mouse)
            .unwrap_or_default()
            .to_string();
        self.cursor.mouse += 1;
        self.emit(&answer);
        answer
    }

    fn keyboard_action(&mut self) -> String {
        self.session.start_if_needed(self.clock.now());
        let answer = self
            .plan
            .key_at(self.cursor.key)
            .unwrap_or_default()
            .to_string();
        self.cursor.key += 1;
        if let Some(progress) = self.progress() {
            self.emit("");
            self.emit(&progress.to_string());
        }
        answer
    }

    fn emit(&mut self, line: &str) {
        if let Err(err) = writeln!(self.out, "{line}").and_then(|_| self.out.flush()) {
            debug!(error = %err, "terminal write failed");
        }
    }
}

fn last_consumed(cursor: usize) -> Option<usize> {
    cursor.checked_sub(1)
}

impl<W: Write, C: Clock> InputProvider for Autopilot<W, C> {
    fn read_line(&mut self, prompt: &str) -> io::Result<String> {
        Ok(self.resolve_prompt(prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::choreography::ChoreographySpec;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::{Duration, Instant};

    struct ManualClock {
        base: Instant,
        offset: Cell<Duration>,
    }

    impl ManualClock {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                base: Instant::now(),
                offset: Cell::new(Duration::ZERO),
            })
        }

        fn advance(&self, d: Duration) {
            self.offset.set(self.offset.get() + d);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.base + self.offset.get()
        }
    }

    struct Typed(&'static str);

    impl InputProvider for Typed {
        fn read_line(&mut self, _prompt: &str) -> io::Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn default_plan() -> Choreography {
        Choreography::from_spec(&ChoreographySpec::default()).unwrap()
    }

    fn lines(pilot: &Autopilot<Vec<u8>, Rc<ManualClock>>) -> Vec<String> {
        String::from_utf8(pilot.output().clone())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn image_prompt_returns_default_path() {
        let mut pilot = Autopilot::new(default_plan(), PathBuf::from("demo/a.jpg"), Vec::new());
        assert_eq!(pilot.resolve_prompt("Please input the image path: "), "demo/a.jpg");
        assert_eq!(String::from_utf8(pilot.output().clone()).unwrap(), "demo/a.jpg\n");
    }

    #[test]
    fn stop_prompt_declines() {
        let mut pilot = Autopilot::new(default_plan(), PathBuf::from("a.jpg"), Vec::new());
        assert_eq!(pilot.resolve_prompt("Press `n` to stop generation"), "");
        assert_eq!(pilot.resolve_prompt("press 'n' to stop"), "");
        assert_eq!(pilot.cursor(), ReplayCursor::default());
    }

    #[test]
    fn unknown_prompt_returns_empty() {
        let mut pilot = Autopilot::new(default_plan(), PathBuf::from("a.jpg"), Vec::new());
        for prompt in ["", "Continue? [y/N]", "\n\n", "mouse", "actions please"] {
            assert_eq!(pilot.resolve_prompt(prompt), "");
        }
        assert_eq!(pilot.cursor(), ReplayCursor::default());
        assert!(pilot.progress().is_none());
    }

    #[test]
    fn mouse_then_key_reports_progress() {
        let clock = ManualClock::new();
        let mut pilot = Autopilot::with_clock(
            default_plan(),
            PathBuf::from("a.jpg"),
            Vec::new(),
            clock.clone(),
        );

        assert_eq!(pilot.resolve_prompt("mouse action:"), "K");
        clock.advance(Duration::from_secs(2));
        assert_eq!(pilot.resolve_prompt("keyboard action:"), "Q");

        let out = lines(&pilot);
        assert_eq!(out[0], "K");
        assert_eq!(out[1], "");
        assert_eq!(
            out[2],
            "[progress] step 1/210 (  0.5%) | elapsed 00:02 | eta 06:58 | mouse=K key=Q"
        );
    }

    #[test]
    fn clock_starts_at_first_action_prompt() {
        let clock = ManualClock::new();
        let mut pilot = Autopilot::with_clock(
            default_plan(),
            PathBuf::from("a.jpg"),
            Vec::new(),
            clock.clone(),
        );
        pilot.resolve_prompt("image path");
        clock.advance(Duration::from_secs(90));
        pilot.resolve_prompt("mouse action");
        clock.advance(Duration::from_secs(1));
        pilot.resolve_prompt("keyboard action");

        assert_eq!(pilot.progress().unwrap().elapsed, Duration::from_secs(1));
    }

    #[test]
    fn cursors_clamp_after_total() {
        let plan = Choreography::new(vec!["K".into(), "U".into()], vec!["Q".into(), "W".into()])
            .unwrap();
        let mut pilot = Autopilot::new(plan, PathBuf::from("a.jpg"), Vec::new());
        let answers: Vec<String> = (0..4).map(|_| pilot.resolve_prompt("mouse action")).collect();
        assert_eq!(answers, ["K", "U", "U", "U"]);
        assert_eq!(pilot.cursor().mouse, 4);
    }

    #[test]
    fn empty_plan_answers_blank() {
        let plan = Choreography::new(vec![], vec![]).unwrap();
        let mut pilot = Autopilot::new(plan, PathBuf::from("a.jpg"), Vec::new());
        assert_eq!(pilot.resolve_prompt("mouse action"), "");
        assert_eq!(pilot.resolve_prompt("keyboard action"), "");
        assert_eq!(pilot.progress().unwrap().percent, 100.0);
    }

    #[test]
    fn ask_policy_reads_from_fallback() {
        let mut pilot = Autopilot::new(default_plan(), PathBuf::from("demo/t.jpg"), Vec::new())
            .policy(ImagePolicy::Ask)
            .fallback(Box::new(Typed("/tmp/mine.jpg")));
        assert_eq!(pilot.resolve_prompt("Image Path:"), "/tmp/mine.jpg");
        let out = String::from_utf8(pilot.output().clone()).unwrap();
        assert!(out.starts_with("[hint] paste your image path (e.g. demo/t.jpg)"));
    }

    #[test]
    fn summary_counts_completed_steps() {
        let clock = ManualClock::new();
        let mut pilot = Autopilot::with_clock(
            default_plan(),
            PathBuf::from("a.jpg"),
            Vec::new(),
            clock.clone(),
        );
        for _ in 0..3 {
            pilot.resolve_prompt("mouse action");
            pilot.resolve_prompt("keyboard action");
            clock.advance(Duration::from_secs(20));
        }
        let summary = pilot.summary();
        assert!(summary.starts_with("[done] 3/210 steps | elapsed 01:00 | started "));
    }
}
