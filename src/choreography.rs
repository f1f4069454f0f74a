use serde::{Deserialize, Serialize};

use crate::error::DriveError;

/// A token repeated `count` times in a row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Run {
    pub token: String,
    pub count: usize,
}

impl Run {
    pub fn new(token: impl Into<String>, count: usize) -> Self {
        Self {
            token: token.into(),
            count,
        }
    }
}

/// Serialized form of the action plan: mouse and keyboard runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChoreographySpec {
    pub mouse: Vec<Run>,
    pub keys: Vec<Run>,
}

impl Default for ChoreographySpec {
    // Mouse: I(up), K(down), J(left), L(right), U(no move)
    // Keys : W(forward), S(back), A(left), D(right), Q(no move)
    fn default() -> Self {
        Self {
            mouse: vec![
                Run::new("K", 15),
                Run::new("I", 15),
                Run::new("L", 120),
                Run::new("U", 60),
            ],
            keys: vec![Run::new("Q", 15 + 15 + 120), Run::new("W", 60)],
        }
    }
}

/// The expanded, immutable action sequences. Both sequences have `total()` tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choreography {
    mouse: Vec<String>,
    keys: Vec<String>,
}

impl Choreography {
    pub fn new(mouse: Vec<String>, keys: Vec<String>) -> Result<Self, DriveError> {
        if mouse.len() != keys.len() {
            return Err(DriveError::Choreography(format!(
                "mouse sequence has {} steps but key sequence has {}",
                mouse.len(),
                keys.len()
            )));
        }
        if let Some(bad) = mouse.iter().chain(keys.iter()).find(|t| !valid_token(t)) {
            return Err(DriveError::Choreography(format!(
                "token {bad:?} must be non-empty and fit on one line"
            )));
        }
        Ok(Self { mouse, keys })
    }

    pub fn from_spec(spec: &ChoreographySpec) -> Result<Self, DriveError> {
        Self::new(expand(&spec.mouse), expand(&spec.keys))
    }

    pub fn total(&self) -> usize {
        self.mouse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mouse.is_empty()
    }

    /// Mouse token for a cursor value; cursors past the end repeat the final token
    pub fn mouse_at(&self, cursor: usize) -> Option<&str> {
        clamped(&self.mouse, cursor)
    }

    pub fn key_at(&self, cursor: usize) -> Option<&str> {
        clamped(&self.keys, cursor)
    }

    /// Collapse back into runs, e.g. `K×15 I×15 L×120 U×60`
    pub fn describe(&self) -> (String, String) {
        (describe_runs(&self.mouse), describe_runs(&self.keys))
    }
}

pub fn expand(runs: &[Run]) -> Vec<String> {
    runs.iter()
        .flat_map(|run| std::iter::repeat(run.token.clone()).take(run.count))
        .collect()
}

fn clamped(seq: &[String], cursor: usize) -> Option<&str> {
    let last = seq.len().checked_sub(1)?;
    seq.get(cursor.min(last)).map(String::as_str)
}

fn valid_token(token: &str) -> bool {
    !token.is_empty() && !token.contains(['\n', '\r'])
}

fn describe_runs(seq: &[String]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut iter = seq.iter().peekable();
    while let Some(token) = iter.next() {
        let mut count = 1;
        while iter.peek() == Some(&token) {
            iter.next();
            count += 1;
        }
        parts.push(format!("{token}×{count}"));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn default_plan_has_210_steps() {
        let plan = Choreography::from_spec(&ChoreographySpec::default()).unwrap();
        assert_eq!(plan.total(), 210);
        assert_eq!(plan.mouse_at(0), Some("K"));
        assert_eq!(plan.mouse_at(15), Some("I"));
        assert_eq!(plan.mouse_at(30), Some("L"));
        assert_eq!(plan.mouse_at(150), Some("U"));
        assert_eq!(plan.key_at(149), Some("Q"));
        assert_eq!(plan.key_at(150), Some("W"));
    }

    #[test]
    fn cursor_past_end_repeats_last_token() {
        let plan = Choreography::from_spec(&ChoreographySpec::default()).unwrap();
        assert_eq!(plan.key_at(209), Some("W"));
        assert_eq!(plan.key_at(210), Some("W"));
        assert_eq!(plan.mouse_at(10_000), Some("U"));
    }

    #[test]
    fn empty_plan_has_no_tokens() {
        let plan = Choreography::new(vec![], vec![]).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.mouse_at(0), None);
        assert_eq!(plan.key_at(3), None);
    }

    #[test]
    fn unbalanced_plan_is_rejected() {
        let spec = ChoreographySpec {
            mouse: vec![Run::new("K", 3)],
            keys: vec![Run::new("Q", 2)],
        };
        assert_matches!(Choreography::from_spec(&spec), Err(DriveError::Choreography(_)));
    }

    #[test]
    fn multiline_token_is_rejected() {
        let result = Choreography::new(vec!["K\n".into()], vec!["Q".into()]);
        assert_matches!(result, Err(DriveError::Choreography(msg)) if msg.contains("one line"));
    }

    #[test]
    fn describe_collapses_runs() {
        let plan = Choreography::from_spec(&ChoreographySpec::default()).unwrap();
        let (mouse, keys) = plan.describe();
        assert_eq!(mouse, "K×15 I×15 L×120 U×60");
        assert_eq!(keys, "Q×150 W×60");
    }
}
