use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::time::Duration;

use tracing::{debug, info, info_span, warn};

use crate::error::DriveError;
use crate::hook;
use crate::prompt::{Framing, PromptScanner};
use crate::runtime::{DriveEvent, FixedTicker, PipeEventSource, Runner};

/// First candidate that exists on disk
pub fn locate(candidates: &[PathBuf]) -> Result<PathBuf, DriveError> {
    candidates
        .iter()
        .find(|p| p.exists())
        .cloned()
        .ok_or_else(|| DriveError::MissingDelegate {
            candidates: candidates.to_vec(),
        })
}

/// Runs a python script as `__main__` with `input()` replaced by a version
/// that wraps each prompt in STX/ETX, so prompts are found exactly.
/// `sys.argv` and `sys.path[0]` end up as if the script was run directly.
pub const INPUT_BOOTSTRAP: &str = r#"import builtins, os, runpy, sys
_real_input = builtins.input
def _framed_input(prompt=""):
    sys.stdout.write("\x02" + str(prompt) + "\x03")
    sys.stdout.flush()
    line = sys.stdin.readline()
    if not line:
        raise EOFError
    return line[:-1] if line.endswith("\n") else line
script = sys.argv[1]
sys.argv = sys.argv[1:]
sys.path[0] = os.path.dirname(os.path.abspath(script))
builtins.input = _framed_input
try:
    runpy.run_path(script, run_name="__main__")
finally:
    builtins.input = _real_input
"#;

/// The interactive program being driven: `<interpreter> <script> <args...>`
#[derive(Debug, Clone)]
pub struct Delegate {
    pub interpreter: String,
    pub script: PathBuf,
    pub args: Vec<OsString>,
    pub framing: Framing,
}

impl Delegate {
    pub fn new(interpreter: impl Into<String>, script: impl AsRef<Path>, args: Vec<OsString>) -> Self {
        Self {
            interpreter: interpreter.into(),
            script: script.as_ref().to_path_buf(),
            args,
            framing: Framing::Auto,
        }
    }

    pub fn framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    fn is_python(&self) -> bool {
        Path::new(&self.interpreter)
            .file_name()
            .map(|name| name.to_string_lossy().starts_with("python"))
            .unwrap_or(false)
    }

    /// Whether prompts arrive framed; `auto` frames python delegates only
    pub fn is_framed(&self) -> bool {
        match self.framing {
            Framing::Auto => self.is_python(),
            Framing::Sentinel => true,
            Framing::Heuristic => false,
        }
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        if self.is_framed() && self.is_python() {
            cmd.arg("-c").arg(INPUT_BOOTSTRAP);
        }
        cmd.arg(&self.script)
            .args(&self.args)
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        cmd
    }

    /// Shell-ish rendering for logs and `--dry-run`
    pub fn display(&self) -> String {
        std::iter::once(self.interpreter.clone())
            .chain(std::iter::once(self.script.display().to_string()))
            .chain(self.args.iter().map(|a| a.to_string_lossy().into_owned()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Run the delegate to completion, answering its prompts through
/// [`hook::input`] and echoing its output to `echo`.
pub fn drive<W: Write>(
    delegate: &Delegate,
    idle: Duration,
    echo: &mut W,
) -> Result<ExitStatus, DriveError> {
    let span = info_span!("drive", script = %delegate.script.display(), framed = delegate.is_framed());
    let _enter = span.enter();

    let mut child = delegate
        .command()
        .spawn()
        .map_err(|source| DriveError::Spawn {
            program: delegate.interpreter.clone(),
            source,
        })?;
    info!(pid = child.id(), command = %delegate.display(), "delegate started");

    let (stdout, stdin) = match attach(&mut child) {
        Ok(pipes) => pipes,
        Err(err) => {
            stop(&mut child);
            return Err(err);
        }
    };

    let scanner = if delegate.is_framed() {
        PromptScanner::sentinel()
    } else {
        PromptScanner::heuristic()
    };
    if let Err(err) = pump(stdout, stdin, scanner, idle, echo) {
        warn!(error = %err, "stopping delegate");
        stop(&mut child);
        return Err(err);
    }

    let status = child.wait()?;
    info!(code = ?status.code(), "delegate exited");
    Ok(status)
}

/// Take the delegate's pipes; stdout is required, stdin is best effort
fn attach(child: &mut Child) -> Result<(ChildStdout, Option<ChildStdin>), DriveError> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "delegate stdout unavailable"))?;
    Ok((stdout, child.stdin.take()))
}

/// Kill and reap a delegate that is being abandoned
fn stop(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!(error = %err, "delegate already gone");
    }
    if let Err(err) = child.wait() {
        warn!(error = %err, "could not reap delegate");
    }
}

fn pump<W: Write>(
    stdout: ChildStdout,
    mut stdin: Option<ChildStdin>,
    mut scanner: PromptScanner,
    idle: Duration,
    echo: &mut W,
) -> Result<(), DriveError> {
    let runner = Runner::new(PipeEventSource::new(stdout), FixedTicker::new(idle));

    loop {
        let prompts = match runner.step() {
            DriveEvent::Output(bytes) => {
                echo.write_all(&scanner.echo_bytes(&bytes))?;
                echo.flush()?;
                scanner.feed(&bytes)
            }
            DriveEvent::Idle => {
                let dangling = scanner.on_idle();
                if dangling.is_some() {
                    debug!("delegate idle on an unrecognised prompt");
                }
                dangling.into_iter().collect()
            }
            DriveEvent::Closed => return Ok(()),
        };

        for prompt in prompts {
            let answer = hook::input(&prompt)?;
            debug!(answer = %answer, "answering prompt");
            answer_prompt(&mut stdin, &answer);
        }
    }
}

fn answer_prompt(stdin: &mut Option<ChildStdin>, answer: &str) {
    let Some(pipe) = stdin.as_mut() else {
        return;
    };
    let written = pipe
        .write_all(answer.as_bytes())
        .and_then(|_| pipe.write_all(b"\n"))
        .and_then(|_| pipe.flush());
    if let Err(err) = written {
        if err.kind() == io::ErrorKind::BrokenPipe {
            debug!("delegate closed its stdin");
        } else {
            warn!(error = %err, "could not answer delegate prompt");
        }
        *stdin = None;
    }
}

/// Map the delegate's exit status onto the shim's result
pub fn check_status(status: ExitStatus) -> Result<(), DriveError> {
    if status.success() {
        Ok(())
    } else {
        Err(DriveError::DelegateFailed {
            code: status.code(),
        })
    }
}
