use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("delegate script not found (tried: {})", display_paths(.candidates))]
    MissingDelegate { candidates: Vec<PathBuf> },

    #[error("image not found: {}", .path.display())]
    MissingResource { path: PathBuf },

    #[error("invalid choreography: {0}")]
    Choreography(String),

    #[error("could not write config {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("delegate i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("delegate exited with {}", display_code(.code))]
    DelegateFailed { code: Option<i32> },
}

impl DriveError {
    /// Process exit status to report for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            DriveError::DelegateFailed { code: Some(code) } if *code != 0 => *code,
            _ => 1,
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}
