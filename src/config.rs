use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::autopilot::ImagePolicy;
use crate::choreography::ChoreographySpec;
use crate::prompt::Framing;

pub const DEFAULT_IMAGE_ENV: &str = "MG2_IMAGE";
pub const DEFAULT_IMAGE: &str = "demo_images/boxerqual.jpg";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Delegate scripts to look for, first existing one wins
    pub candidates: Vec<PathBuf>,
    pub interpreter: String,
    /// Environment variable that overrides `default_image`
    pub image_env: String,
    pub default_image: PathBuf,
    pub image_policy: ImagePolicy,
    /// How prompt boundaries are found in the delegate's output
    pub framing: Framing,
    /// Quiet time after which a dangling prompt is answered
    pub idle_ms: u64,
    pub log_level: String,
    pub choreography: ChoreographySpec,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            candidates: vec![
                PathBuf::from("inference_streaming_original.py"),
                PathBuf::from("inference_streaming.py.bak"),
            ],
            interpreter: "python3".to_string(),
            image_env: DEFAULT_IMAGE_ENV.to_string(),
            default_image: PathBuf::from(DEFAULT_IMAGE),
            image_policy: ImagePolicy::Auto,
            framing: Framing::Auto,
            idle_ms: 250,
            log_level: "warn".to_string(),
            choreography: ChoreographySpec::default(),
        }
    }
}

impl Config {
    /// `--image` beats the environment, which beats the configured default
    pub fn image_path<F>(&self, flag: Option<&Path>, lookup: F) -> PathBuf
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = flag {
            return path.to_path_buf();
        }
        match lookup(&self.image_env) {
            Some(value) if !value.is_empty() => PathBuf::from(value),
            _ => self.default_image.clone(),
        }
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_ms.max(1))
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
    fn path(&self) -> &Path;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "autodrive") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("autodrive_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "ignoring unreadable config");
                }
            },
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "no config file, using defaults");
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).map_err(std::io::Error::other)?;
        fs::write(&self.path, data)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
