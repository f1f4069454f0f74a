use autodrive::{
    autopilot::{Autopilot, ImagePolicy},
    choreography::Choreography,
    config::{Config, ConfigStore, FileConfigStore},
    delegate::{self, Delegate},
    error::DriveError,
    hook,
    prompt::Framing,
};
use clap::Parser;
use crossterm::tty::IsTty;
use std::{
    cell::RefCell,
    ffi::OsString,
    io::{self, stdin},
    path::{Path, PathBuf},
    process::ExitCode,
    rc::Rc,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// drive an interactive inference script unattended from a scripted action plan
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Runs the original interactive script as a child process, answers its image, stop, mouse and keyboard prompts from a fixed choreography, and prints progress with an eta after every step. Arguments after the options are passed to the script unchanged."
)]
pub struct Cli {
    /// config file to use instead of the platform default
    #[clap(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// image to answer the image-path prompt with (overrides the environment)
    #[clap(long, value_name = "PATH")]
    image: Option<PathBuf>,

    /// answer the image-path prompt automatically or ask the operator
    #[clap(long, value_enum)]
    image_policy: Option<ImagePolicy>,

    /// how prompts are found: sentinel frames (python via an input bootstrap), or the heuristic line scan
    #[clap(long, value_enum)]
    framing: Option<Framing>,

    /// interpreter used to run the delegate script
    #[clap(long)]
    interpreter: Option<String>,

    /// delegate script candidate, may be repeated; replaces the configured list
    #[clap(long = "delegate", value_name = "FILE")]
    delegates: Vec<PathBuf>,

    /// milliseconds of silence before an unrecognised prompt is answered with a blank line
    #[clap(long)]
    idle_ms: Option<u64>,

    /// log filter used when RUST_LOG is unset (error, warn, info, debug, trace)
    #[clap(long)]
    log_level: Option<String>,

    /// check the delegate and image, print the plan, and exit without running
    #[clap(long)]
    dry_run: bool,

    /// write the effective configuration to the config file and exit
    #[clap(long)]
    init_config: bool,

    /// arguments passed to the delegate unchanged
    #[clap(
        value_name = "DELEGATE_ARGS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    delegate_args: Vec<OsString>,
}

impl Cli {
    /// Layer command line overrides on top of the loaded config
    fn apply(&self, mut cfg: Config) -> Config {
        if let Some(policy) = self.image_policy {
            cfg.image_policy = policy;
        }
        if let Some(framing) = self.framing {
            cfg.framing = framing;
        }
        if let Some(interpreter) = &self.interpreter {
            cfg.interpreter = interpreter.clone();
        }
        if !self.delegates.is_empty() {
            cfg.candidates = self.delegates.clone();
        }
        if let Some(idle_ms) = self.idle_ms {
            cfg.idle_ms = idle_ms;
        }
        if let Some(level) = &self.log_level {
            cfg.log_level = level.clone();
        }
        cfg
    }
}

fn init_logging(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            println!("[error] {err}");
            ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1))
        }
    }
}

fn run(cli: &Cli) -> Result<(), DriveError> {
    let store = cli
        .config
        .as_ref()
        .map(FileConfigStore::with_path)
        .unwrap_or_default();
    let cfg = cli.apply(store.load());
    init_logging(&cfg.log_level);

    if cli.init_config {
        store.save(&cfg).map_err(|source| DriveError::Config {
            path: store.path().to_path_buf(),
            source,
        })?;
        println!("wrote {}", store.path().display());
        return Ok(());
    }

    let script = delegate::locate(&cfg.candidates)?;
    info!(script = %script.display(), "delegate located");

    let image = cfg.image_path(cli.image.as_deref(), |name| std::env::var(name).ok());
    if cfg.image_policy == ImagePolicy::Auto && !image.exists() {
        return Err(DriveError::MissingResource { path: image });
    }

    let plan = Choreography::from_spec(&cfg.choreography)?;
    let delegate =
        Delegate::new(&cfg.interpreter, &script, cli.delegate_args.clone()).framing(cfg.framing);

    if cli.dry_run {
        print_plan(&delegate, &image, cfg.image_policy, &plan);
        return Ok(());
    }

    if cfg.image_policy == ImagePolicy::Ask && !stdin().is_tty() {
        warn!("image policy is ask but stdin is not a terminal");
    }

    let pilot = Rc::new(RefCell::new(
        Autopilot::new(plan, image, io::stdout()).policy(cfg.image_policy),
    ));
    let status = hook::with_provider(pilot.clone(), || {
        delegate::drive(&delegate, cfg.idle_interval(), &mut io::stdout())
    })?;

    pilot.borrow_mut().emit_summary();
    delegate::check_status(status)
}

fn print_plan(delegate: &Delegate, image: &Path, policy: ImagePolicy, plan: &Choreography) {
    let (mouse, keys) = plan.describe();
    println!("[plan] delegate: {}", delegate.display());
    println!("[plan] image: {} ({policy})", image.display());
    println!(
        "[plan] prompts: {}",
        if delegate.is_framed() { "framed" } else { "line scan" }
    );
    println!("[plan] mouse: {mouse}");
    println!("[plan] keys: {keys}");
    println!("[plan] steps: {}", plan.total());
}
