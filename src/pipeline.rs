use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cancel::{self, CancelToken};
use crate::clock::SystemClock;
use crate::cmd;
use crate::compose::{self, ComposeEngine};
use crate::config::Settings;
use crate::deploy::Orchestrator;
use crate::deploy::health::HealthPolicy;
use crate::engine::{ContainerEngine, ContainerState};
use crate::error::{DeployError, DeployResult};
use crate::ledger::KnownGoodLedger;
use crate::plan::{DeploymentPlan, Mode, PlanOptions};

#[derive(Parser)]
#[command(name = "capataz")]
#[command(about = "Selectively redeploy Docker Compose services on a remote host")]
struct Cli {
    /// Remote host name or IP
    #[arg(long, env = "DEPLOY_HOST", global = true)]
    host: Option<String>,

    /// SSH user on the remote host
    #[arg(long, env = "DEPLOY_USER", default_value = "root", global = true)]
    user: String,

    /// Compose project directory on the remote host
    #[arg(long, env = "DEPLOY_DIR", default_value = "/opt/app", global = true)]
    remote_dir: String,

    /// SSH private key
    #[arg(long, env = "DEPLOY_SSH_KEY", global = true)]
    ssh_key: Option<String>,

    /// SSH connection timeout in seconds
    #[arg(long, default_value_t = 30, global = true)]
    connect_timeout: u64,

    /// Log level, overridden by `RUST_LOG`
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Deploy the given services, in order
    Deploy {
        /// Compose service names
        #[arg(required = true)]
        targets: Vec<String>,

        /// Build images on the host instead of pulling them
        #[arg(long)]
        build: bool,

        /// Wait for each service to stay running, roll back if not
        #[arg(long)]
        health_check: bool,

        /// Print what would run without touching the host
        #[arg(long)]
        dry_run: bool,

        /// Leave an unhealthy service in place instead of rolling back
        #[arg(long)]
        no_rollback: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Seconds between health polls
        #[arg(long, default_value_t = 2)]
        health_interval: u64,

        /// Seconds to wait for a service to become stable
        #[arg(long, default_value_t = 30)]
        health_timeout: u64,

        /// Local compose file to validate service names against
        #[arg(long)]
        compose_file: Option<PathBuf>,

        /// File recording the last known-good image per service
        #[arg(long, env = "DEPLOY_STATE_FILE")]
        state_file: Option<PathBuf>,
    },

    /// Show the container state of the given services
    Status {
        /// Compose service names
        #[arg(required = true)]
        targets: Vec<String>,
    },
}

/// Parse CLI arguments, run the command, and map the result to a
/// process exit code.
pub fn run() -> DeployResult<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let host = cli
        .host
        .clone()
        .ok_or_else(|| DeployError::Other("no remote host: pass --host or set DEPLOY_HOST".into()))?;

    let mut settings = Settings::new(&host);
    settings.user.clone_from(&cli.user);
    settings.remote_dir.clone_from(&cli.remote_dir);
    settings.ssh_key.clone_from(&cli.ssh_key);
    settings.connect_timeout = Duration::from_secs(cli.connect_timeout);

    match cli.command {
        Command::Deploy {
            targets,
            build,
            health_check,
            dry_run,
            no_rollback,
            json,
            health_interval,
            health_timeout,
            compose_file,
            state_file,
        } => {
            settings.health = HealthPolicy {
                interval: Duration::from_secs(health_interval),
                timeout: Duration::from_secs(health_timeout),
            };
            settings.compose_file = compose_file;
            settings.state_file = state_file;

            let mode = if build { Mode::Build } else { Mode::PullOnly };
            let options = PlanOptions {
                verify_health: health_check,
                dry_run,
                rollback: !no_rollback,
            };
            cmd_deploy(&settings, &targets, mode, options, json)
        }
        Command::Status { targets } => cmd_status(&settings, &targets),
    }
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Validate and plan, then run the plan. Planning errors return
/// before any remote command.
pub fn cmd_deploy(
    settings: &Settings,
    targets: &[String],
    mode: Mode,
    options: PlanOptions,
    json: bool,
) -> DeployResult<ExitCode> {
    settings.validate()?;

    let plan = DeploymentPlan::new(targets, mode, options)?;
    if let Some(path) = &settings.compose_file {
        plan.check_declared(&compose::declared_services(path)?)?;
    }

    if !plan.dry_run() && !cmd::command_exists("ssh") {
        return Err(DeployError::CommandNotFound("ssh".into()));
    }

    let ledger = match &settings.state_file {
        Some(path) => KnownGoodLedger::load(path)?,
        None => KnownGoodLedger::in_memory(),
    };

    let token = CancelToken::new();
    if !plan.dry_run() {
        cancel::install_ctrl_c(token.clone())?;
    }

    let engine = ComposeEngine::new(settings.ssh_session(), &settings.remote_dir)
        .query_retries(settings.query_retries);
    let clock = SystemClock::new();

    tracing::info!(
        host = %settings.host,
        dir = %settings.remote_dir,
        targets = ?plan.targets(),
        %mode,
        dry_run = plan.dry_run(),
        "starting deployment"
    );

    let report = Orchestrator::new(&engine, &clock)
        .health_policy(settings.health)
        .ledger(ledger)
        .cancel_token(token)
        .run(&plan)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render_text());
    }

    Ok(ExitCode::from(report.exit_code()))
}

fn cmd_status(settings: &Settings, targets: &[String]) -> DeployResult<ExitCode> {
    settings.validate()?;
    let plan = DeploymentPlan::new(targets, Mode::PullOnly, PlanOptions::default())?;

    let engine = ComposeEngine::new(settings.ssh_session(), &settings.remote_dir)
        .query_retries(settings.query_retries);

    let width = plan.targets().iter().map(String::len).max().unwrap_or(0);
    let mut all_running = true;

    for name in plan.targets() {
        let status = engine.inspect(name)?;
        all_running &= status.state == ContainerState::Running;
        let image = status.image.map(|i| i.to_string()).unwrap_or_default();
        println!("{name:width$}  {:10}  {image}", status.state.to_string());
    }

    Ok(if all_running {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
