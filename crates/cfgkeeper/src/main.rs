//! cfgkeeper - versioned backups of network device configuration.
//!
//! This is the main entry point for the cfgkeeper CLI.

mod commands;

use cfgkeeper_core::{CommitFailurePolicy, Config, ConfigOverrides};
use cfgkeeper_util::LogLevel;
use clap::{Args, Parser, Subcommand};
use commands::{run_backup, show_config, show_history};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "cfgkeeper")]
#[command(author, version, about = "Versioned backups of network device configuration", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    /// Subcommand (defaults to `run`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct GlobalArgs {
    /// Config file (default: cfgkeeper.jsonc or cfgkeeper.json in the working directory)
    #[arg(long, global = true, env = "CFGKEEPER_CONFIG")]
    config: Option<PathBuf>,

    /// Device configuration export to back up
    #[arg(long, global = true, env = "SOURCE_CONFIG_PATH")]
    source: Option<PathBuf>,

    /// Backup repository directory
    #[arg(long, global = true, env = "BACKUP_REPO_PATH")]
    repo: Option<PathBuf>,

    /// Directory inside the repository holding the backup file
    #[arg(long, global = true, env = "CFGKEEPER_BACKUP_DIR")]
    backup_dir: Option<PathBuf>,

    /// Backup file name
    #[arg(long, global = true, env = "CFGKEEPER_BACKUP_FILE")]
    backup_file: Option<String>,

    /// Remote to push to
    #[arg(long, global = true, env = "CFGKEEPER_REMOTE")]
    remote: Option<String>,

    /// Branch to commit on and push
    #[arg(long, global = true, env = "CFGKEEPER_BRANCH")]
    branch: Option<String>,

    /// Give up on a push after this many milliseconds
    #[arg(long, global = true, env = "CFGKEEPER_PUSH_TIMEOUT_MS")]
    push_timeout_ms: Option<u64>,

    /// What a failed commit does to the exit code: report or fail
    #[arg(long, global = true, env = "CFGKEEPER_COMMIT_FAILURE", value_parser = parse_policy)]
    commit_failure: Option<CommitFailurePolicy>,

    /// Exit non-zero when the commit fails (same as --commit-failure fail)
    #[arg(long, global = true)]
    strict: bool,

    /// Directory for the monthly log file
    #[arg(long, global = true, env = "CFGKEEPER_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Log level: debug, info, warn or error
    #[arg(long, global = true, env = "CFGKEEPER_LOG_LEVEL", value_parser = parse_level)]
    log_level: Option<LogLevel>,

    /// Log to stdout only
    #[arg(long, global = true)]
    no_log_file: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

impl GlobalArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            source_path: self.source.clone(),
            repository_path: self.repo.clone(),
            backup_dir: self.backup_dir.clone(),
            backup_filename: self.backup_file.clone(),
            remote_name: self.remote.clone(),
            branch: self.branch.clone(),
            push_timeout_ms: self.push_timeout_ms,
            commit_failure: if self.strict {
                Some(CommitFailurePolicy::Fail)
            } else {
                self.commit_failure
            },
            log_dir: self.log_dir.clone(),
            log_level: self.log_level,
            log_file: self.no_log_file.then_some(false),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Back up the device configuration once
    Run,
    /// List recorded backups, newest first
    History {
        /// Maximum number of versions to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Show the resolved configuration
    Config,
    /// Print version information
    Version,
}

fn parse_policy(s: &str) -> Result<CommitFailurePolicy, String> {
    CommitFailurePolicy::parse(s).ok_or_else(|| format!("unknown policy '{s}' (expected report or fail)"))
}

fn parse_level(s: &str) -> Result<LogLevel, String> {
    LogLevel::parse(s).ok_or_else(|| format!("unknown log level '{s}'"))
}

/// How long a finished run waits for leftover blocking work before exiting.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

fn main() -> ExitCode {
    // .env must be loaded before clap reads the environment.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let code = match runtime.block_on(dispatch(cli)) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    };
    // A push abandoned after its timeout may still hold a blocking thread.
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    code
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Version => {
            print_version();
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run => {
            let (config, _) = load_config(&cli.global).await?;
            run_backup(config, cli.global.verbose).await
        }
        Commands::History { limit } => {
            let (config, _) = load_config(&cli.global).await?;
            show_history(&config, limit).await
        }
        Commands::Config => {
            let (config, config_file) = load_config(&cli.global).await?;
            show_config(&config, config_file.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Resolve the configuration: file, then environment and flags.
async fn load_config(global: &GlobalArgs) -> anyhow::Result<(Config, Option<PathBuf>)> {
    let cwd = std::env::current_dir()?;
    let (config, config_file) = Config::load(global.config.as_deref(), &cwd).await?;
    Ok((config.apply(global.overrides()), config_file))
}

/// Print version information.
fn print_version() {
    println!("cfgkeeper {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Versioned backups of network device configuration.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn strict_overrides_policy() {
        let cli = Cli::parse_from(["cfgkeeper", "--commit-failure", "report", "--strict"]);
        assert_eq!(
            cli.global.overrides().commit_failure,
            Some(CommitFailurePolicy::Fail)
        );
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let cli = Cli::parse_from(["cfgkeeper", "history", "--repo", "/srv/backups", "-l", "5"]);
        assert_eq!(cli.global.repo, Some(PathBuf::from("/srv/backups")));
        assert!(matches!(cli.command, Some(Commands::History { limit: 5 })));
    }

    #[test]
    fn no_log_file_disables_file_logging() {
        let cli = Cli::parse_from(["cfgkeeper", "--no-log-file"]);
        let overrides = cli.global.overrides();
        assert_eq!(overrides.log_file, Some(false));
        assert!(cli.command.is_none());
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!(Cli::try_parse_from(["cfgkeeper", "--commit-failure", "ignore"]).is_err());
    }
}
