//! `cfgkeeper run`: one backup pass.

use cfgkeeper_core::{open_git_store, BackupOrchestrator, Config};
use cfgkeeper_snapshot::FileSource;
use cfgkeeper_util::log;
use std::process::ExitCode;
use tracing::debug;

/// Run one backup and map the result to a process exit code.
///
/// Fatal errors are logged where they happen; here they only decide the
/// exit code.
pub async fn run_backup(config: Config, verbose: bool) -> anyhow::Result<ExitCode> {
    config.validate()?;
    init_logging(&config, verbose);

    // Opening writes nothing; the repository is created when the run first stages.
    let store = match open_git_store(&config) {
        Ok(store) => store,
        Err(_) => return Ok(ExitCode::FAILURE),
    };
    let source = FileSource::new(&config.source.path);
    let policy = config.commit_failure;

    let mut orchestrator = BackupOrchestrator::new(config, source, store);
    match orchestrator.run().await {
        Ok(outcome) => {
            debug!(state = %outcome.state(), "Backup run finished");
            Ok(ExitCode::from(outcome.exit_code(policy)))
        }
        Err(_) => Ok(ExitCode::FAILURE),
    }
}

/// Console plus monthly log file; console only if the file cannot be opened.
fn init_logging(config: &Config, verbose: bool) {
    let log_config = config.log_config(verbose);
    match log::init(&log_config) {
        Ok(Some(path)) => debug!(path = %path.display(), "Logging to file"),
        Ok(None) => {}
        Err(e) => {
            eprintln!("Warning: Could not open log file: {e}");
            let console_only = log::LogConfig {
                dir: None,
                ..log_config
            };
            if let Err(e) = log::init(&console_only) {
                eprintln!("Warning: Could not initialize logging: {e}");
            }
        }
    }
}
