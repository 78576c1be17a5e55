//! Purpose: Hold top-level CLI command dispatch for `trajview`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: `inspect` prints one JSON document; errors flow back to `main`.

use super::*;

pub(super) fn dispatch_command(command: Command) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "trajview", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Inspect { path } => {
            let dataset = trajview::api::load(&path)?;
            emit_json(summary_json(&dataset.summary()));
            Ok(RunOutcome::ok())
        }
        Command::Serve(run) => {
            let config = serve_config_from_run_args(run)?;
            serve::validate_config(&config)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config))?;
            Ok(RunOutcome::ok())
        }
    }
}
