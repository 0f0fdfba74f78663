//! service-bootstrap
//!
//! Loads configuration, initializes singletons, serves HTTP and runs
//! periodic tasks until SIGTERM/SIGINT, then shuts down within the
//! configured deadline.
//!
//! Exit codes: 0 success, 2 configuration, 3 singleton initialization,
//! 4 schedule, 5 listener, 1 anything else.

use std::process::ExitCode;

use clap::Parser;

use service_bootstrap::cli::{self, Cli};
use service_bootstrap::console;
use service_bootstrap::lifecycle::{
    block_on_then_release, spawn_signal_listener, Bootstrap, LifecycleError, Orchestrator, Shutdown,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.version {
        println!("{}", cli::version_string());
        return ExitCode::SUCCESS;
    }

    match block_on_then_release(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            console::print_fatal(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ExitCode {
    let orchestrator = Orchestrator::new();
    let app = match orchestrator.initialize(Bootstrap::new(cli.startup_options())) {
        Ok(app) => app,
        Err(e) => return fail(&e),
    };

    let shutdown = Shutdown::new();
    if let Err(e) = spawn_signal_listener(shutdown.clone()) {
        tracing::error!(error = %e, "Failed to install signal handlers");
        console::print_fatal(&e);
        return ExitCode::FAILURE;
    }

    match orchestrator.run(app, shutdown).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn fail(error: &LifecycleError) -> ExitCode {
    console::print_fatal(error);
    ExitCode::from(error.exit_code())
}
