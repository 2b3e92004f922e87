use std::process::ExitCode;
use std::sync::Arc;

use batchup::interrupt::{listen, EXIT_INTERRUPTED};
use batchup::{Config, Interrupt};
use clap::Parser;
use tracing::Dispatch;

fn main() -> ExitCode {
    let config = Config::parse();
    let dispatch = Dispatch::new(batchup::logging::get_subscriber(config.verbosity()));
    let interrupt = Arc::new(Interrupt::new());

    tracing::dispatcher::with_default(&dispatch, || {
        // Dropping the runtime stops listening, so keep it until the run is over.
        let _listener = match listen(Arc::clone(&interrupt), dispatch.clone()) {
            Ok(runtime) => Some(runtime),
            Err(err) => {
                tracing::error!("failed to start interrupt listener: {}", err);
                None
            }
        };

        match batchup::run(&config, &interrupt) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) if err.is_interrupted() => {
                tracing::warn!("Stopped after interrupt");
                ExitCode::from(EXIT_INTERRUPTED)
            }
            Err(err) => {
                eprintln!("{}", err);
                ExitCode::FAILURE
            }
        }
    })
}
