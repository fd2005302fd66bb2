mod app;
mod args;
mod http;
mod logging;

use clap::Parser;
use slog::*;
use std::{process, result::Result, sync::Arc};

#[derive(PartialEq)]
struct ExitSignal(pub &'static str);

async fn listen_for_signals() -> Result<ExitSignal, String> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term_sig = signal(SignalKind::terminate())
            .map_err(|e| format!("could not listen for TERM signals: {}", e))?;
        let mut int_sig = signal(SignalKind::interrupt())
            .map_err(|e| format!("Could not listen for INT signal: {}", e))?;

        let sig_name = tokio::select! {
            Some(_signal) = term_sig.recv() => {
                "SIG_TERM"
            },
            Some(_signal) = int_sig.recv() => {
                "SIG_INT"
            },
        };
        Ok(ExitSignal(sig_name))
    }

    #[cfg(windows)]
    {
        use tokio::signal;
        signal::ctrl_c()
            .await
            .map_err(|e| format!("could not listen for ctrl-c: {}", e))?;
        Ok(ExitSignal("CTRL-C"))
    }
}

async fn run(args: args::Args) -> Result<(), String> {
    let logging = Arc::new(logging::create_logging(&args)?);
    let log = logging.root.new(o!("module" => "main"));

    info!(log, "Starting {}", app::NAME; "version" => app::VERSION);

    let (shutdown_sender, http_receiver) = tokio::sync::broadcast::channel(1);

    let http_log = log.clone();
    let http_logging = logging.clone();
    let addr = args.bind_address();
    let mut http_server = tokio::spawn(async move {
        http::start(&http_log, http_logging, &addr, http_receiver).await
    });

    // We wait for a signal (TERM, INT), unless the HTTP server stops by itself.
    let stopped = tokio::select! {
        signal = listen_for_signals() => {
            info!(log, "Received signal {}, shutting down...", signal?.0);
            None
        },
        result = &mut http_server => Some(result),
    };
    let result = match stopped {
        Some(result) => result,
        None => {
            let _ = shutdown_sender.send(());
            http_server.await
        }
    };
    match result {
        Ok(Err(e)) => error!(log, "HTTP Server error: {}", e),
        Err(e) => error!(log, "HTTP Server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    info!(log, "Exiting...");

    // Ship what is still buffered before the process goes away
    let flush_logging = logging.clone();
    tokio::task::spawn_blocking(move || flush_logging.flush())
        .await
        .map_err(|e| format!("could not flush logs: {}", e))?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = args::Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("\nError: {}", e);
        process::exit(1);
    };
}
