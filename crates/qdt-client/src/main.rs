//! qdt-client: list or download files from a data-transfer server.

use std::path::Path;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use qdt_client::render::{format_bytes, progress_callback};
use qdt_client::{Cli, CommandOutcome, DataConnection, Pipeline};
use qdt_core::error::{Error, Result};
use qdt_core::init_logging;
use qdt_core::protocol::Command;

fn main() {
    let cli = Cli::parse();

    // -v raises the default level from warn.
    if let Err(e) = init_logging(
        cli.verbose.saturating_add(1),
        cli.log_file.as_deref(),
        cli.log_format(),
    ) {
        eprintln!("qdt-client: failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "qdt-client starting");

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("qdt-client: failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let code = match rt.block_on(run(cli)) {
        Ok(()) => 0,
        Err(e) => {
            if e.is_fatal() {
                error!(error = %e, "Command failed");
            } else {
                warn!(error = %e, "Invalid configuration");
            }
            eprintln!("qdt-client: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<()> {
    let command = cli.protocol_command()?;
    let destination = cli.destination()?;
    let config = cli.connection_config()?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling");
                cancel.cancel();
            }
        }
    });

    let pipeline = Pipeline::new(cli.transfer_options())
        .with_callback(progress_callback(cli.progress))
        .with_cancel(cancel.clone());

    let conn = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        conn = DataConnection::connect(&config) => conn?,
    };
    info!(addr = %conn.remote_addr(), rtt = ?conn.rtt(), "Connected to server");

    let result = execute(&pipeline, &conn, &command, destination.as_deref()).await;
    conn.close().await;
    result
}

async fn execute(
    pipeline: &Pipeline,
    conn: &DataConnection,
    command: &Command,
    destination: Option<&Path>,
) -> Result<()> {
    let cancel = pipeline.cancel_token();
    let (mut send, recv) = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        stream = conn.open_stream() => stream?,
    };

    let Some(path) = destination else {
        let mut stdout = tokio::io::stdout();
        pipeline.execute(command, &mut send, recv, &mut stdout).await?;
        return Ok(());
    };

    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| Error::local_io(format!("creating {}", path.display()), e))?;
    let outcome = pipeline.execute(command, &mut send, recv, &mut file).await;
    drop(file);

    if let CommandOutcome::Downloaded(result) = outcome? {
        info!(
            bytes = result.bytes,
            size = %format_bytes(result.bytes),
            rate = result.average_rate(),
            "Transfer finished"
        );
        eprintln!("download complete: {}", path.display());
    }
    Ok(())
}
