//! `cbfstreamd` — the archiver daemon.
//!
//! Loads a JSON config file, connects to the DCU's push socket, and writes
//! one minicbf per received frame until told to stop. SIGINT or SIGTERM
//! requests a graceful shutdown (the current series is finished first); a
//! second signal terminates immediately.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cbfstream::{CbfSink, Result, SourceConfig, StreamError, Streamer};

#[derive(Parser, Debug)]
#[command(name = "cbfstreamd", version, about = "Archive detector stream series as minicbf files")]
struct Args {
    /// JSON config file
    #[arg(short, long, default_value = "/etc/cbfstream/config.json")]
    config: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                error!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let raw = std::fs::read(&args.config)
        .map_err(|e| StreamError::io(format!("reading {}", args.config.display()), e))?;
    let config: serde_json::Value = serde_json::from_slice(&raw)?;
    if !config.is_object() {
        return Err(StreamError::config(
            "the root of the JSON config file must be an object",
        ));
    }

    let source = SourceConfig::from_json(&config);
    let sink = CbfSink::from_config(&config);
    let mut streamer = Streamer::new(sink, &source)?;

    let handle = streamer.shutdown_handle();
    for signal in [SIGINT, SIGTERM] {
        // Order matters: the conditional shutdown fires only when the flag
        // is already set, making the *second* signal the immediate one.
        signal_hook::flag::register_conditional_shutdown(signal, 1, handle.as_flag())
            .map_err(|e| StreamError::io("registering signal handler", e))?;
        signal_hook::flag::register(signal, handle.as_flag())
            .map_err(|e| StreamError::io("registering signal handler", e))?;
    }

    streamer.run()?;
    info!("done");
    Ok(())
}
