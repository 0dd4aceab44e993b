mod api;
mod cli;
mod coordinator;
mod editor;
mod error;
mod gate;
mod lifecycle;
mod logging;
mod model;
mod notify;
mod orchestrator;
mod query;
mod render;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_scripted = args.is_scripted();

    match cli::run(args).await {
        Ok(()) => {
            // Blocking stdin readers may still be parked; don't wait for them.
            if is_scripted {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => {
            if is_scripted {
                eprintln!("Error: {e:#}");
                std::process::exit(1);
            }
            Err(e)
        }
    }
}
