use anyhow::Result;
use clap::{Parser, Subcommand};

mod play;
mod plugins;
mod probe;

pub use play::PlayCommand;
pub use plugins::PluginsCommand;
pub use probe::ProbeCommand;

#[derive(Parser, Debug)]
#[command(name = "vidlab")]
#[command(about = "Acquire, process and record video from files, streams and cameras")]
pub struct Args {
    /// Debug logging and FFmpeg diagnostics
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open a resource and print its video stream parameters
    Probe(ProbeCommand),
    /// Run a source, optionally through a processing graph
    Play(PlayCommand),
    /// List the available processing plugins (default)
    Plugins(PluginsCommand),
}

impl Args {
    pub async fn run(self) -> Result<()> {
        let command = self
            .command
            .unwrap_or(Command::Plugins(PluginsCommand::default()));

        match command {
            Command::Probe(cmd) => cmd.run().await,
            Command::Play(cmd) => cmd.run().await,
            Command::Plugins(cmd) => cmd.run().await,
        }
    }
}
