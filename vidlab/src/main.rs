/*!
    Command line host for the video pipeline.

    Usage:
      vidlab probe rtsp://camera/stream --user admin --password secret
      vidlab play --kind file clip.mp4 --graph negative.json --timing
      vidlab play --kind mjpeg http://camera/video.cgi --duration 30
      vidlab plugins

    Logging follows `RUST_LOG`; `--verbose` raises the default to debug and
    lets FFmpeg print its own diagnostics.
*/

use anyhow::Result;
use clap::Parser;

mod cli;
mod graph_file;
mod telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    telemetry::init(args.verbose);
    args.run().await
}
