use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::sync::Notify;
use tracing::{info, warn};

use vidcore::source::{
    FileConfig, FileVideoSource, HttpConfig, JpegConfig, JpegVideoSource, MjpegVideoSource,
    NetworkConfig, NetworkVideoSource,
};
use vidcore::{AutomationServer, Error, FrameBuffer, SharedGraph, VideoSource, VideoSourceListener};

use crate::graph_file::GraphFile;

const SOURCE_NAME: &str = "input";

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    /// Local video file
    File,
    /// RTSP, RTMP or HTTP stream decoded by FFmpeg
    Stream,
    /// JPEG snapshots polled over HTTP
    Jpeg,
    /// Multipart MJPEG over HTTP
    Mjpeg,
}

#[derive(Parser, Debug)]
pub struct PlayCommand {
    /// File path or URL
    pub resource: String,

    /// How to read the resource
    #[arg(long, value_enum, default_value_t = SourceKind::File)]
    pub kind: SourceKind,

    /// User name for streams and cameras
    #[arg(long)]
    pub user: Option<String>,

    /// Password for streams and cameras
    #[arg(long)]
    pub password: Option<String>,

    /// Send credentials without waiting for a challenge (HTTP cameras)
    #[arg(long)]
    pub force_basic_auth: bool,

    /// Delay between JPEG snapshots
    #[arg(long, default_value_t = 0)]
    pub interval_ms: u64,

    /// Processing graph to run every frame through (JSON)
    #[arg(long)]
    pub graph: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long)]
    pub frames: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,

    /// Collect and print per-step timing
    #[arg(long)]
    pub timing: bool,

    /// Play files at their native frame rate instead of as fast as possible
    #[arg(long)]
    pub pace: bool,
}

/**
    Counts frames and errors, and wakes the command when the frame limit is
    reached.
*/
struct Progress {
    frames: AtomicU64,
    errors: AtomicU64,
    limit: Option<u64>,
    done: Notify,
}

impl VideoSourceListener for Progress {
    fn on_new_image(&self, _image: &FrameBuffer) {
        let frames = self.frames.fetch_add(1, Ordering::SeqCst) + 1;
        if self.limit == Some(frames) {
            self.done.notify_one();
        }
    }

    fn on_error(&self, error: &Error) {
        if error.is_end_of_stream() {
            return;
        }
        self.errors.fetch_add(1, Ordering::SeqCst);
        warn!(%error, "source reported an error");
    }
}

impl PlayCommand {
    fn http_config(&self) -> HttpConfig {
        let mut config = HttpConfig::new(&self.resource).with_force_basic_auth(self.force_basic_auth);
        if let Some(user) = &self.user {
            config = config.with_credentials(user, self.password.as_deref().unwrap_or_default());
        }
        config
    }

    fn build_source(&self) -> Arc<dyn VideoSource> {
        match self.kind {
            SourceKind::File => Arc::new(FileVideoSource::new(
                SOURCE_NAME,
                FileConfig::new(&self.resource).with_pace(self.pace),
            )),
            SourceKind::Stream => {
                let mut config = NetworkConfig::new(&self.resource);
                if let Some(user) = &self.user {
                    config = config.with_credentials(user, self.password.as_deref().unwrap_or_default());
                }
                Arc::new(NetworkVideoSource::new(SOURCE_NAME, config))
            }
            SourceKind::Jpeg => Arc::new(JpegVideoSource::new(
                SOURCE_NAME,
                JpegConfig::new(self.http_config())
                    .with_frame_interval(Duration::from_millis(self.interval_ms)),
            )),
            SourceKind::Mjpeg => Arc::new(MjpegVideoSource::new(SOURCE_NAME, self.http_config())),
        }
    }

    fn load_graph(&self, server: &AutomationServer) -> Result<Option<SharedGraph>> {
        let Some(path) = &self.graph else {
            return Ok(None);
        };
        let file = GraphFile::load(path)?;
        let mut graph = file.build("main", server.plugins().clone())?;
        if self.timing {
            graph.set_timing_enabled(true);
        }
        info!(steps = graph.len(), path = %path.display(), "graph loaded");
        Ok(Some(server.add_graph(graph)?))
    }

    pub async fn run(self) -> Result<()> {
        let server = Arc::new(AutomationServer::with_builtin_plugins());
        server.add_source(self.build_source())?;

        let graph = self.load_graph(&server)?;
        if graph.is_some() {
            server.attach_graph(SOURCE_NAME, "main")?;
        }

        let progress = Arc::new(Progress {
            frames: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            limit: self.frames,
            done: Notify::new(),
        });
        server.add_listener(SOURCE_NAME, progress.clone())?;

        {
            let server = server.clone();
            tokio::task::spawn_blocking(move || server.start_source(SOURCE_NAME))
                .await?
                .with_context(|| format!("failed to start {}", self.resource))?;
        }
        println!("Playing {} ({:?})", self.resource, self.kind);

        let started = Instant::now();
        let deadline = self.duration.map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.tick().await;

        let reason = loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break "interrupted",
                _ = progress.done.notified() => break "frame limit reached",
                _ = sleep_until(deadline) => break "duration elapsed",
                _ = ticker.tick() => {
                    let frames = progress.frames.load(Ordering::SeqCst);
                    let elapsed = started.elapsed().as_secs_f64();
                    println!(
                        "  {frames} frames, {:.1} fps, {} errors",
                        frames as f64 / elapsed,
                        progress.errors.load(Ordering::SeqCst)
                    );
                    let running = server.source(SOURCE_NAME).is_some_and(|source| source.is_running());
                    if !running {
                        break "source finished";
                    }
                }
            }
        };

        {
            let server = server.clone();
            tokio::task::spawn_blocking(move || server.shutdown()).await?;
        }

        let frames = progress.frames.load(Ordering::SeqCst);
        println!();
        println!("Stopped: {reason}");
        println!("  Frames:  {frames}");
        println!("  Errors:  {}", progress.errors.load(Ordering::SeqCst));
        println!("  Elapsed: {:.1}s", started.elapsed().as_secs_f64());
        if let Some(error) = server.last_error(SOURCE_NAME)?
            && !error.is_end_of_stream()
        {
            println!("  Last error: {error}");
        }

        if let Some(graph) = graph {
            print_timing(&graph);
        }
        Ok(())
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn print_timing(graph: &SharedGraph) {
    let graph = graph.lock();
    if !graph.timing_enabled() {
        return;
    }

    println!();
    println!("Step timing ({} frames through the graph):", graph.frames_processed());
    for timing in graph.timing() {
        println!(
            "  {:<20} {:>8} calls  {:>10.3} ms avg  {:>10.1} ms total",
            timing.name,
            timing.calls,
            timing.average().as_secs_f64() * 1000.0,
            timing.total.as_secs_f64() * 1000.0
        );
    }
}
