use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use media_decode::{OpenOptions, probe};

#[derive(Parser, Debug)]
pub struct ProbeCommand {
    /// File path or stream URL
    pub resource: String,

    /// User name for network streams
    #[arg(long)]
    pub user: Option<String>,

    /// Password for network streams
    #[arg(long)]
    pub password: Option<String>,

    /// Bytes FFmpeg may read while detecting the stream
    #[arg(long)]
    pub probe_size: Option<u32>,

    /// Give up on an unresponsive stream after this many seconds
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,
}

impl ProbeCommand {
    fn options(&self) -> OpenOptions {
        let mut options = OpenOptions::new().with_timeout(Duration::from_secs(self.timeout));
        if let Some(user) = &self.user {
            options = options.with_credentials(user, self.password.as_deref().unwrap_or_default());
        }
        if let Some(bytes) = self.probe_size {
            options = options.with_probe_size(bytes);
        }
        options
    }

    pub async fn run(self) -> Result<()> {
        let options = self.options();
        let resource = self.resource.clone();
        let info = tokio::task::spawn_blocking(move || probe(&resource, &options))
            .await?
            .with_context(|| format!("failed to probe {}", self.resource))?;

        println!("Resource:   {}", self.resource);
        println!("Codec:      {} ({})", info.codec_name, info.codec_long_name);
        println!("Frame size: {}x{}", info.width, info.height);
        println!("Frame rate: {} ({:.3} fps)", info.frame_rate, info.fps());
        if info.frames_total > 0 {
            println!("Frames:     {}", info.frames_total);
        } else {
            println!("Frames:     unknown");
        }
        Ok(())
    }
}
