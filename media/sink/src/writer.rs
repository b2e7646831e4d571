/*!
    Video file writer with fragments and a folder budget.
*/

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, info, warn};

use media_types::{Error, FrameBuffer, PixelFormat, Result};

use crate::config::WriterConfig;
use crate::encoder::FileEncoder;
use crate::layout::{enforce_folder_budget, unused_path};

/**
    Writes frames into video files laid out as the configuration asks.

    The first frame of a recording fixes its frame size. When fragments are
    enabled, a new file is started every `fragment_length` worth of frames;
    each time a file is started the folder budget is enforced, never
    touching the new file.

    Frames in `Gray8`, `Rgb24` or `Rgba32` are accepted; the wide formats
    are rejected with `UnsupportedPixelFormat`.
*/
pub struct VideoFileWriter {
    config: WriterConfig,
    current: Option<FileEncoder>,
    frame_size: Option<(u32, u32)>,
    frames_in_fragment: u64,
    frames_written: u64,
    files: Vec<PathBuf>,
}

impl VideoFileWriter {
    /**
        Create a writer, creating the output folder if needed.

        No file is created until the first frame arrives.
    */
    pub fn new(config: WriterConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.folder)?;

        Ok(Self {
            config,
            current: None,
            frame_size: None,
            frames_in_fragment: 0,
            frames_written: 0,
            files: Vec::new(),
        })
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /**
        Path of the file currently being written.
    */
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(FileEncoder::path)
    }

    /**
        Every file this writer has started, in order.
    */
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /**
        Encode one frame, starting a new file first if needed.
    */
    pub fn write(&mut self, frame: &FrameBuffer) -> Result<()> {
        if !matches!(
            frame.format(),
            PixelFormat::Gray8 | PixelFormat::Rgb24 | PixelFormat::Rgba32
        ) {
            return Err(Error::UnsupportedPixelFormat(frame.format()));
        }

        let size = (frame.width(), frame.height());
        match self.frame_size {
            Some(expected) if expected != size => {
                return Err(Error::InvalidArgument(format!(
                    "frame size {}x{} differs from recording size {}x{}",
                    size.0, size.1, expected.0, expected.1
                )));
            }
            Some(_) => {}
            None => self.frame_size = Some(size),
        }

        if let Some(limit) = self.config.frames_per_fragment()
            && self.frames_in_fragment >= limit
        {
            self.finish_fragment()?;
        }

        let encoder = match self.current.take() {
            Some(encoder) => encoder,
            None => self.begin_fragment(size.0, size.1)?,
        };
        let encoder = self.current.insert(encoder);
        encoder.encode(frame)?;

        self.frames_in_fragment += 1;
        self.frames_written += 1;
        Ok(())
    }

    /**
        Finish the current file.

        The writer can be used again afterwards; the next frame starts a new
        recording and may have a different size.
    */
    pub fn finish(&mut self) -> Result<()> {
        self.frame_size = None;
        self.finish_fragment()
    }

    fn begin_fragment(&mut self, width: u32, height: u32) -> Result<FileEncoder> {
        let timestamp = self
            .config
            .timestamp_names
            .then(|| Local::now().naive_local());
        let path = unused_path(
            &self.config.folder,
            &self.config.base_name,
            &self.config.extension,
            timestamp,
        );

        let encoder = FileEncoder::create(&path, &self.config, width, height)?;
        info!(path = %path.display(), width, height, "recording started");
        self.files.push(path.clone());
        self.frames_in_fragment = 0;

        if let Some(budget) = self.config.max_folder_size_mb {
            let removed = enforce_folder_budget(
                &self.config.folder,
                &self.config.base_name,
                &self.config.extension,
                budget,
                Some(&path),
            )?;
            self.files.retain(|file| !removed.contains(file));
        }

        Ok(encoder)
    }

    fn finish_fragment(&mut self) -> Result<()> {
        let Some(encoder) = self.current.take() else {
            return Ok(());
        };
        let path = encoder.path().to_path_buf();
        let frames = encoder.finish()?;
        debug!(path = %path.display(), frames, "recording finished");
        self.frames_in_fragment = 0;
        Ok(())
    }
}

impl Drop for VideoFileWriter {
    fn drop(&mut self) {
        if let Err(e) = self.finish_fragment() {
            warn!(error = %e, "failed to finish recording");
        }
    }
}

impl std::fmt::Debug for VideoFileWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFileWriter")
            .field("config", &self.config)
            .field("current", &self.current_path())
            .field("frames_written", &self.frames_written)
            .finish_non_exhaustive()
    }
}
