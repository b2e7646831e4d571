use std::path::Path;
use std::time::Duration;

use media_sink::{VideoCodec, VideoFileWriter, WriterConfig};
use media_types::{Error, FrameBuffer, PixelFormat, Result};
use tracing::{info, warn};

use crate::plugin::ImageProcessingPlugin;
use crate::property::{Configurable, PropertyDescriptor, Value, ValueType};

const PROPERTIES: &[PropertyDescriptor] = &[
    PropertyDescriptor::new("folder", ValueType::String, "directory to record into"),
    PropertyDescriptor::new("base_name", ValueType::String, "file name without extension"),
    PropertyDescriptor::new("codec", ValueType::String, "mpeg4, h264 or mjpeg"),
    PropertyDescriptor::new("frame_rate", ValueType::U32, "frames per second")
        .with_range(1.0, 1000.0),
    PropertyDescriptor::new("bit_rate", ValueType::U32, "target bits per second")
        .with_range(1.0, u32::MAX as f64),
    PropertyDescriptor::new("timestamp_names", ValueType::Bool, "append the start time to names"),
    PropertyDescriptor::new("fragment_seconds", ValueType::U32, "split files, 0 to disable"),
    PropertyDescriptor::new("max_folder_size_mb", ValueType::U32, "folder budget, 0 for none"),
    PropertyDescriptor::new("frames_written", ValueType::U32, "frames in all files").read_only(),
    PropertyDescriptor::new("current_file", ValueType::String, "file being written").read_only(),
];

/**
    Records the frames passing through a graph into video files.

    The writer is opened on the first frame and finished whenever a
    setting changes, so the next frame starts a new file with the new
    settings.
*/
pub struct Recorder {
    config: WriterConfig,
    fragment_seconds: u32,
    max_folder_size_mb: u32,
    writer: Option<VideoFileWriter>,
    /// Frames from writers already finished.
    frames_finished: u64,
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            config: WriterConfig::new("", "recording"),
            fragment_seconds: 0,
            max_folder_size_mb: 0,
            writer: None,
            frames_finished: 0,
        }
    }

    fn frames_written(&self) -> u64 {
        self.frames_finished + self.writer.as_ref().map_or(0, VideoFileWriter::frames_written)
    }

    fn writer_config(&self) -> WriterConfig {
        let mut config = self.config.clone();
        config.fragment_length =
            (self.fragment_seconds > 0).then(|| Duration::from_secs(self.fragment_seconds as u64));
        config.max_folder_size_mb =
            (self.max_folder_size_mb > 0).then_some(self.max_folder_size_mb as u64);
        config
    }

    fn close_writer(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            self.frames_finished += writer.frames_written();
            if let Err(e) = writer.finish() {
                warn!(error = %e, "failed to finish recording");
            }
        }
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.close_writer();
    }
}

impl Configurable for Recorder {
    fn properties(&self) -> &'static [PropertyDescriptor] {
        PROPERTIES
    }

    fn get_property(&self, name: &str) -> Result<Value> {
        match name {
            "folder" => Ok(self.config.folder.to_string_lossy().into_owned().into()),
            "base_name" => Ok(self.config.base_name.clone().into()),
            "codec" => Ok(self.config.codec.as_str().into()),
            "frame_rate" => Ok(self.config.frame_rate.into()),
            "bit_rate" => Ok(self.config.bit_rate.into()),
            "timestamp_names" => Ok(self.config.timestamp_names.into()),
            "fragment_seconds" => Ok(self.fragment_seconds.into()),
            "max_folder_size_mb" => Ok(self.max_folder_size_mb.into()),
            "frames_written" => Ok(Value::U32(
                u32::try_from(self.frames_written()).unwrap_or(u32::MAX),
            )),
            "current_file" => Ok(self
                .writer
                .as_ref()
                .and_then(VideoFileWriter::current_path)
                .map(Path::to_string_lossy)
                .unwrap_or_default()
                .into_owned()
                .into()),
            _ => Err(Error::InvalidProperty(name.to_string())),
        }
    }

    fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
        let value = self.descriptor(name)?.check(value)?;
        match name {
            "folder" => self.config.folder = String::try_from(value)?.into(),
            "base_name" => self.config.base_name = value.try_into()?,
            "codec" => {
                let codec: VideoCodec = String::try_from(value)?.parse()?;
                self.config = self.config.clone().with_codec(codec);
            }
            "frame_rate" => self.config.frame_rate = value.try_into()?,
            "bit_rate" => self.config.bit_rate = value.try_into()?,
            "timestamp_names" => self.config.timestamp_names = value.try_into()?,
            "fragment_seconds" => self.fragment_seconds = value.try_into()?,
            "max_folder_size_mb" => self.max_folder_size_mb = value.try_into()?,
            _ => return Err(Error::InvalidProperty(name.to_string())),
        }
        self.close_writer();
        Ok(())
    }
}

impl ImageProcessingPlugin for Recorder {
    fn is_pixel_format_supported(&self, format: PixelFormat) -> bool {
        matches!(
            format,
            PixelFormat::Gray8 | PixelFormat::Rgb24 | PixelFormat::Rgba32
        )
    }

    fn is_read_only_mode(&self) -> bool {
        true
    }

    fn observe(&mut self, image: &FrameBuffer) -> Result<()> {
        let writer = match &mut self.writer {
            Some(writer) => writer,
            None => {
                if self.config.folder.as_os_str().is_empty() {
                    return Err(Error::InvalidConfiguration("recording folder is empty".to_string()));
                }
                let writer = VideoFileWriter::new(self.writer_config())?;
                info!(folder = %self.config.folder.display(), "recorder ready");
                self.writer.insert(writer)
            }
        };
        writer.write(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(folder: &Path) -> Recorder {
        let mut recorder = Recorder::new();
        recorder
            .set_property("folder", Value::from(folder.to_str().unwrap()))
            .unwrap();
        recorder.set_property("base_name", Value::from("cam")).unwrap();
        recorder
    }

    fn frame(shade: u8) -> FrameBuffer {
        FrameBuffer::from_vec(32, 32, PixelFormat::Gray8, 32, vec![shade; 32 * 32]).unwrap()
    }

    #[test]
    fn records_into_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut filter = recorder(dir.path());

        for i in 0..5 {
            filter.observe(&frame(i * 40)).unwrap();
        }

        let expected = dir.path().join("cam.mp4");
        assert_eq!(
            filter.get_property("current_file"),
            Ok(Value::from(expected.to_str().unwrap()))
        );
        assert_eq!(filter.get_property("frames_written"), Ok(Value::U32(5)));

        drop(filter);
        assert!(std::fs::metadata(&expected).unwrap().len() > 0);
    }

    #[test]
    fn a_setting_change_starts_a_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut filter = recorder(dir.path());
        filter.observe(&frame(0)).unwrap();

        filter.set_property("base_name", Value::from("other")).unwrap();
        assert_eq!(filter.get_property("current_file"), Ok(Value::from("")));
        filter.observe(&frame(0)).unwrap();

        assert_eq!(filter.get_property("frames_written"), Ok(Value::U32(2)));
        drop(filter);
        assert!(dir.path().join("cam.mp4").exists());
        assert!(dir.path().join("other.mp4").exists());
    }

    #[test]
    fn codec_selects_the_container() {
        let mut filter = Recorder::new();
        filter.set_property("codec", Value::from("mjpeg")).unwrap();
        assert_eq!(filter.get_property("codec"), Ok(Value::from("mjpeg")));
        assert_eq!(filter.writer_config().extension, "avi");
        assert!(matches!(
            filter.set_property("codec", Value::from("vp9")),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn zero_disables_fragments_and_budget() {
        let mut filter = Recorder::new();
        let config = filter.writer_config();
        assert_eq!(config.fragment_length, None);
        assert_eq!(config.max_folder_size_mb, None);

        filter.set_property("fragment_seconds", Value::U32(60)).unwrap();
        filter.set_property("max_folder_size_mb", Value::U32(500)).unwrap();
        let config = filter.writer_config();
        assert_eq!(config.fragment_length, Some(Duration::from_secs(60)));
        assert_eq!(config.max_folder_size_mb, Some(500));
    }

    #[test]
    fn needs_a_folder_and_a_supported_format() {
        let mut filter = Recorder::new();
        assert!(matches!(filter.observe(&frame(0)), Err(Error::InvalidConfiguration(_))));
        assert!(!filter.is_pixel_format_supported(PixelFormat::Gray16));
    }
}
