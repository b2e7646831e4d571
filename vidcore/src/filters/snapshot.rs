use std::fs;
use std::path::PathBuf;

use media_types::{Error, FrameBuffer, PixelFormat, Result};
use tracing::debug;

use crate::imaging;
use crate::plugin::ImageProcessingPlugin;
use crate::property::{Configurable, PropertyDescriptor, Value, ValueType};

const PROPERTIES: &[PropertyDescriptor] = &[
    PropertyDescriptor::new("folder", ValueType::String, "directory to save into"),
    PropertyDescriptor::new("prefix", ValueType::String, "file name prefix"),
    PropertyDescriptor::new("every_n", ValueType::U32, "save one frame out of n")
        .with_range(1.0, u32::MAX as f64),
    PropertyDescriptor::new("format", ValueType::String, "png or jpg"),
    PropertyDescriptor::new("saved", ValueType::U32, "number of files written").read_only(),
];

/**
    Saves every n-th frame as an image file named `{prefix}-{index:06}.{format}`.
*/
#[derive(Clone, Debug)]
pub struct Snapshot {
    folder: String,
    prefix: String,
    every_n: u32,
    format: String,
    seen: u64,
    saved: u32,
}

impl Snapshot {
    pub fn new() -> Self {
        Self {
            folder: String::new(),
            prefix: "snapshot".to_string(),
            every_n: 1,
            format: "png".to_string(),
            seen: 0,
            saved: 0,
        }
    }

    fn next_path(&self) -> Result<PathBuf> {
        if self.folder.trim().is_empty() {
            return Err(Error::InvalidConfiguration("snapshot folder is empty".to_string()));
        }
        let name = format!("{}-{:06}.{}", self.prefix, self.saved, self.format);
        Ok(PathBuf::from(&self.folder).join(name))
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl Configurable for Snapshot {
    fn properties(&self) -> &'static [PropertyDescriptor] {
        PROPERTIES
    }

    fn get_property(&self, name: &str) -> Result<Value> {
        match name {
            "folder" => Ok(self.folder.clone().into()),
            "prefix" => Ok(self.prefix.clone().into()),
            "every_n" => Ok(self.every_n.into()),
            "format" => Ok(self.format.clone().into()),
            "saved" => Ok(self.saved.into()),
            _ => Err(Error::InvalidProperty(name.to_string())),
        }
    }

    fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
        let value = self.descriptor(name)?.check(value)?;
        match name {
            "folder" => self.folder = value.try_into()?,
            "prefix" => self.prefix = value.try_into()?,
            "every_n" => self.every_n = value.try_into()?,
            "format" => {
                let format: String = value.try_into()?;
                self.format = match format.to_ascii_lowercase().as_str() {
                    "png" => "png".to_string(),
                    "jpg" | "jpeg" => "jpg".to_string(),
                    other => {
                        return Err(Error::InvalidArgument(format!(
                            "snapshot format must be png or jpg, got '{other}'"
                        )));
                    }
                };
            }
            _ => return Err(Error::InvalidProperty(name.to_string())),
        }
        Ok(())
    }
}

impl ImageProcessingPlugin for Snapshot {
    fn is_pixel_format_supported(&self, _format: PixelFormat) -> bool {
        true
    }

    fn is_read_only_mode(&self) -> bool {
        true
    }

    fn observe(&mut self, image: &FrameBuffer) -> Result<()> {
        let due = self.seen % self.every_n as u64 == 0;
        self.seen += 1;
        if !due {
            return Ok(());
        }

        let path = self.next_path()?;
        fs::create_dir_all(&self.folder)?;
        imaging::save_frame(image, &path)?;
        debug!(path = %path.display(), "snapshot saved");
        self.saved += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(folder: &std::path::Path, every_n: u32) -> Snapshot {
        let mut snapshot = Snapshot::new();
        snapshot
            .set_property("folder", Value::from(folder.to_str().unwrap()))
            .unwrap();
        snapshot.set_property("every_n", Value::U32(every_n)).unwrap();
        snapshot
    }

    #[test]
    fn saves_every_nth_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut filter = snapshot(dir.path(), 2);
        let frame = FrameBuffer::new(4, 4, PixelFormat::Rgb24).unwrap();

        for _ in 0..5 {
            filter.observe(&frame).unwrap();
        }

        assert_eq!(filter.get_property("saved"), Ok(Value::U32(3)));
        assert!(dir.path().join("snapshot-000000.png").exists());
        assert!(dir.path().join("snapshot-000002.png").exists());
        assert!(!dir.path().join("snapshot-000003.png").exists());
    }

    #[test]
    fn writes_jpeg_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let mut filter = snapshot(dir.path(), 1);
        filter.set_property("format", Value::from("JPEG")).unwrap();
        filter.set_property("prefix", Value::from("cam")).unwrap();

        let frame = FrameBuffer::new(8, 8, PixelFormat::Gray8).unwrap();
        filter.observe(&frame).unwrap();

        let written = dir.path().join("cam-000000.jpg");
        assert_eq!(image::open(written).unwrap().width(), 8);
    }

    #[test]
    fn needs_a_folder() {
        let mut filter = Snapshot::new();
        let frame = FrameBuffer::new(1, 1, PixelFormat::Gray8).unwrap();
        assert!(matches!(filter.observe(&frame), Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn rejects_unknown_formats_and_zero_interval() {
        let mut filter = Snapshot::new();
        assert!(matches!(
            filter.set_property("format", Value::from("bmp")),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            filter.set_property("every_n", Value::U32(0)),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(
            filter.set_property("saved", Value::U32(1)),
            Err(Error::ReadOnlyProperty("saved".to_string()))
        );
    }
}
