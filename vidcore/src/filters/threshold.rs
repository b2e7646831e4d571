use media_types::{Error, FrameBuffer, PixelFormat, Result};

use crate::plugin::ImageProcessingPlugin;
use crate::property::{Configurable, PropertyDescriptor, Value, ValueType};

const PROPERTIES: &[PropertyDescriptor] = &[PropertyDescriptor::new(
    "threshold",
    ValueType::U8,
    "pixels at or above become white",
)];

/**
    Binarizes 8-bit gray images in place.
*/
#[derive(Clone, Debug)]
pub struct Threshold {
    threshold: u8,
}

impl Threshold {
    pub fn new() -> Self {
        Self { threshold: 128 }
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self::new()
    }
}

impl Configurable for Threshold {
    fn properties(&self) -> &'static [PropertyDescriptor] {
        PROPERTIES
    }

    fn get_property(&self, name: &str) -> Result<Value> {
        match name {
            "threshold" => Ok(self.threshold.into()),
            _ => Err(Error::InvalidProperty(name.to_string())),
        }
    }

    fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
        let value = self.descriptor(name)?.check(value)?;
        self.threshold = value.try_into()?;
        Ok(())
    }
}

impl ImageProcessingPlugin for Threshold {
    fn is_pixel_format_supported(&self, format: PixelFormat) -> bool {
        format == PixelFormat::Gray8
    }

    fn can_process_in_place(&self) -> bool {
        true
    }

    fn process_in_place(&mut self, image: &mut FrameBuffer) -> Result<()> {
        for y in 0..image.height() {
            for value in image.row_mut(y) {
                *value = if *value >= self.threshold { 255 } else { 0 };
            }
        }
        Ok(())
    }
}
