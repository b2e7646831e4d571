use media_types::{Error, FrameBuffer, PixelFormat, Result};

use crate::plugin::ImageProcessingPlugin;
use crate::property::{Configurable, PropertyDescriptor, Value};

/**
    Inverts color channels in place. Alpha is left alone.
*/
#[derive(Clone, Debug, Default)]
pub struct Invert;

impl Invert {
    pub fn new() -> Self {
        Self
    }
}

impl Configurable for Invert {
    fn properties(&self) -> &'static [PropertyDescriptor] {
        &[]
    }

    fn get_property(&self, name: &str) -> Result<Value> {
        Err(Error::InvalidProperty(name.to_string()))
    }

    fn set_property(&mut self, name: &str, _value: Value) -> Result<()> {
        Err(Error::InvalidProperty(name.to_string()))
    }
}

impl ImageProcessingPlugin for Invert {
    fn is_pixel_format_supported(&self, _format: PixelFormat) -> bool {
        true
    }

    fn can_process_in_place(&self) -> bool {
        true
    }

    fn process_in_place(&mut self, image: &mut FrameBuffer) -> Result<()> {
        let format = image.format();
        let pixel_bytes = format.bytes_per_pixel();
        let sample_bytes = pixel_bytes / format.channels();
        let color_bytes = if format.has_alpha() {
            pixel_bytes - sample_bytes
        } else {
            pixel_bytes
        };

        // Inverting both bytes of a 16-bit sample inverts the sample
        for y in 0..image.height() {
            for pixel in image.row_mut(y).chunks_exact_mut(pixel_bytes) {
                for byte in &mut pixel[..color_bytes] {
                    *byte = !*byte;
                }
            }
        }
        Ok(())
    }
}
