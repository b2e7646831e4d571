use media_types::{Error, FrameBuffer, PixelFormat, Result};

use crate::plugin::ImageProcessingPlugin;
use crate::property::{Configurable, PropertyDescriptor, Value, ValueType};

const PROPERTIES: &[PropertyDescriptor] = &[
    PropertyDescriptor::new("red", ValueType::F64, "weight of the red channel").with_range(0.0, 1.0),
    PropertyDescriptor::new("green", ValueType::F64, "weight of the green channel")
        .with_range(0.0, 1.0),
    PropertyDescriptor::new("blue", ValueType::F64, "weight of the blue channel").with_range(0.0, 1.0),
];

/**
    Weighted sum of the color channels into an 8-bit gray image.

    Defaults to the BT.709 weights.
*/
#[derive(Clone, Debug)]
pub struct Grayscale {
    red: f64,
    green: f64,
    blue: f64,
}

impl Grayscale {
    pub fn new() -> Self {
        Self {
            red: 0.2125,
            green: 0.7154,
            blue: 0.0721,
        }
    }

    fn gray(&self, pixel: &[u8]) -> u8 {
        let value =
            self.red * pixel[0] as f64 + self.green * pixel[1] as f64 + self.blue * pixel[2] as f64;
        value.round().clamp(0.0, 255.0) as u8
    }
}

impl Default for Grayscale {
    fn default() -> Self {
        Self::new()
    }
}

impl Configurable for Grayscale {
    fn properties(&self) -> &'static [PropertyDescriptor] {
        PROPERTIES
    }

    fn get_property(&self, name: &str) -> Result<Value> {
        match name {
            "red" => Ok(self.red.into()),
            "green" => Ok(self.green.into()),
            "blue" => Ok(self.blue.into()),
            _ => Err(Error::InvalidProperty(name.to_string())),
        }
    }

    fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
        let value: f64 = self.descriptor(name)?.check(value)?.try_into()?;
        match name {
            "red" => self.red = value,
            "green" => self.green = value,
            "blue" => self.blue = value,
            _ => return Err(Error::InvalidProperty(name.to_string())),
        }
        Ok(())
    }
}

impl ImageProcessingPlugin for Grayscale {
    fn is_pixel_format_supported(&self, format: PixelFormat) -> bool {
        matches!(format, PixelFormat::Rgb24 | PixelFormat::Rgba32)
    }

    fn output_pixel_format(&self, _input: PixelFormat) -> PixelFormat {
        PixelFormat::Gray8
    }

    fn process_image(&mut self, input: &FrameBuffer, output: &mut Option<FrameBuffer>) -> Result<()> {
        let channels = input.format().channels();
        let output =
            FrameBuffer::reuse_or_allocate(output, input.width(), input.height(), PixelFormat::Gray8)?;

        for y in 0..input.height() {
            let source = input.row(y);
            let target = output.row_mut(y);
            for (gray, pixel) in target.iter_mut().zip(source.chunks_exact(channels)) {
                *gray = self.gray(pixel);
            }
        }
        Ok(())
    }
}
