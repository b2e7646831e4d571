use media_types::{Error, FrameBuffer, PixelFormat, Result};

use crate::plugin::ImageProcessingPlugin;
use crate::property::{Configurable, PropertyDescriptor, Size, Value, ValueType};

const PROPERTIES: &[PropertyDescriptor] = &[
    PropertyDescriptor::new("width", ValueType::U32, "output width").with_range(1.0, 16384.0),
    PropertyDescriptor::new("height", ValueType::U32, "output height").with_range(1.0, 16384.0),
    PropertyDescriptor::new("size", ValueType::Size, "output size").read_only(),
];

/**
    Nearest-neighbour resize to a fixed output size.
*/
#[derive(Clone, Debug)]
pub struct Resize {
    width: u32,
    height: u32,
    /// Input width the column table was built for.
    columns_for: u32,
    /// Source column of each output column.
    columns: Vec<usize>,
}

impl Resize {
    pub fn new() -> Self {
        Self {
            width: 320,
            height: 240,
            columns_for: 0,
            columns: Vec::new(),
        }
    }
}

impl Default for Resize {
    fn default() -> Self {
        Self::new()
    }
}

impl Configurable for Resize {
    fn properties(&self) -> &'static [PropertyDescriptor] {
        PROPERTIES
    }

    fn get_property(&self, name: &str) -> Result<Value> {
        match name {
            "width" => Ok(self.width.into()),
            "height" => Ok(self.height.into()),
            "size" => Ok(Size {
                width: self.width,
                height: self.height,
            }
            .into()),
            _ => Err(Error::InvalidProperty(name.to_string())),
        }
    }

    fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
        let value = self.descriptor(name)?.check(value)?;
        match name {
            "width" => self.width = value.try_into()?,
            "height" => self.height = value.try_into()?,
            _ => return Err(Error::InvalidProperty(name.to_string())),
        }
        self.columns.clear();
        Ok(())
    }
}

impl ImageProcessingPlugin for Resize {
    fn is_pixel_format_supported(&self, _format: PixelFormat) -> bool {
        true
    }

    fn process_image(&mut self, input: &FrameBuffer, output: &mut Option<FrameBuffer>) -> Result<()> {
        let format = input.format();
        let pixel_bytes = format.bytes_per_pixel();
        let (in_width, in_height) = (input.width() as u64, input.height() as u64);

        if self.columns.len() != self.width as usize || self.columns_for != input.width() {
            self.columns = (0..self.width as u64)
                .map(|x| (x * in_width / self.width as u64) as usize)
                .collect();
            self.columns_for = input.width();
        }

        let output = FrameBuffer::reuse_or_allocate(output, self.width, self.height, format)?;
        for y in 0..self.height {
            let source_y = (y as u64 * in_height / self.height as u64) as u32;
            let source = input.row(source_y);
            let target = output.row_mut(y);
            for (pixel, column) in target.chunks_exact_mut(pixel_bytes).zip(&self.columns) {
                let offset = column * pixel_bytes;
                pixel.copy_from_slice(&source[offset..offset + pixel_bytes]);
            }
        }
        Ok(())
    }
}
