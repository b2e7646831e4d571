use media_types::{Error, FrameBuffer, PixelFormat, Result};

use crate::plugin::ImageProcessingPlugin;
use crate::property::{Configurable, PropertyDescriptor, Value, ValueType};

const PROPERTIES: &[PropertyDescriptor] = &[
    PropertyDescriptor::new("horizontal", ValueType::Bool, "swap left and right"),
    PropertyDescriptor::new("vertical", ValueType::Bool, "swap top and bottom"),
];

/**
    Flips images in place around either or both axes.
*/
#[derive(Clone, Debug)]
pub struct Mirror {
    horizontal: bool,
    vertical: bool,
}

impl Mirror {
    pub fn new() -> Self {
        Self {
            horizontal: true,
            vertical: false,
        }
    }
}

impl Default for Mirror {
    fn default() -> Self {
        Self::new()
    }
}

impl Configurable for Mirror {
    fn properties(&self) -> &'static [PropertyDescriptor] {
        PROPERTIES
    }

    fn get_property(&self, name: &str) -> Result<Value> {
        match name {
            "horizontal" => Ok(self.horizontal.into()),
            "vertical" => Ok(self.vertical.into()),
            _ => Err(Error::InvalidProperty(name.to_string())),
        }
    }

    fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
        let value: bool = self.descriptor(name)?.check(value)?.try_into()?;
        match name {
            "horizontal" => self.horizontal = value,
            "vertical" => self.vertical = value,
            _ => return Err(Error::InvalidProperty(name.to_string())),
        }
        Ok(())
    }
}

impl ImageProcessingPlugin for Mirror {
    fn is_pixel_format_supported(&self, _format: PixelFormat) -> bool {
        true
    }

    fn can_process_in_place(&self) -> bool {
        true
    }

    fn process_in_place(&mut self, image: &mut FrameBuffer) -> Result<()> {
        let pixel_bytes = image.format().bytes_per_pixel();
        let width = image.width() as usize;

        if self.horizontal {
            for y in 0..image.height() {
                let row = image.row_mut(y);
                for x in 0..width / 2 {
                    let mirrored = width - 1 - x;
                    let (left, right) = row.split_at_mut(mirrored * pixel_bytes);
                    left[x * pixel_bytes..(x + 1) * pixel_bytes]
                        .swap_with_slice(&mut right[..pixel_bytes]);
                }
            }
        }

        if self.vertical {
            let stride = image.stride();
            let row_bytes = image.row_bytes();
            let height = image.height() as usize;
            let data = image.data_mut();
            for y in 0..height / 2 {
                let (top, bottom) = data.split_at_mut((height - 1 - y) * stride);
                top[y * stride..y * stride + row_bytes].swap_with_slice(&mut bottom[..row_bytes]);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> FrameBuffer {
        // 3x2 RGB24, each pixel tagged by its index
        let data = (0..6).flat_map(|i| [i, i, i]).collect();
        FrameBuffer::from_vec(3, 2, PixelFormat::Rgb24, 9, data).unwrap()
    }

    fn tags(image: &FrameBuffer) -> Vec<u8> {
        image.to_packed().chunks(3).map(|pixel| pixel[0]).collect()
    }

    #[test]
    fn flips_horizontally_by_default() {
        let mut image = grid();
        Mirror::new().process_in_place(&mut image).unwrap();
        assert_eq!(tags(&image), vec![2, 1, 0, 5, 4, 3]);
    }

    #[test]
    fn flips_vertically() {
        let mut mirror = Mirror::new();
        mirror.set_property("horizontal", Value::Bool(false)).unwrap();
        mirror.set_property("vertical", Value::Bool(true)).unwrap();

        let mut image = grid();
        mirror.process_in_place(&mut image).unwrap();
        assert_eq!(tags(&image), vec![3, 4, 5, 0, 1, 2]);
    }

    #[test]
    fn flips_both_ways_with_padding() {
        let data = vec![1, 2, 0, 3, 4, 0];
        let mut image = FrameBuffer::from_vec(2, 2, PixelFormat::Gray8, 3, data).unwrap();
        let mut mirror = Mirror::new();
        mirror.set_property("vertical", Value::Bool(true)).unwrap();

        mirror.process_in_place(&mut image).unwrap();
        assert_eq!(image.to_packed(), vec![4, 3, 2, 1]);
    }
}
