/*!
    Reference-counted frame buffers.
*/

use std::fmt;
use std::sync::Arc;

use crate::{Error, PixelFormat, Result};

/**
    An image in memory: dimensions, pixel format, row stride and bytes.

    The bytes live behind an [`Arc`], so cloning a frame is cheap and the
    clone shares storage with the original. Writing through [`data_mut`]
    or [`row_mut`] copies the storage first if anyone else still holds it,
    so a listener that keeps a frame never sees it change underneath.

    The pixel format and dimensions are fixed for the life of the buffer.

    [`data_mut`]: FrameBuffer::data_mut
    [`row_mut`]: FrameBuffer::row_mut
*/
#[derive(Clone)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    data: Arc<Vec<u8>>,
}

impl FrameBuffer {
    /**
        Allocate a zeroed frame with a tightly packed stride.
    */
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        let stride = packed_row_bytes(width, format)?;
        Self::with_stride(width, height, format, stride)
    }

    /**
        Allocate a zeroed frame with an explicit stride.

        The stride must be at least `width * bytes_per_pixel`.
    */
    pub fn with_stride(width: u32, height: u32, format: PixelFormat, stride: usize) -> Result<Self> {
        let size = validate_layout(width, height, format, stride)?;
        let mut data = Vec::new();
        data.try_reserve_exact(size).map_err(|_| Error::OutOfMemory)?;
        data.resize(size, 0);

        Ok(Self {
            width,
            height,
            stride,
            format,
            data: Arc::new(data),
        })
    }

    /**
        Wrap existing bytes laid out with the given stride.
    */
    pub fn from_vec(
        width: u32,
        height: u32,
        format: PixelFormat,
        stride: usize,
        data: Vec<u8>,
    ) -> Result<Self> {
        let size = validate_layout(width, height, format, stride)?;
        if data.len() < size {
            return Err(Error::ImageIsTooSmall(format!(
                "{} bytes supplied for a {}x{} {} frame with stride {}",
                data.len(),
                width,
                height,
                format,
                stride
            )));
        }

        Ok(Self {
            width,
            height,
            stride,
            format,
            data: Arc::new(data),
        })
    }

    /**
        Make `slot` hold a writable frame of the requested shape.

        The frame already in the slot is reused when its format, width and
        height match and no other handle shares its bytes. Otherwise a new
        zeroed frame replaces it.
    */
    pub fn reuse_or_allocate(
        slot: &mut Option<FrameBuffer>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<&mut FrameBuffer> {
        let frame = match slot.take() {
            Some(frame) if frame.is_compatible(width, height, format) && !frame.is_shared() => {
                frame
            }
            _ => FrameBuffer::new(width, height, format)?,
        };
        Ok(slot.insert(frame))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes between the starts of two consecutive rows.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /**
        Number of meaningful bytes per row, excluding stride padding.
    */
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /**
        Returns true if format, width and height all match.
    */
    pub fn is_compatible(&self, width: u32, height: u32, format: PixelFormat) -> bool {
        self.width == width && self.height == height && self.format == format
    }

    pub fn is_format_compatible(&self, other: &FrameBuffer) -> bool {
        self.is_compatible(other.width, other.height, other.format)
    }

    /**
        Returns true if another handle shares these bytes.
    */
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.data) > 1
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.stride * self.height as usize]
    }

    /**
        Mutable access to the bytes, copying them first if shared.
    */
    pub fn data_mut(&mut self) -> &mut [u8] {
        let len = self.stride * self.height as usize;
        &mut Arc::make_mut(&mut self.data)[..len]
    }

    /**
        The meaningful bytes of row `y`.

        # Panics

        Panics if `y` is not below the frame height.
    */
    pub fn row(&self, y: u32) -> &[u8] {
        assert!(y < self.height, "row {y} out of range");
        let start = y as usize * self.stride;
        &self.data[start..start + self.row_bytes()]
    }

    /**
        Mutable access to the meaningful bytes of row `y`.

        # Panics

        Panics if `y` is not below the frame height.
    */
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        assert!(y < self.height, "row {y} out of range");
        let start = y as usize * self.stride;
        let row_bytes = self.row_bytes();
        &mut Arc::make_mut(&mut self.data)[start..start + row_bytes]
    }

    /**
        Copy the pixels into a new vector without stride padding.
    */
    pub fn to_packed(&self) -> Vec<u8> {
        if self.stride == self.row_bytes() {
            return self.data().to_vec();
        }
        let mut packed = Vec::with_capacity(self.row_bytes() * self.height as usize);
        for y in 0..self.height {
            packed.extend_from_slice(self.row(y));
        }
        packed
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .field("shared", &self.is_shared())
            .finish_non_exhaustive()
    }
}

/**
    Frames are equal when they have the same shape and pixels; stride
    padding is ignored.
*/
impl PartialEq for FrameBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.is_format_compatible(other) && (0..self.height).all(|y| self.row(y) == other.row(y))
    }
}

fn packed_row_bytes(width: u32, format: PixelFormat) -> Result<usize> {
    (width as usize)
        .checked_mul(format.bytes_per_pixel())
        .ok_or_else(|| Error::ImageIsTooBig(format!("{width} pixels per row")))
}

/**
    Check dimensions and stride, returning the number of bytes required.
*/
fn validate_layout(width: u32, height: u32, format: PixelFormat, stride: usize) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidArgument(format!(
            "frame dimensions must be non-zero, got {width}x{height}"
        )));
    }

    let row_bytes = packed_row_bytes(width, format)?;
    if stride < row_bytes {
        return Err(Error::InvalidArgument(format!(
            "stride {stride} is smaller than a {width} pixel {format} row"
        )));
    }

    stride
        .checked_mul(height as usize)
        .filter(|size| *size <= isize::MAX as usize)
        .ok_or_else(|| Error::ImageIsTooBig(format!("{width}x{height} {format}")))
}
