/*!
    Conversions between frame buffers and the `image` crate.
*/

use std::path::Path;

use image::{DynamicImage, ImageBuffer, ImageFormat};

use media_types::{Error, FrameBuffer, PixelFormat, Result};

/**
    Decode a JPEG into a `Gray8` frame for grayscale images, `Rgb24`
    otherwise.
*/
pub fn decode_jpeg(bytes: &[u8]) -> Result<FrameBuffer> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
        .map_err(|e| Error::FailedVideoDecoding(format!("invalid JPEG: {e}")))?;
    image_to_frame(image)
}

/**
    Convert a decoded image, keeping grayscale as `Gray8` and turning
    everything else into `Rgb24`.
*/
pub fn image_to_frame(image: DynamicImage) -> Result<FrameBuffer> {
    let (width, height) = (image.width(), image.height());
    match image {
        DynamicImage::ImageLuma8(gray) => {
            FrameBuffer::from_vec(width, height, PixelFormat::Gray8, width as usize, gray.into_raw())
        }
        other => {
            let rgb = other.into_rgb8();
            FrameBuffer::from_vec(width, height, PixelFormat::Rgb24, width as usize * 3, rgb.into_raw())
        }
    }
}

/**
    Wrap a frame's pixels as an `image` value of the matching layout.

    16-bit formats are read as native-endian samples.
*/
pub fn frame_to_image(frame: &FrameBuffer) -> Result<DynamicImage> {
    let (width, height) = (frame.width(), frame.height());
    let packed = frame.to_packed();
    let mismatch = || Error::InvalidArgument(format!("{frame:?} has an inconsistent layout"));

    let image = match frame.format() {
        PixelFormat::Gray8 => {
            DynamicImage::ImageLuma8(ImageBuffer::from_raw(width, height, packed).ok_or_else(mismatch)?)
        }
        PixelFormat::Rgb24 => {
            DynamicImage::ImageRgb8(ImageBuffer::from_raw(width, height, packed).ok_or_else(mismatch)?)
        }
        PixelFormat::Rgba32 => {
            DynamicImage::ImageRgba8(ImageBuffer::from_raw(width, height, packed).ok_or_else(mismatch)?)
        }
        PixelFormat::Gray16 => DynamicImage::ImageLuma16(
            ImageBuffer::from_raw(width, height, samples_u16(&packed)).ok_or_else(mismatch)?,
        ),
        PixelFormat::Rgb48 => DynamicImage::ImageRgb16(
            ImageBuffer::from_raw(width, height, samples_u16(&packed)).ok_or_else(mismatch)?,
        ),
        PixelFormat::Rgba64 => DynamicImage::ImageRgba16(
            ImageBuffer::from_raw(width, height, samples_u16(&packed)).ok_or_else(mismatch)?,
        ),
    };
    Ok(image)
}

/**
    Save a frame, choosing the encoder from the file extension.

    JPEG output is reduced to 8-bit without alpha first.
*/
pub fn save_frame(frame: &FrameBuffer, path: &Path) -> Result<()> {
    let format = ImageFormat::from_path(path)
        .map_err(|_| Error::InvalidArgument(format!("unsupported image type: {}", path.display())))?;
    let image = frame_to_image(frame)?;
    let image = match (format, frame.format()) {
        (ImageFormat::Jpeg, PixelFormat::Gray8) => image,
        (ImageFormat::Jpeg, PixelFormat::Gray16) => DynamicImage::ImageLuma8(image.to_luma8()),
        (ImageFormat::Jpeg, _) => DynamicImage::ImageRgb8(image.to_rgb8()),
        _ => image,
    };

    image
        .save_with_format(path, format)
        .map_err(|e| Error::IoFailure(format!("{}: {e}", path.display())))
}

fn samples_u16(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
        .collect()
}
