/*!
    Encoding frame buffers into one container file.
*/

use std::path::{Path, PathBuf};

use ffmpeg_next::{
    Dictionary, Packet, Rational as FFmpegRational,
    codec::{self, Id as CodecIdFFmpeg, encoder::Video as VideoEncoderFFmpeg},
    format::{self, Pixel, context::Output as OutputContext},
    software::scaling::{context::Context as ScalerContext, flag::Flags as ScalerFlags},
    util::{
        error::{EAGAIN, ENOMEM},
        frame::video::Video as VideoFrameFFmpeg,
    },
};

use media_types::{Error, FrameBuffer, PixelFormat, Result};

use crate::config::{VideoCodec, WriterConfig};

/**
    One open output file with its encoder.

    Frames are converted from the buffer's pixel format to the codec's
    planar YUV format, encoded and muxed with timestamps derived from the
    configured frame rate. [`finish`] must be called to write the trailer.

    [`finish`]: FileEncoder::finish
*/
pub(crate) struct FileEncoder {
    path: PathBuf,
    output: OutputContext,
    encoder: VideoEncoderFFmpeg,
    /// Converter and the input format it was built for.
    scaler: Option<(ScalerContext, Pixel)>,
    stream_index: usize,
    target_format: Pixel,
    encoder_time_base: FFmpegRational,
    stream_time_base: FFmpegRational,
    frame_index: i64,
}

impl FileEncoder {
    /**
        Create the file and write its header.
    */
    pub fn create(path: &Path, config: &WriterConfig, width: u32, height: u32) -> Result<Self> {
        ffmpeg_next::init().map_err(|e| Error::CodecInitFailure(e.to_string()))?;

        let mut output = format::output(path).map_err(|e| match e {
            ffmpeg_next::Error::MuxerNotFound => {
                Error::UnknownFormat(format!("no muxer for '{}'", path.display()))
            }
            _ => Error::IoFailure(format!("{}: {e}", path.display())),
        })?;
        let global_header = output
            .format()
            .flags()
            .contains(format::flag::Flags::GLOBAL_HEADER);

        // Find the codec
        let codec = ffmpeg_next::encoder::find(codec_id_to_ffmpeg(config.codec))
            .ok_or_else(|| Error::CodecNotFound(config.codec.as_str().to_string()))?;

        let frame_rate = FFmpegRational::new(config.frame_rate as i32, 1);
        // Time base is inverse of frame rate for video
        let encoder_time_base = FFmpegRational::new(1, config.frame_rate as i32);
        let target_format = target_pixel_format(config.codec);

        let mut encoder = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(init_error)?;
        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(target_format);
        encoder.set_frame_rate(Some(frame_rate));
        encoder.set_time_base(encoder_time_base);
        encoder.set_bit_rate(config.bit_rate as usize);
        // Keyframe every 2 seconds
        encoder.set_gop(config.frame_rate.saturating_mul(2));
        if global_header {
            encoder.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let mut options = Dictionary::new();
        if config.codec == VideoCodec::H264 {
            options.set("preset", "veryfast");
        }
        let encoder = encoder.open_with(options).map_err(init_error)?;

        let stream_index = {
            let mut stream = output.add_stream(codec).map_err(init_error)?;
            stream.set_time_base(encoder_time_base);
            stream.set_parameters(&encoder);
            stream.index()
        };

        output
            .write_header()
            .map_err(|e| Error::IoFailure(format!("{}: {e}", path.display())))?;

        // The muxer may pick its own stream time base while writing the header
        let stream_time_base = output
            .stream(stream_index)
            .map(|stream| stream.time_base())
            .unwrap_or(encoder_time_base);

        Ok(Self {
            path: path.to_path_buf(),
            output,
            encoder,
            scaler: None,
            stream_index,
            target_format,
            encoder_time_base,
            stream_time_base,
            frame_index: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /**
        Convert and encode one frame.
    */
    pub fn encode(&mut self, frame: &FrameBuffer) -> Result<()> {
        let (width, height) = (frame.width(), frame.height());
        if width != self.encoder.width() || height != self.encoder.height() {
            return Err(Error::InvalidArgument(format!(
                "frame dimensions {}x{} don't match encoder {}x{}",
                width,
                height,
                self.encoder.width(),
                self.encoder.height()
            )));
        }

        let input_format = pixel_format_to_ffmpeg(frame.format())?;
        let mut source = VideoFrameFFmpeg::new(input_format, width, height);
        copy_rows(frame, &mut source);

        // Rebuild the converter if the input format changed
        let scaler = match self.scaler.take() {
            Some((scaler, format)) if format == input_format => scaler,
            _ => ScalerContext::get(
                input_format,
                width,
                height,
                self.target_format,
                width,
                height,
                ScalerFlags::BILINEAR,
            )
            .map_err(init_error)?,
        };
        let (scaler, _) = self.scaler.insert((scaler, input_format));

        // A fresh target each time: the encoder may still reference the last one
        let mut target = VideoFrameFFmpeg::empty();
        scaler.run(&source, &mut target).map_err(encode_error)?;
        target.set_pts(Some(self.frame_index));
        self.frame_index += 1;

        self.encoder.send_frame(&target).map_err(encode_error)?;
        self.write_packets()
    }

    /**
        Flush the encoder and write the container trailer.
    */
    pub fn finish(mut self) -> Result<u64> {
        self.encoder.send_eof().map_err(encode_error)?;
        self.write_packets()?;
        self.output
            .write_trailer()
            .map_err(|e| Error::IoFailure(format!("{}: {e}", self.path.display())))?;
        Ok(self.frame_index as u64)
    }

    /**
        Mux every packet the encoder has ready.
    */
    fn write_packets(&mut self) -> Result<()> {
        let mut packet = Packet::empty();
        loop {
            match self.encoder.receive_packet(&mut packet) {
                Ok(()) => {
                    packet.set_stream(self.stream_index);
                    packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
                    packet
                        .write_interleaved(&mut self.output)
                        .map_err(|e| Error::IoFailure(format!("{}: {e}", self.path.display())))?;
                }
                Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => return Ok(()),
                Err(ffmpeg_next::Error::Eof) => return Ok(()),
                Err(e) => return Err(encode_error(e)),
            }
        }
    }
}

fn init_error(e: ffmpeg_next::Error) -> Error {
    match e {
        ffmpeg_next::Error::Other { errno } if errno == ENOMEM => Error::OutOfMemory,
        _ => Error::CodecInitFailure(e.to_string()),
    }
}

fn encode_error(e: ffmpeg_next::Error) -> Error {
    match e {
        ffmpeg_next::Error::Other { errno } if errno == ENOMEM => Error::OutOfMemory,
        _ => Error::IoFailure(format!("encoding failed: {e}")),
    }
}

fn codec_id_to_ffmpeg(codec: VideoCodec) -> CodecIdFFmpeg {
    match codec {
        VideoCodec::Mpeg4 => CodecIdFFmpeg::MPEG4,
        VideoCodec::H264 => CodecIdFFmpeg::H264,
        VideoCodec::Mjpeg => CodecIdFFmpeg::MJPEG,
    }
}

fn target_pixel_format(codec: VideoCodec) -> Pixel {
    match codec {
        // Full-range YUV for JPEG
        VideoCodec::Mjpeg => Pixel::YUVJ420P,
        VideoCodec::Mpeg4 | VideoCodec::H264 => Pixel::YUV420P,
    }
}

/**
    Convert our PixelFormat to FFmpeg's Pixel format.
*/
pub(crate) fn pixel_format_to_ffmpeg(format: PixelFormat) -> Result<Pixel> {
    match format {
        PixelFormat::Gray8 => Ok(Pixel::GRAY8),
        PixelFormat::Rgb24 => Ok(Pixel::RGB24),
        PixelFormat::Rgba32 => Ok(Pixel::RGBA),
        PixelFormat::Gray16 | PixelFormat::Rgb48 | PixelFormat::Rgba64 => {
            Err(Error::UnsupportedPixelFormat(format))
        }
    }
}

/**
    Copy a frame buffer into a packed single-plane FFmpeg frame.
*/
fn copy_rows(src: &FrameBuffer, dst: &mut VideoFrameFFmpeg) {
    let row_bytes = src.row_bytes();
    let dst_stride = dst.stride(0);
    let dst_data = dst.data_mut(0);

    for y in 0..src.height() {
        let dst_start = y as usize * dst_stride;
        dst_data[dst_start..dst_start + row_bytes].copy_from_slice(src.row(y));
    }
}
