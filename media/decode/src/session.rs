/*!
    Decoder session: demux one video stream, decode it and convert to RGB24.
*/

use std::fmt;

use ffmpeg_next::{
    Packet,
    codec::{self, decoder::Video as VideoDecoderFFmpeg},
    format::{Pixel, context::Input as InputContext},
    media::Type,
    software::scaling::{context::Context as ScalerContext, flag::Flags as ScalerFlags},
    util::{error::EAGAIN, frame::video::Video as VideoFrameFFmpeg},
};
use tracing::debug;

use media_types::{Error, FrameBuffer, PixelFormat, Rational, Result};

use crate::decode_loop::{DecodeLoop, Offered, PacketIo, Received};
use crate::errors::{codec_error, decode_error, is_read_timeout, open_error, read_error};
use crate::interrupt::Interrupter;
use crate::options::{OpenOptions, is_network_resource};

/**
    Metadata of the opened video stream.

    All fields are zero or empty while the session is closed.
*/
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamInfo {
    /// Short codec name, e.g. `h264`.
    pub codec_name: String,
    /// Descriptive codec name.
    pub codec_long_name: String,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Average frame rate, reduced to lowest terms.
    pub frame_rate: Rational,
    /// Total frames according to the container, 0 if unknown.
    pub frames_total: u64,
}

impl StreamInfo {
    /**
        Returns the frame rate as frames per second.
    */
    pub fn fps(&self) -> f64 {
        self.frame_rate.to_f64()
    }
}

/**
    Everything that exists only while a session is open.

    Dropping this releases every native resource the session holds.
*/
struct OpenStream {
    io: FfmpegIo,
    decode: DecodeLoop<Packet>,
    scaler: Option<ScalerContext>,
    /// Conversion target, RGB24.
    converted: VideoFrameFFmpeg,
}

struct FfmpegIo {
    input: InputContext,
    decoder: VideoDecoderFFmpeg,
    /// Most recent frame received from the decoder.
    decoded: VideoFrameFFmpeg,
    /// The last demuxer read failed with a timeout.
    timed_out: bool,
}

/**
    Turns a file path or network URL into a sequence of RGB24 frames.

    A session is created closed. [`open`] acquires the demuxer, decoder and
    converter; [`next_frame`] yields one decoded frame per call; [`close`]
    releases everything and may be called any number of times.

    Sessions are used from one thread at a time. The only cross-thread
    operation is [`Interrupter::interrupt`] on the handle returned by
    [`interrupter`].

    [`open`]: DecoderSession::open
    [`next_frame`]: DecoderSession::next_frame
    [`close`]: DecoderSession::close
    [`interrupter`]: DecoderSession::interrupter
*/
pub struct DecoderSession {
    // Declared before `interrupter` so the input context, which points at
    // the interrupt flag, is dropped first.
    stream: Option<OpenStream>,
    info: StreamInfo,
    interrupter: Interrupter,
}

impl DecoderSession {
    pub fn new() -> Self {
        Self {
            stream: None,
            info: StreamInfo::default(),
            interrupter: Interrupter::default(),
        }
    }

    /**
        Open a resource and prepare its best video stream for decoding.

        Any session already open is closed first. On failure the session is
        left closed and the error names the step that failed:
        - `IoFailure`/`ConnectionFailed`/`UnknownFormat` opening the input
        - `VideoStreamMissing` if there is no video stream
        - `CodecNotFound` if no decoder supports the stream's codec
        - `CodecInitFailure` if the decoder or converter cannot be set up
    */
    pub fn open(&mut self, resource: &str, options: &OpenOptions) -> Result<()> {
        self.close();
        self.interrupter.reset();

        ffmpeg_next::init().map_err(codec_error)?;

        let network = is_network_resource(resource);
        let url = options.resource_url(resource);
        let mut input = ffmpeg_next::format::input_with_dictionary(&url, options.dictionary(resource))
            .map_err(|e| open_error(e, resource, network))?;
        self.interrupter.install(&mut input);

        // Find video stream
        let (stream_index, parameters, frame_rate, frames_total) = {
            let stream = input
                .streams()
                .best(Type::Video)
                .ok_or(Error::VideoStreamMissing)?;
            let mut rate = stream.avg_frame_rate();
            if rate.numerator() == 0 || rate.denominator() == 0 {
                rate = stream.rate();
            }
            (
                stream.index(),
                stream.parameters(),
                Rational::new(rate.numerator(), rate.denominator()).reduced(),
                stream.frames().max(0) as u64,
            )
        };

        // Find and open decoder
        let codec_id = parameters.id();
        let codec = ffmpeg_next::decoder::find(codec_id)
            .ok_or_else(|| Error::CodecNotFound(codec_id.name().to_string()))?;
        let codec_name = codec.name().to_string();
        let codec_long_name = codec.description().to_string();

        let context = codec::context::Context::from_parameters(parameters).map_err(codec_error)?;
        let decoder = context
            .decoder()
            .open_as(codec)
            .and_then(|opened| opened.video())
            .map_err(codec_error)?;

        let (width, height) = (decoder.width(), decoder.height());

        // The pixel format can stay unknown until the first frame for some
        // codecs; the converter is then built lazily.
        let scaler = if decoder.format() != Pixel::None && width > 0 && height > 0 {
            Some(create_scaler(decoder.format(), width, height).map_err(codec_error)?)
        } else {
            None
        };

        self.info = StreamInfo {
            codec_name,
            codec_long_name,
            width,
            height,
            frame_rate,
            frames_total,
        };
        self.stream = Some(OpenStream {
            io: FfmpegIo {
                input,
                decoder,
                decoded: VideoFrameFFmpeg::empty(),
                timed_out: false,
            },
            decode: DecodeLoop::new(stream_index),
            scaler,
            converted: VideoFrameFFmpeg::empty(),
        });

        debug!(
            resource,
            codec = %self.info.codec_name,
            width,
            height,
            fps = self.info.fps(),
            frames = frames_total,
            "decoder session opened"
        );

        Ok(())
    }

    /**
        Decode the next frame into `image` as RGB24.

        The frame in `image` is reused when it has the right shape and no
        one else holds it; otherwise a new one is allocated.

        Returns `EndOfStream` once the demuxer is exhausted and every frame
        still buffered in the decoder has been returned. `FailedVideoDecoding`
        affects only this call: the offending packet is dropped and the next
        call continues with the following one. `IoFailure` is terminal.
    */
    pub fn next_frame(&mut self, image: &mut Option<FrameBuffer>) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::IoFailure("decoder session is not open".to_string()))?;
        stream.next_frame(image)
    }

    /**
        Release every native resource and reset the metadata.

        Safe to call on a closed or partially opened session.
    */
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!(codec = %self.info.codec_name, "decoder session closed");
        }
        self.info = StreamInfo::default();
    }

    /**
        True when the last [`next_frame`](Self::next_frame) failed because a
        network read timed out. The demuxer may deliver data on a later call.
    */
    pub fn read_timed_out(&self) -> bool {
        self.stream.as_ref().is_some_and(|stream| stream.io.timed_out)
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    /**
        Handle for aborting blocking reads from another thread.
    */
    pub fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }
}

impl Default for DecoderSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DecoderSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for DecoderSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderSession")
            .field("open", &self.is_open())
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl PacketIo for FfmpegIo {
    type Packet = Packet;

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        let mut packet = Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => Ok(Some(packet)),
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(e) => {
                self.timed_out = is_read_timeout(e);
                Err(read_error(e))
            }
        }
    }

    fn packet_stream(packet: &Packet) -> usize {
        packet.stream()
    }

    fn packet_size(packet: &Packet) -> usize {
        packet.size()
    }

    fn receive_frame(&mut self) -> Result<Received> {
        match self.decoder.receive_frame(&mut self.decoded) {
            Ok(()) => Ok(Received::Frame),
            Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => Ok(Received::NeedsInput),
            Err(ffmpeg_next::Error::Eof) => Ok(Received::Finished),
            Err(e) => Err(decode_error(e)),
        }
    }

    fn send_packet(&mut self, packet: &Packet) -> Result<Offered> {
        match self.decoder.send_packet(packet) {
            Ok(()) => Ok(Offered::Accepted),
            Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => Ok(Offered::Full),
            Err(e) => Err(decode_error(e)),
        }
    }

    fn send_eof(&mut self) -> Result<()> {
        self.decoder.send_eof().map_err(decode_error)
    }
}

impl OpenStream {
    fn next_frame(&mut self, image: &mut Option<FrameBuffer>) -> Result<()> {
        self.io.timed_out = false;
        self.decode.advance(&mut self.io)?;
        self.convert_into(image)
    }

    fn convert_into(&mut self, image: &mut Option<FrameBuffer>) -> Result<()> {
        let decoded = &self.io.decoded;
        let format = decoded.format();
        let width = decoded.width();
        let height = decoded.height();
        if width == 0 || height == 0 {
            return Err(Error::FailedVideoDecoding(
                "decoder produced an empty frame".to_string(),
            ));
        }

        // Frame size can change mid-stream
        let scaler = match self.scaler.take() {
            Some(scaler)
                if scaler.input().format == format
                    && scaler.input().width == width
                    && scaler.input().height == height =>
            {
                scaler
            }
            _ => {
                self.converted = VideoFrameFFmpeg::empty();
                create_scaler(format, width, height).map_err(decode_error)?
            }
        };
        let scaler = self.scaler.insert(scaler);
        scaler
            .run(decoded, &mut self.converted)
            .map_err(decode_error)?;

        let frame = FrameBuffer::reuse_or_allocate(image, width, height, PixelFormat::Rgb24)?;
        copy_rows(&self.converted, frame);
        Ok(())
    }
}

fn create_scaler(format: Pixel, width: u32, height: u32) -> std::result::Result<ScalerContext, ffmpeg_next::Error> {
    ScalerContext::get(
        format,
        width,
        height,
        Pixel::RGB24,
        width,
        height,
        ScalerFlags::BILINEAR,
    )
}

/**
    Copy a packed RGB24 FFmpeg frame into a frame buffer, row by row.
*/
fn copy_rows(src: &VideoFrameFFmpeg, dst: &mut FrameBuffer) {
    let row_bytes = dst.row_bytes();
    let height = dst.height() as usize;
    let src_stride = src.stride(0);
    let dst_stride = dst.stride();
    let src_data = src.data(0);
    let dst_data = dst.data_mut();

    for y in 0..height {
        let src_start = y * src_stride;
        let dst_start = y * dst_stride;
        dst_data[dst_start..dst_start + row_bytes]
            .copy_from_slice(&src_data[src_start..src_start + row_bytes]);
    }
}

/**
    Open a resource just long enough to read its stream metadata.
*/
pub fn probe(resource: &str, options: &OpenOptions) -> Result<StreamInfo> {
    let mut session = DecoderSession::new();
    session.open(resource, options)?;
    Ok(session.info().clone())
}
