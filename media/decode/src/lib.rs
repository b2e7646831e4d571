/*!
    Video decoding for the acquisition pipeline.

    A [`DecoderSession`] owns every native FFmpeg resource needed to pull
    frames out of one video stream: the demuxer, the codec context and the
    conversion to RGB24. Nothing from `ffmpeg-next` appears in the public API;
    failures are reported as [`media_types::Error`] codes.
*/

mod decode_loop;
mod errors;
mod interrupt;
mod options;
mod session;

pub use interrupt::Interrupter;
pub use options::{OpenOptions, is_network_resource, url_with_credentials};
pub use session::{DecoderSession, StreamInfo, probe};

/**
    Set how chatty FFmpeg's own logging is.

    By default only errors are printed. Verbose mode lets FFmpeg report
    informational messages such as stream probing details.
*/
pub fn set_log_level(verbose: bool) {
    use ffmpeg_next::util::log::{Level, set_level};

    set_level(if verbose { Level::Info } else { Level::Error });
}
