/*!
    Translation of FFmpeg failures into pipeline error codes.
*/

use ffmpeg_next::util::error::{EAGAIN, ENOMEM, ETIMEDOUT};

use media_types::Error;

/**
    Map a failure to open an input.

    Network resources report transport problems as `ConnectionFailed`
    where a local file would report `IoFailure`.
*/
pub(crate) fn open_error(e: ffmpeg_next::Error, resource: &str, network: bool) -> Error {
    use ffmpeg_next::Error as E;

    match e {
        E::InvalidData | E::DemuxerNotFound => Error::UnknownFormat(format!("{resource}: {e}")),
        E::Other { errno } if errno == ENOMEM => Error::OutOfMemory,
        E::HttpBadRequest
        | E::HttpUnauthorized
        | E::HttpForbidden
        | E::HttpNotFound
        | E::HttpOther4xx
        | E::HttpServerError => Error::ConnectionFailed(format!("{resource}: {e}")),
        _ if network => Error::ConnectionFailed(format!("{resource}: {e}")),
        _ => Error::IoFailure(format!("{resource}: {e}")),
    }
}

pub(crate) fn codec_error(e: ffmpeg_next::Error) -> Error {
    match e {
        ffmpeg_next::Error::Other { errno } if errno == ENOMEM => Error::OutOfMemory,
        _ => Error::CodecInitFailure(e.to_string()),
    }
}

pub(crate) fn read_error(e: ffmpeg_next::Error) -> Error {
    match e {
        ffmpeg_next::Error::Exit => Error::IoFailure("read interrupted".to_string()),
        ffmpeg_next::Error::Other { errno } if errno == ENOMEM => Error::OutOfMemory,
        _ => Error::IoFailure(e.to_string()),
    }
}

/**
    True when a demuxer read gave up waiting for data. An interrupted read
    reports `Exit` instead and is not a timeout.
*/
pub(crate) fn is_read_timeout(e: ffmpeg_next::Error) -> bool {
    matches!(e, ffmpeg_next::Error::Other { errno } if errno == ETIMEDOUT || errno == EAGAIN)
}

pub(crate) fn decode_error(e: ffmpeg_next::Error) -> Error {
    match e {
        ffmpeg_next::Error::Other { errno } if errno == ENOMEM => Error::OutOfMemory,
        _ => Error::FailedVideoDecoding(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_data_is_unknown_format() {
        let e = open_error(ffmpeg_next::Error::InvalidData, "junk.bin", false);
        assert!(matches!(e, Error::UnknownFormat(_)));
    }

    #[test]
    fn transport_failures_depend_on_resource_kind() {
        let missing = ffmpeg_next::Error::Other { errno: 2 };
        assert!(matches!(open_error(missing, "clip.mp4", false), Error::IoFailure(_)));
        assert!(matches!(
            open_error(missing, "rtsp://cam/live", true),
            Error::ConnectionFailed(_)
        ));
        assert!(matches!(
            open_error(ffmpeg_next::Error::HttpUnauthorized, "http://cam/video", true),
            Error::ConnectionFailed(_)
        ));
    }

    #[test]
    fn timeouts_are_told_apart_from_interrupts() {
        assert!(is_read_timeout(ffmpeg_next::Error::Other { errno: ETIMEDOUT }));
        assert!(!is_read_timeout(ffmpeg_next::Error::Exit));
        assert!(!is_read_timeout(ffmpeg_next::Error::Eof));
        assert!(matches!(
            read_error(ffmpeg_next::Error::Other { errno: ETIMEDOUT }),
            Error::IoFailure(_)
        ));
    }

    #[test]
    fn allocation_failures_are_out_of_memory() {
        let e = ffmpeg_next::Error::Other { errno: ENOMEM };
        assert_eq!(decode_error(e), Error::OutOfMemory);
        assert_eq!(codec_error(e), Error::OutOfMemory);
    }
}
