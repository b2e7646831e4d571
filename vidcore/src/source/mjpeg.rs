use std::io::{BufRead, BufReader, Read};

use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use media_types::{Error, FrameBuffer, Result};

use crate::imaging::decode_jpeg;
use crate::stop::StopSignal;

use super::http::HttpConfig;
use super::{Acquired, Backend};

/// Longest header line kept; longer lines are truncated.
const MAX_LINE: u64 = 8 * 1024;
const MAX_PART_HEADERS: usize = 64;
/// Upper bound for one JPEG and for junk skipped between parts.
const MAX_PART_BYTES: usize = 32 * 1024 * 1024;

/**
    Extract the boundary parameter of a `multipart` content type.
*/
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|parameter| {
        let (name, value) = parameter.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

/**
    Splits a multipart MJPEG byte stream into JPEG images.

    With a boundary, each part's headers are parsed and `Content-Length`
    is used when present; otherwise, and for streams without a boundary,
    images are delimited by their SOI and EOI markers. Boundaries match
    with or without the leading dashes some cameras include in the
    content type.
*/
pub struct MjpegReader<R> {
    reader: BufReader<R>,
    boundary: Option<Vec<u8>>,
}

impl<R: Read> MjpegReader<R> {
    pub fn new(reader: R, boundary: Option<&str>) -> Self {
        Self {
            reader: BufReader::new(reader),
            boundary: boundary.map(|b| strip_leading_dashes(b.trim().as_bytes()).to_vec()),
        }
    }

    /**
        The next JPEG, or `None` once the stream ends cleanly.
    */
    pub fn next_image(&mut self) -> Result<Option<Vec<u8>>> {
        if self.boundary.is_none() {
            return self.read_marked_jpeg();
        }

        if !self.seek_boundary()? {
            return Ok(None);
        }
        match self.read_part_headers()? {
            Some(length) if length > MAX_PART_BYTES => Err(Error::ImageIsTooBig(format!(
                "MJPEG part of {length} bytes"
            ))),
            Some(length) => {
                let mut image = vec![0; length];
                self.reader.read_exact(&mut image)?;
                Ok(Some(image))
            }
            None => self
                .read_marked_jpeg()?
                .map(Some)
                .ok_or_else(|| Error::IoFailure("stream ended inside an MJPEG part".to_string())),
        }
    }

    /**
        Read one line without its terminator. Returns false at end of stream.
    */
    fn read_line(&mut self, line: &mut Vec<u8>) -> Result<bool> {
        line.clear();
        let read = (&mut self.reader).take(MAX_LINE).read_until(b'\n', line)?;
        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        Ok(read > 0)
    }

    /**
        Skip to the next delimiter line. Returns false at end of stream or
        at the closing delimiter.
    */
    fn seek_boundary(&mut self) -> Result<bool> {
        let mut line = Vec::new();
        let mut skipped = 0;
        while self.read_line(&mut line)? {
            if let Some(closing) = self.delimiter(&line) {
                return Ok(!closing);
            }
            skipped += line.len();
            if skipped > MAX_PART_BYTES {
                return Err(Error::UnknownFormat(
                    "no multipart boundary found in MJPEG stream".to_string(),
                ));
            }
        }
        Ok(false)
    }

    /**
        Returns `Some(closing)` if `line` is a part delimiter.
    */
    fn delimiter(&self, line: &[u8]) -> Option<bool> {
        let boundary = self.boundary.as_deref()?;
        let line = line.trim_ascii();
        if !line.starts_with(b"--") {
            return None;
        }
        let name = strip_leading_dashes(line);
        if name == boundary {
            Some(false)
        } else if name.strip_suffix(b"--") == Some(boundary) {
            Some(true)
        } else {
            None
        }
    }

    /**
        Consume part headers through the blank line, returning the
        declared content length.
    */
    fn read_part_headers(&mut self) -> Result<Option<usize>> {
        let mut line = Vec::new();
        let mut length = None;
        for _ in 0..MAX_PART_HEADERS {
            if !self.read_line(&mut line)? {
                return Err(Error::IoFailure(
                    "stream ended inside MJPEG part headers".to_string(),
                ));
            }
            if line.is_empty() {
                return Ok(length);
            }

            let text = String::from_utf8_lossy(&line);
            if let Some((name, value)) = text.split_once(':')
                && name.trim().eq_ignore_ascii_case("content-length")
            {
                length = value.trim().parse().ok();
            }
        }
        Err(Error::UnknownFormat("too many MJPEG part headers".to_string()))
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8];
        Ok(match self.reader.read(&mut byte)? {
            0 => None,
            _ => Some(byte[0]),
        })
    }

    /**
        Read from the next SOI marker through the following EOI marker.
    */
    fn read_marked_jpeg(&mut self) -> Result<Option<Vec<u8>>> {
        let mut previous = 0u8;
        let mut skipped = 0;
        loop {
            let Some(byte) = self.read_byte()? else {
                return Ok(None);
            };
            if previous == 0xFF && byte == 0xD8 {
                break;
            }
            previous = byte;
            skipped += 1;
            if skipped > MAX_PART_BYTES {
                return Err(Error::UnknownFormat("no JPEG image in MJPEG stream".to_string()));
            }
        }

        let mut image = vec![0xFF, 0xD8];
        let mut previous = 0u8;
        loop {
            let Some(byte) = self.read_byte()? else {
                return Err(Error::IoFailure("stream ended inside a JPEG image".to_string()));
            };
            image.push(byte);
            if previous == 0xFF && byte == 0xD9 {
                return Ok(Some(image));
            }
            previous = byte;
            if image.len() > MAX_PART_BYTES {
                return Err(Error::ImageIsTooBig(format!(
                    "JPEG larger than {MAX_PART_BYTES} bytes"
                )));
            }
        }
    }
}

fn strip_leading_dashes(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != b'-').unwrap_or(bytes.len());
    &bytes[start..]
}

/**
    Reads a `multipart/x-mixed-replace` JPEG stream over one long-lived
    HTTP response.

    The connection is made when the source starts, so an unreachable
    camera fails `start`. Losing the connection afterwards ends the source.
*/
pub struct MjpegBackend {
    url: String,
    reader: MjpegReader<Response>,
    _client: Client,
}

impl Backend for MjpegBackend {
    type Config = HttpConfig;

    fn open(config: &HttpConfig) -> Result<Self> {
        let client = config.client()?;
        let response = config.request(&client)?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        // Boundaries are case-sensitive, media types are not
        let boundary = boundary_from_content_type(&content_type);
        let media_type = content_type.to_ascii_lowercase();
        if media_type.starts_with("multipart/") {
            if boundary.is_none() {
                return Err(Error::UnknownFormat(
                    "multipart stream without a boundary".to_string(),
                ));
            }
        } else if !media_type.starts_with("image/jpeg") {
            return Err(Error::UnknownFormat(format!(
                "'{content_type}' is not an MJPEG stream"
            )));
        }
        debug!(url = %config.url, ?boundary, "connected to MJPEG stream");

        Ok(Self {
            url: config.url.clone(),
            reader: MjpegReader::new(response, boundary.as_deref()),
            _client: client,
        })
    }

    fn next_frame(&mut self, _stop: &StopSignal, image: &mut Option<FrameBuffer>) -> Acquired {
        match self.reader.next_image() {
            Ok(Some(bytes)) => match decode_jpeg(&bytes) {
                Ok(frame) => {
                    *image = Some(frame);
                    Acquired::Frame
                }
                Err(error) => Acquired::Recoverable(error),
            },
            Ok(None) => Acquired::Fatal(Error::ConnectionFailed(format!(
                "{}: stream closed by the server",
                self.url
            ))),
            Err(error) => Acquired::Fatal(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::super::test_server::{TestServer, gray_jpeg, response};
    use super::*;

    fn part(boundary: &str, body: &[u8], with_length: bool) -> Vec<u8> {
        let mut bytes = format!("--{boundary}\r\nContent-Type: image/jpeg\r\n").into_bytes();
        if with_length {
            bytes.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
        }
        bytes.extend_from_slice(b"\r\n");
        bytes.extend_from_slice(body);
        bytes.extend_from_slice(b"\r\n");
        bytes
    }

    /// A fake JPEG whose payload contains 0xFF bytes that are not markers.
    fn fake_jpeg(fill: u8) -> Vec<u8> {
        vec![0xFF, 0xD8, 0xFF, 0xE0, fill, 0xFF, 0x00, fill, 0xFF, 0xD9]
    }

    #[test]
    fn boundary_parameter_is_extracted() {
        assert_eq!(
            boundary_from_content_type("multipart/x-mixed-replace; boundary=frame").as_deref(),
            Some("frame")
        );
        assert_eq!(
            boundary_from_content_type("multipart/x-mixed-replace;Boundary=\"--myboundary\"")
                .as_deref(),
            Some("--myboundary")
        );
        assert_eq!(boundary_from_content_type("image/jpeg"), None);
    }

    #[test]
    fn parts_with_content_length() {
        let mut stream = part("frame", &fake_jpeg(1), true);
        stream.extend(part("frame", &fake_jpeg(2), true));
        stream.extend_from_slice(b"--frame--\r\n");

        let mut reader = MjpegReader::new(Cursor::new(stream), Some("frame"));
        assert_eq!(reader.next_image().unwrap(), Some(fake_jpeg(1)));
        assert_eq!(reader.next_image().unwrap(), Some(fake_jpeg(2)));
        assert_eq!(reader.next_image().unwrap(), None);
    }

    #[test]
    fn parts_without_length_use_markers() {
        let mut stream = b"preamble\r\n".to_vec();
        stream.extend(part("myboundary", &fake_jpeg(7), false));
        stream.extend(part("myboundary", &fake_jpeg(8), false));

        // Header value carries the dashes, as some cameras send it
        let mut reader = MjpegReader::new(Cursor::new(stream), Some("--myboundary"));
        assert_eq!(reader.next_image().unwrap(), Some(fake_jpeg(7)));
        assert_eq!(reader.next_image().unwrap(), Some(fake_jpeg(8)));
        assert_eq!(reader.next_image().unwrap(), None);
    }

    #[test]
    fn stream_without_boundary_is_split_on_markers() {
        let mut stream = fake_jpeg(3);
        stream.extend_from_slice(b"junk");
        stream.extend(fake_jpeg(4));

        let mut reader = MjpegReader::new(Cursor::new(stream), None);
        assert_eq!(reader.next_image().unwrap(), Some(fake_jpeg(3)));
        assert_eq!(reader.next_image().unwrap(), Some(fake_jpeg(4)));
        assert_eq!(reader.next_image().unwrap(), None);
    }

    #[test]
    fn truncated_part_is_an_error() {
        let mut stream = part("frame", &fake_jpeg(1), true);
        stream.truncate(stream.len() - 6);

        let mut reader = MjpegReader::new(Cursor::new(stream), Some("frame"));
        assert!(matches!(reader.next_image(), Err(Error::IoFailure(_))));
    }

    #[test]
    fn backend_decodes_parts_until_the_stream_closes() {
        let mut body = part("frame", &gray_jpeg(), true);
        body.extend(part("frame", &gray_jpeg(), false));
        let server = TestServer::serve(vec![response(
            "200 OK",
            "multipart/x-mixed-replace; boundary=frame",
            &body,
        )]);

        let mut backend = MjpegBackend::open(&HttpConfig::new(&server.url)).unwrap();
        let stop = StopSignal::new();
        let mut image = None;

        assert!(matches!(backend.next_frame(&stop, &mut image), Acquired::Frame));
        assert!(matches!(backend.next_frame(&stop, &mut image), Acquired::Frame));
        assert_eq!(image.as_ref().unwrap().width(), 8);
        assert!(matches!(
            backend.next_frame(&stop, &mut image),
            Acquired::Fatal(Error::ConnectionFailed(_))
        ));
        server.join();
    }

    #[test]
    fn non_mjpeg_content_is_rejected_at_start() {
        let server = TestServer::serve(vec![response("200 OK", "text/html", b"<html></html>")]);
        let result = MjpegBackend::open(&HttpConfig::new(&server.url));
        assert!(matches!(result, Err(Error::UnknownFormat(_))));
        server.join();
    }
}
