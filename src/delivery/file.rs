use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use axum::http::{HeaderValue, header};
use tracing::{debug, warn};

use super::{Delivery, attachment};
use crate::error::ServeError;
use crate::sink::ResponseSink;

/// Streams one file verbatim as an attachment named after its base name.
pub struct FileStreamer {
    path: PathBuf,
}

impl FileStreamer {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn download_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "download".to_string())
    }
}

impl Delivery for FileStreamer {
    fn deliver(&self, sink: &mut dyn ResponseSink) -> Result<(), ServeError> {
        let mut file = File::open(&self.path)
            .map_err(|err| ServeError::internal("Could not open file", err))?;

        debug!("Streaming file: {}", self.path.display());

        sink.set_header(header::CONTENT_DISPOSITION, attachment(&self.download_name()));
        sink.set_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        // Pseudo files (e.g. under /proc) report zero length but have content.
        let advertised = file.metadata().ok().map(|m| m.len()).filter(|len| *len > 0);
        if let Some(len) = advertised {
            sink.set_header(header::CONTENT_LENGTH, HeaderValue::from(len));
        }

        let copied = copy_advertised(&mut file, sink, advertised)
            .map_err(|err| ServeError::internal("Error sending file", err))?;
        debug!("Sent {} bytes from {}", copied, self.path.display());

        Ok(())
    }
}

/// Copy `reader` into `out`, holding to an advertised `Content-Length`.
///
/// With a length, exactly that many bytes are sent. A reader that ends early
/// is an `UnexpectedEof` error. Bytes past the length are not sent; the
/// growth is logged.
fn copy_advertised<R: Read, W: Write + ?Sized>(
    reader: &mut R,
    out: &mut W,
    advertised: Option<u64>,
) -> io::Result<u64> {
    let Some(len) = advertised else {
        return io::copy(reader, out);
    };

    let copied = io::copy(&mut reader.by_ref().take(len), out)?;
    if copied < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("file shrank while sending: {} of {} bytes", copied, len),
        ));
    }

    let mut extra = [0u8; 1];
    if reader.read(&mut extra)? > 0 {
        warn!("file grew while sending; only the first {} bytes were sent", len);
    }

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::run;
    use crate::delivery::test_support::MemorySink;
    use axum::http::StatusCode;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn test_streams_bytes_and_sets_headers() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("report.bin");
        let payload: Vec<u8> = (0..=255u8).cycle().take(100_000).collect();
        std::fs::write(&path, &payload).unwrap();

        let mut sink = MemorySink::default();
        run(&FileStreamer::new(path), &mut sink);

        assert!(sink.finished);
        assert_eq!(sink.body, payload);
        assert_eq!(
            sink.headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"report.bin\""
        );
        assert_eq!(sink.headers[header::CONTENT_TYPE], "application/octet-stream");
        assert_eq!(sink.headers[header::CONTENT_LENGTH], "100000");
    }

    #[test]
    fn test_empty_file_is_delivered() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.txt");
        std::fs::write(&path, "").unwrap();

        let mut sink = MemorySink::default();
        run(&FileStreamer::new(path), &mut sink);

        assert!(sink.finished);
        assert!(sink.body.is_empty());
        assert_eq!(sink.error_status, None);
    }

    #[test]
    fn test_open_failure_is_internal_error() {
        let temp_dir = TempDir::new().unwrap();

        let mut sink = MemorySink::default();
        run(&FileStreamer::new(temp_dir.path().join("gone.txt")), &mut sink);

        assert_eq!(sink.error_status, Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(sink.body.is_empty());
        assert!(sink.headers.is_empty());
    }

    #[test]
    fn test_disconnect_mid_copy_truncates_without_error_status() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("big.bin");
        std::fs::write(&path, vec![7u8; 64 * 1024]).unwrap();

        let mut sink = MemorySink {
            fail_after: Some(10_000),
            ..Default::default()
        };
        run(&FileStreamer::new(path), &mut sink);

        assert!(sink.aborted);
        assert_eq!(sink.error_status, None);
        assert!(sink.body.len() <= 10_000);
    }

    #[test]
    fn test_copy_stops_at_advertised_length() {
        let mut out = Vec::new();
        let copied = copy_advertised(&mut Cursor::new(b"0123456789"), &mut out, Some(5)).unwrap();
        assert_eq!(copied, 5);
        assert_eq!(out, b"01234");
    }

    #[test]
    fn test_copy_short_of_advertised_length_fails() {
        let mut out = Vec::new();
        let err = copy_advertised(&mut Cursor::new(b"0123456789"), &mut out, Some(20)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(out, b"0123456789");
    }

    #[test]
    fn test_copy_without_length_sends_everything() {
        let mut out = Vec::new();
        let copied = copy_advertised(&mut Cursor::new(b"0123456789"), &mut out, None).unwrap();
        assert_eq!(copied, 10);
        assert_eq!(out, b"0123456789");
    }

    #[test]
    fn test_file_shrinking_mid_send_aborts_response() {
        struct Shrinking;

        impl Delivery for Shrinking {
            fn deliver(&self, sink: &mut dyn ResponseSink) -> Result<(), ServeError> {
                sink.set_header(header::CONTENT_LENGTH, HeaderValue::from(20u64));
                copy_advertised(&mut Cursor::new(vec![1u8; 10]), sink, Some(20))
                    .map_err(|err| ServeError::internal("Error sending file", err))?;
                Ok(())
            }
        }

        let mut sink = MemorySink::default();
        run(&Shrinking, &mut sink);

        assert!(sink.aborted);
        assert!(!sink.finished);
        assert_eq!(sink.body.len(), 10);
    }
}
