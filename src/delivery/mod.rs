//! Delivery strategies: stream a file verbatim or a directory as a zip.
//!
//! Both strategies write into a [`ResponseSink`] and share one failure
//! policy, implemented by [`run`]: an error before the first body byte
//! becomes an error response, an error after it truncates the body.

mod archive;
mod file;

use axum::http::HeaderValue;
use tracing::{error, warn};

pub use archive::{ArchiveBuilder, ArchiveStats, archive_name};
pub use file::FileStreamer;

use crate::config::Config;
use crate::error::ServeError;
use crate::resolver::{EntryKind, Target};
use crate::sink::ResponseSink;

/// A way of turning a resolved path into response bytes.
pub trait Delivery: Send {
    fn deliver(&self, sink: &mut dyn ResponseSink) -> Result<(), ServeError>;
}

/// Pick the strategy for a resolved target.
pub fn strategy_for(target: Target, config: &Config) -> Box<dyn Delivery> {
    match target.kind {
        EntryKind::File => Box::new(FileStreamer::new(target.path)),
        EntryKind::Directory => Box::new(ArchiveBuilder::new(
            target.path,
            config.scratch_dir(),
            config.compression,
        )),
    }
}

/// Execute `strategy` against `sink` and finalize the response.
pub fn run(strategy: &dyn Delivery, sink: &mut dyn ResponseSink) {
    let outcome = strategy.deliver(sink).and_then(|()| {
        sink.finish()
            .map_err(|err| ServeError::internal("Error sending response", err))
    });

    let Err(err) = outcome else {
        return;
    };

    if sink.fail(&err) {
        warn!("delivery failed before streaming: {}", err);
    } else {
        // Status and headers are already on the wire.
        error!("delivery failed mid-stream, response truncated: {}", err);
    }
}

/// `Content-Disposition` value advertising `file_name` as a download.
fn attachment(file_name: &str) -> HeaderValue {
    let safe_name = file_name.replace('"', "'");
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", safe_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::{self, Write};

    use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

    use crate::error::ServeError;
    use crate::sink::ResponseSink;

    /// In-memory sink; `fail_after` simulates a client that disconnects.
    #[derive(Default)]
    pub struct MemorySink {
        pub headers: HeaderMap,
        pub body: Vec<u8>,
        pub error_status: Option<StatusCode>,
        pub aborted: bool,
        pub finished: bool,
        pub fail_after: Option<usize>,
    }

    impl Write for MemorySink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self
                .fail_after
                .is_some_and(|limit| self.body.len() + buf.len() > limit)
            {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client gone"));
            }
            self.body.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl ResponseSink for MemorySink {
        fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
            if !self.is_committed() {
                self.headers.insert(name, value);
            }
        }

        fn is_committed(&self) -> bool {
            !self.body.is_empty()
        }

        fn fail(&mut self, error: &ServeError) -> bool {
            if self.is_committed() {
                self.aborted = true;
                return false;
            }
            self.error_status = Some(error.status());
            true
        }

        fn finish(&mut self) -> io::Result<()> {
            self.finished = true;
            Ok(())
        }
    }
}
