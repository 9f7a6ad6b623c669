//! Response sinks for the delivery strategies.
//!
//! Delivery code runs as blocking, straight-line I/O. It writes headers and
//! body bytes into a [`ResponseSink`]; the sink decides when the response head
//! is handed to the HTTP layer. Once the head has gone out (the sink is
//! *committed*) the status can no longer change, so a late failure can only
//! cut the body short.

use std::io::{self, Write};

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue},
    response::Response,
};
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::error::ServeError;

/// Chunks buffered between the delivery task and the client connection.
const BODY_CHANNEL_CAPACITY: usize = 16;

/// A byte destination that knows whether the response head has been sent.
pub trait ResponseSink: Write {
    /// Set a response header. Ignored once the sink is committed.
    fn set_header(&mut self, name: HeaderName, value: HeaderValue);

    /// True once any body bytes have been handed to the transport.
    fn is_committed(&self) -> bool;

    /// Replace the pending response with `error`.
    ///
    /// Returns `false` when the sink was already committed; the body is then
    /// aborted instead and the client sees a truncated response.
    fn fail(&mut self, error: &ServeError) -> bool;

    /// Complete the response. Commits the head if nothing was written yet.
    fn finish(&mut self) -> io::Result<()>;
}

impl<S: ResponseSink + ?Sized> ResponseSink for &mut S {
    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        (**self).set_header(name, value);
    }

    fn is_committed(&self) -> bool {
        (**self).is_committed()
    }

    fn fail(&mut self, error: &ServeError) -> bool {
        (**self).fail(error)
    }

    fn finish(&mut self) -> io::Result<()> {
        (**self).finish()
    }
}

/// Sink that feeds an axum response body through a bounded channel.
///
/// The response head is delivered on the oneshot returned by
/// [`ChannelSink::new`] either at the first body write, at
/// [`ResponseSink::finish`], or as an error response from
/// [`ResponseSink::fail`]. Writes must happen off the async runtime
/// (e.g. in `spawn_blocking`).
pub struct ChannelSink {
    head_tx: Option<oneshot::Sender<Response>>,
    body_tx: mpsc::Sender<io::Result<Bytes>>,
    body_rx: Option<mpsc::Receiver<io::Result<Bytes>>>,
    headers: HeaderMap,
    committed: bool,
}

impl ChannelSink {
    pub fn new() -> (Self, oneshot::Receiver<Response>) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);

        let sink = Self {
            head_tx: Some(head_tx),
            body_tx,
            body_rx: Some(body_rx),
            headers: HeaderMap::new(),
            committed: false,
        };

        (sink, head_rx)
    }

    fn commit(&mut self) -> io::Result<()> {
        if self.committed {
            return Ok(());
        }

        let (Some(head_tx), Some(body_rx)) = (self.head_tx.take(), self.body_rx.take()) else {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "response already replaced by an error",
            ));
        };

        let mut response = Response::new(Body::from_stream(ReceiverStream::new(body_rx)));
        *response.headers_mut() = std::mem::take(&mut self.headers);

        head_tx.send(response).map_err(|_| {
            io::Error::new(io::ErrorKind::BrokenPipe, "request handler went away")
        })?;
        self.committed = true;

        Ok(())
    }
}

impl Write for ChannelSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        self.commit()?;
        self.body_tx
            .blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected"))?;

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ResponseSink for ChannelSink {
    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.committed {
            debug!("ignoring header {} set after commit", name);
            return;
        }
        self.headers.insert(name, value);
    }

    fn is_committed(&self) -> bool {
        self.committed
    }

    fn fail(&mut self, error: &ServeError) -> bool {
        if self.committed {
            // An error item makes hyper abort the connection mid-body.
            let _ = self
                .body_tx
                .blocking_send(Err(io::Error::other(error.public_message())));
            return false;
        }

        if let Some(head_tx) = self.head_tx.take() {
            let _ = head_tx.send(error.to_response());
        }
        true
    }

    fn finish(&mut self) -> io::Result<()> {
        if self.committed || self.head_tx.is_none() {
            return Ok(());
        }
        self.commit()
    }
}
