//! Disguised stream state machine.
//!
//! # Write phase
//! ```text
//! HeaderPending ──first poll_write──▶ Flushing ──frame fully written──▶ HeaderSent
//!       ▲                                │
//!       └──────── I/O error ─────────────┘
//! ```
//!
//! A first write that returns `Pending` must be retried with a buffer that
//! starts with the same bytes; anything else is refused with `InvalidInput`.
//!
//! # Read phase
//! ```text
//! HeaderPending ──terminator found──▶ HeaderConsumed
//!       │
//!       └── EOF, scan bound or bad request ──▶ Failed (every later read errors)
//! ```
//!
//! Both phases move independently. The stream is meant for one reader and one
//! writer, the usual split of a duplex relay; it takes no locks.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::{Bytes, BytesMut};
use rand::rngs::StdRng;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::framing::{
    build_request, build_response, find_terminator, parse_request_head, HEADER_TERMINATOR,
    MAX_HEADER_SCAN, SCAN_CHUNK,
};
use crate::obfs::error::ObfsError;

/// Which half of the disguise this stream speaks.
#[derive(Debug, Clone)]
pub(crate) enum Side {
    /// Sends the synthetic request, strips the response.
    Client { host: Arc<str>, rng: StdRng },
    /// Strips the synthetic request, sends the response.
    Server,
}

impl Side {
    fn first_frame(&mut self, payload: &[u8]) -> Bytes {
        match self {
            Side::Client { host, rng } => build_request(payload, &**host, rng),
            Side::Server => build_response(payload),
        }
    }

    /// Turn the peer's header block and the bytes after it into the bytes the
    /// caller should see first.
    fn leftover(&self, header: &[u8], rest: BytesMut) -> Result<BytesMut, ObfsError> {
        match self {
            Side::Client { .. } => Ok(rest),
            Side::Server => {
                let head = parse_request_head(header).ok_or(ObfsError::MalformedRequest)?;
                let mut leftover = BytesMut::with_capacity(head.len() + rest.len());
                leftover.extend_from_slice(&head);
                leftover.extend_from_slice(&rest);
                Ok(leftover)
            }
        }
    }
}

#[derive(Debug)]
enum WritePhase {
    HeaderPending,
    /// First frame built and partially written. Still pending from the
    /// caller's point of view. `payload` is what the frame carries; a retry
    /// reports its length only if the new buffer starts with it.
    Flushing {
        frame: Bytes,
        written: usize,
        payload: Bytes,
    },
    HeaderSent,
}

#[derive(Debug)]
enum ReadPhase {
    HeaderPending { scan: BytesMut },
    HeaderConsumed { leftover: BytesMut },
    Failed(ObfsError),
}

/// A stream that wraps its first write in an HTTP header block and strips
/// the peer's header block from its first read.
#[derive(Debug)]
pub struct SimpleHttpStream<S> {
    inner: S,
    side: Side,
    write: WritePhase,
    read: ReadPhase,
}

impl<S> SimpleHttpStream<S> {
    pub(crate) fn new(inner: S, side: Side) -> Self {
        Self {
            inner,
            side,
            write: WritePhase::HeaderPending,
            read: ReadPhase::HeaderPending {
                scan: BytesMut::new(),
            },
        }
    }

    /// Whether the synthetic header has gone out.
    pub fn header_sent(&self) -> bool {
        matches!(self.write, WritePhase::HeaderSent)
    }

    /// Whether the peer's header block has been found and discarded.
    pub fn header_consumed(&self) -> bool {
        matches!(self.read, ReadPhase::HeaderConsumed { .. })
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead + Unpin> SimpleHttpStream<S> {
    /// Read until the peer's header terminator is found.
    ///
    /// Bytes accumulated so far survive `Poll::Pending` and underlying read
    /// errors; only EOF or the scan bound end the scan for good.
    fn poll_consume_header(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let ReadPhase::HeaderPending { scan } = &mut self.read else {
            return Poll::Ready(Ok(()));
        };

        while scan.len() < MAX_HEADER_SCAN {
            let mut chunk = [0u8; SCAN_CHUNK];
            let mut chunk_buf = ReadBuf::new(&mut chunk);
            ready!(Pin::new(&mut self.inner).poll_read(cx, &mut chunk_buf))?;

            let filled = chunk_buf.filled();
            if filled.is_empty() {
                break;
            }

            // The terminator may straddle the previous chunk boundary.
            let search_from = scan.len().saturating_sub(HEADER_TERMINATOR.len() - 1);
            scan.extend_from_slice(filled);

            if let Some(pos) = find_terminator(&scan[search_from..]) {
                let header = scan.split_to(search_from + pos + HEADER_TERMINATOR.len());
                let rest = std::mem::take(scan);
                return match self.side.leftover(&header, rest) {
                    Ok(leftover) => {
                        self.read = ReadPhase::HeaderConsumed { leftover };
                        Poll::Ready(Ok(()))
                    }
                    Err(e) => {
                        self.read = ReadPhase::Failed(e.clone());
                        Poll::Ready(Err(e.into()))
                    }
                };
            }
        }

        self.read = ReadPhase::Failed(ObfsError::HeaderNotFound);
        Poll::Ready(Err(ObfsError::HeaderNotFound.into()))
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for SimpleHttpStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_consume_header(cx))?;

        match &mut this.read {
            ReadPhase::HeaderConsumed { leftover } if !leftover.is_empty() => {
                let n = buf.remaining().min(leftover.len());
                buf.put_slice(&leftover.split_to(n));
                if leftover.is_empty() {
                    // Release the scan allocation once drained.
                    *leftover = BytesMut::new();
                }
                Poll::Ready(Ok(()))
            }
            ReadPhase::HeaderConsumed { .. } => Pin::new(&mut this.inner).poll_read(cx, buf),
            ReadPhase::Failed(e) => Poll::Ready(Err(e.clone().into())),
            ReadPhase::HeaderPending { .. } => {
                unreachable!("header scan returned Ready without leaving HeaderPending")
            }
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for SimpleHttpStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if let WritePhase::HeaderPending = this.write {
            this.write = WritePhase::Flushing {
                frame: this.side.first_frame(buf),
                written: 0,
                payload: Bytes::copy_from_slice(buf),
            };
        }

        match &mut this.write {
            WritePhase::HeaderSent => poll_write_full(&mut this.inner, cx, buf),
            WritePhase::Flushing {
                frame,
                written,
                payload,
            } => {
                // Reporting success for other bytes would drop them silently.
                if !buf.starts_with(&payload[..]) {
                    return Poll::Ready(Err(ObfsError::WriteRetryMismatch.into()));
                }

                while *written < frame.len() {
                    match Pin::new(&mut this.inner).poll_write(cx, &frame[*written..]) {
                        Poll::Ready(Ok(0)) => {
                            this.write = WritePhase::HeaderPending;
                            return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
                        }
                        Poll::Ready(Ok(n)) => *written += n,
                        Poll::Ready(Err(e)) => {
                            this.write = WritePhase::HeaderPending;
                            return Poll::Ready(Err(e));
                        }
                        Poll::Pending => return Poll::Pending,
                    }
                }

                let consumed = payload.len();
                this.write = WritePhase::HeaderSent;
                Poll::Ready(Ok(consumed))
            }
            WritePhase::HeaderPending => unreachable!("first frame is built above"),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Keep writing `buf` while the inner stream accepts bytes.
///
/// Stops early only if the inner stream would block after making progress,
/// reporting the bytes already accepted.
fn poll_write_full<S: AsyncWrite + Unpin>(
    inner: &mut S,
    cx: &mut Context<'_>,
    buf: &[u8],
) -> Poll<io::Result<usize>> {
    let mut written = 0;
    while written < buf.len() {
        match Pin::new(&mut *inner).poll_write(cx, &buf[written..]) {
            Poll::Ready(Ok(0)) => return Poll::Ready(Err(io::ErrorKind::WriteZero.into())),
            Poll::Ready(Ok(n)) => written += n,
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Pending if written == 0 => return Poll::Pending,
            Poll::Pending => break,
        }
    }
    Poll::Ready(Ok(written))
}
