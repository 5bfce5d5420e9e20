//! A QUIC bidirectional stream exposed as a byte-duplex with deadlines.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use ferry_transport::Connector;
use quinn::{ClosedStream, RecvStream, SendStream, StreamId, VarInt};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{Instant, Sleep};

/// Application error code sent when a stream half is abandoned.
const STREAM_ABANDONED: u32 = 0;

#[derive(Debug, Default)]
struct Deadline {
    at: Option<Instant>,
    timer: Option<Pin<Box<Sleep>>>,
}

impl Deadline {
    fn set(&mut self, at: Option<Instant>) {
        self.at = at;
        self.timer = None;
    }

    /// Registers the waker with the timer so an elapsing deadline wakes a
    /// pending operation.
    fn poll_elapsed(&mut self, cx: &mut Context<'_>) -> bool {
        let Some(at) = self.at else {
            return false;
        };
        if Instant::now() >= at {
            return true;
        }

        self.timer
            .get_or_insert_with(|| Box::pin(tokio::time::sleep_until(at)))
            .as_mut()
            .poll(cx)
            .is_ready()
    }
}

#[derive(Debug)]
pub(crate) struct DuplexStream {
    send: SendStream,
    recv: RecvStream,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    read_deadline: Deadline,
    write_deadline: Deadline,
    finished: bool,
}

impl DuplexStream {
    pub(crate) fn new(
        send: SendStream,
        recv: RecvStream,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
    ) -> Self {
        Self {
            send,
            recv,
            local_addr,
            remote_addr,
            read_deadline: Deadline::default(),
            write_deadline: Deadline::default(),
            finished: false,
        }
    }

    pub(crate) fn id(&self) -> StreamId {
        self.send.id()
    }

    /// Finishes the send half. The peer reads end-of-stream after any
    /// buffered data.
    ///
    /// Finishing an already finished stream succeeds; only a reset send half
    /// fails.
    pub(crate) fn finish(&mut self) -> Result<(), ClosedStream> {
        if !self.finished {
            self.send.finish()?;
            self.finished = true;
        }
        Ok(())
    }

    /// Abandons the send half. The peer's reads fail with `code`.
    pub(crate) fn reset(&mut self, code: VarInt) -> Result<(), ClosedStream> {
        self.send.reset(code)
    }
}

/// Releases a stream that failed before it was handed to a caller.
pub(crate) fn abandon(mut send: SendStream, mut recv: RecvStream) {
    let _ = send.finish();
    let _ = recv.stop(VarInt::from_u32(STREAM_ABANDONED));
}

fn deadline_exceeded(direction: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("{direction} deadline exceeded"),
    )
}

impl AsyncRead for DuplexStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.read_deadline.poll_elapsed(cx) {
            return Poll::Ready(Err(deadline_exceeded("read")));
        }

        AsyncRead::poll_read(Pin::new(&mut self.recv), cx, buf)
    }
}

impl AsyncWrite for DuplexStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.write_deadline.poll_elapsed(cx) {
            return Poll::Ready(Err(deadline_exceeded("write")));
        }

        AsyncWrite::poll_write(Pin::new(&mut self.send), cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncWrite::poll_flush(Pin::new(&mut self.send), cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(self.get_mut().finish().map_err(io::Error::from))
    }
}

impl Connector for DuplexStream {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        self.read_deadline.set(deadline);
    }

    fn set_write_deadline(&mut self, deadline: Option<Instant>) {
        self.write_deadline.set(deadline);
    }
}

/// Forwards the byte-duplex and [`Connector`] impls of a wrapper type to its
/// `stream: DuplexStream` field.
macro_rules! forward_duplex {
    ($ty:ty) => {
        impl ::tokio::io::AsyncRead for $ty {
            fn poll_read(
                mut self: ::std::pin::Pin<&mut Self>,
                cx: &mut ::std::task::Context<'_>,
                buf: &mut ::tokio::io::ReadBuf<'_>,
            ) -> ::std::task::Poll<::std::io::Result<()>> {
                ::tokio::io::AsyncRead::poll_read(::std::pin::Pin::new(&mut self.stream), cx, buf)
            }
        }

        impl ::tokio::io::AsyncWrite for $ty {
            fn poll_write(
                mut self: ::std::pin::Pin<&mut Self>,
                cx: &mut ::std::task::Context<'_>,
                buf: &[u8],
            ) -> ::std::task::Poll<::std::io::Result<usize>> {
                ::tokio::io::AsyncWrite::poll_write(::std::pin::Pin::new(&mut self.stream), cx, buf)
            }

            fn poll_flush(
                mut self: ::std::pin::Pin<&mut Self>,
                cx: &mut ::std::task::Context<'_>,
            ) -> ::std::task::Poll<::std::io::Result<()>> {
                ::tokio::io::AsyncWrite::poll_flush(::std::pin::Pin::new(&mut self.stream), cx)
            }

            fn poll_shutdown(
                mut self: ::std::pin::Pin<&mut Self>,
                cx: &mut ::std::task::Context<'_>,
            ) -> ::std::task::Poll<::std::io::Result<()>> {
                ::tokio::io::AsyncWrite::poll_shutdown(::std::pin::Pin::new(&mut self.stream), cx)
            }
        }

        impl ::ferry_transport::Connector for $ty {
            fn local_addr(&self) -> ::std::net::SocketAddr {
                ::ferry_transport::Connector::local_addr(&self.stream)
            }

            fn remote_addr(&self) -> ::std::net::SocketAddr {
                ::ferry_transport::Connector::remote_addr(&self.stream)
            }

            fn set_read_deadline(&mut self, deadline: Option<::tokio::time::Instant>) {
                ::ferry_transport::Connector::set_read_deadline(&mut self.stream, deadline);
            }

            fn set_write_deadline(&mut self, deadline: Option<::tokio::time::Instant>) {
                ::ferry_transport::Connector::set_write_deadline(&mut self.stream, deadline);
            }
        }
    };
}

pub(crate) use forward_duplex;
