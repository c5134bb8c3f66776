//! Connection-level deadlines for the HTTP server.
//!
//! hyper's http1 connection only enforces the header-read deadline itself;
//! request reads, response writes and keep-alive idling are bounded here by
//! wrapping the connection IO before it is handed to hyper.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{sleep_until, Instant, Sleep};

/// IO wrapper enforcing read, write and idle deadlines.
///
/// A request is in flight from its first byte read until the first write of
/// the response. The deadlines are:
///
/// - **idle**: with no request in flight, a read may wait for the next
///   request for at most `idle_timeout`.
/// - **read**: once a request's first byte arrives, all of its reads must
///   complete within `read_timeout` of that byte.
/// - **write**: a response must be fully written within `write_timeout` of
///   its first write. The deadline is cleared when the next request starts.
///
/// An expired deadline surfaces as [`io::ErrorKind::TimedOut`], which hyper
/// reports as a connection error and closes the connection.
pub(crate) struct TimedIo<I> {
    inner: I,
    read_timeout: Duration,
    write_timeout: Duration,
    idle_timeout: Duration,
    in_request: bool,
    read_deadline: Option<Pin<Box<Sleep>>>,
    write_deadline: Option<Pin<Box<Sleep>>>,
}

impl<I> TimedIo<I> {
    pub(crate) fn new(
        inner: I,
        read_timeout: Duration,
        write_timeout: Duration,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            inner,
            read_timeout,
            write_timeout,
            idle_timeout,
            in_request: false,
            read_deadline: None,
            write_deadline: None,
        }
    }

    fn timed_out(what: &'static str) -> io::Error {
        io::Error::new(io::ErrorKind::TimedOut, format!("{what} timed out"))
    }
}

impl<I: AsyncRead + Unpin> AsyncRead for TimedIo<I> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        let before = buf.filled().len();

        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                if buf.filled().len() > before && !this.in_request {
                    // First byte of a request: the idle phase is over and
                    // the whole request must now be read within the read
                    // deadline.
                    this.in_request = true;
                    this.read_deadline =
                        Some(Box::pin(sleep_until(Instant::now() + this.read_timeout)));
                    this.write_deadline = None;
                }
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(err)) => Poll::Ready(Err(err)),
            Poll::Pending => {
                let deadline = this.read_deadline.get_or_insert_with(|| {
                    let timeout = if this.in_request {
                        this.read_timeout
                    } else {
                        this.idle_timeout
                    };
                    Box::pin(sleep_until(Instant::now() + timeout))
                });
                match deadline.as_mut().poll(cx) {
                    Poll::Ready(()) => Poll::Ready(Err(Self::timed_out(if this.in_request {
                        "request read"
                    } else {
                        "idle connection"
                    }))),
                    Poll::Pending => Poll::Pending,
                }
            }
        }
    }
}

impl<I: AsyncWrite + Unpin> TimedIo<I> {
    /// Arms the response write deadline on first use and polls it while the
    /// inner write operation is blocked.
    fn poll_write_deadline(&mut self, cx: &mut Context<'_>) -> Poll<io::Error> {
        let deadline = self
            .write_deadline
            .get_or_insert_with(|| Box::pin(sleep_until(Instant::now() + self.write_timeout)));
        match deadline.as_mut().poll(cx) {
            Poll::Ready(()) => Poll::Ready(Self::timed_out("response write")),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<I: AsyncWrite + Unpin> AsyncWrite for TimedIo<I> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;

        // Writing the response ends the request read phase; the deadline
        // stays armed (absolute) until the next request starts.
        if this.in_request {
            this.in_request = false;
            this.read_deadline = None;
        }
        if this.write_deadline.is_none() {
            this.write_deadline =
                Some(Box::pin(sleep_until(Instant::now() + this.write_timeout)));
        }

        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(result) => Poll::Ready(result),
            Poll::Pending => match this.poll_write_deadline(cx) {
                Poll::Ready(err) => Poll::Ready(Err(err)),
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_flush(cx) {
            Poll::Ready(result) => Poll::Ready(result),
            Poll::Pending => match this.poll_write_deadline(cx) {
                Poll::Ready(err) => Poll::Ready(Err(err)),
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const READ: Duration = Duration::from_secs(3);
    const WRITE: Duration = Duration::from_secs(3);
    const IDLE: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn idle_connection_times_out_after_the_idle_deadline() {
        let (_client, server) = tokio::io::duplex(1024);
        let mut io = TimedIo::new(server, READ, WRITE, IDLE);

        let mut buf = [0u8; 8];
        let err = io.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(err.to_string().contains("idle connection"));
    }

    #[tokio::test(start_paused = true)]
    async fn request_read_times_out_after_the_read_deadline() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut io = TimedIo::new(server, READ, WRITE, IDLE);

        // First byte arrives; the rest of the request never does.
        client.write_all(b"GET").await.unwrap();
        let mut buf = [0u8; 3];
        io.read_exact(&mut buf).await.unwrap();

        let err = io.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(err.to_string().contains("request read"));
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_response_write_times_out() {
        let (_client, server) = tokio::io::duplex(4);
        let mut io = TimedIo::new(server, READ, WRITE, IDLE);

        // Fills the peer buffer; the client never drains it.
        io.write_all(b"1234").await.unwrap();
        let err = io.write_all(b"5").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(err.to_string().contains("response write"));
    }

    #[tokio::test(start_paused = true)]
    async fn keep_alive_cycle_gets_the_idle_deadline_between_requests() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut io = TimedIo::new(server, READ, WRITE, IDLE);

        // Request/response cycle.
        client.write_all(b"request").await.unwrap();
        let mut buf = [0u8; 7];
        io.read_exact(&mut buf).await.unwrap();
        io.write_all(b"response").await.unwrap();

        // The connection now idles; a wait longer than the read deadline
        // but within the idle deadline must survive until the next request.
        let server_side = tokio::spawn(async move {
            let mut buf = [0u8; 4];
            io.read_exact(&mut buf).await.map(|_| buf)
        });
        tokio::time::sleep(Duration::from_secs(30)).await;
        client.write_all(b"next").await.unwrap();

        let buf = server_side.await.unwrap().unwrap();
        assert_eq!(&buf, b"next");
    }

    #[tokio::test(start_paused = true)]
    async fn keep_alive_idling_past_the_idle_deadline_is_cut_off() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut io = TimedIo::new(server, READ, WRITE, IDLE);

        client.write_all(b"request").await.unwrap();
        let mut buf = [0u8; 7];
        io.read_exact(&mut buf).await.unwrap();
        io.write_all(b"response").await.unwrap();

        let err = io.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(err.to_string().contains("idle connection"));
    }
}
