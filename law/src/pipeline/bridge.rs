//! Adapters from the core's `Sink`/`Source` trait objects to tokio's
//! `AsyncWrite`/`AsyncRead`, so `async-compression`'s tokio-native codecs
//! can sit directly on top of a storage backend without an extra buffering
//! layer.
//!
//! Both directions drive the underlying `async fn` through a stored,
//! pinned future rather than blocking, so they compose with any executor.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::Mutex;

use law_storage::{Sink, Source, StorageError};

fn to_io_err(e: StorageError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e)
}

/// Bridges a `Box<dyn Sink>` to `AsyncWrite`. `close` is driven by
/// [`SinkAsyncWrite::into_inner_and_close`], not by `poll_shutdown`, because
/// `Sink::close` consumes `self` by value and `AsyncWrite::poll_shutdown`
/// only ever sees `&mut self`.
pub struct SinkAsyncWrite {
    sink: Arc<Mutex<Option<Box<dyn Sink>>>>,
    pending: Option<BoxFuture<'static, std::io::Result<usize>>>,
}

impl SinkAsyncWrite {
    pub fn new(sink: Box<dyn Sink>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Some(sink))),
            pending: None,
        }
    }

    /// Closes the underlying sink. Only valid once all writes have
    /// completed (no task still holds a `poll_write` future in flight).
    pub async fn into_inner_and_close(self) -> Result<(), StorageError> {
        let sink = self
            .sink
            .lock()
            .await
            .take()
            .expect("sink taken exactly once, at close time");
        sink.close().await
    }
}

impl AsyncWrite for SinkAsyncWrite {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        if this.pending.is_none() {
            let sink = this.sink.clone();
            let owned = buf.to_vec();
            this.pending = Some(Box::pin(async move {
                let mut guard = sink.lock().await;
                let sink = guard.as_mut().expect("sink not yet closed");
                sink.write(&owned).await.map_err(to_io_err)
            }));
        }
        let fut = this.pending.as_mut().expect("just set above");
        match fut.as_mut().poll(cx) {
            Poll::Ready(result) => {
                this.pending = None;
                Poll::Ready(result)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        // Actual close happens in `into_inner_and_close`, driven explicitly
        // by the stage that owns this adapter; shutdown() on the encoder
        // only needs to flush its own trailer, which it does via poll_write.
        Poll::Ready(Ok(()))
    }
}

/// Bridges a `Box<dyn Source>` to `AsyncRead`, mirroring [`SinkAsyncWrite`]:
/// shared ownership through a mutex so `close` can take the source out by
/// value while `poll_read` only ever needs `&mut`.
pub struct SourceAsyncRead {
    source: Arc<Mutex<Option<Box<dyn Source>>>>,
    pending: Option<BoxFuture<'static, Result<(Vec<u8>, usize), StorageError>>>,
}

impl SourceAsyncRead {
    pub fn new(source: Box<dyn Source>) -> Self {
        Self {
            source: Arc::new(Mutex::new(Some(source))),
            pending: None,
        }
    }

    pub async fn into_inner_and_close(self) -> Result<(), StorageError> {
        let source = self
            .source
            .lock()
            .await
            .take()
            .expect("source taken exactly once, at close time");
        source.close().await
    }

    /// A cloneable handle onto the same shared slot, so a wrapper that moves
    /// this `SourceAsyncRead` into something else (e.g. a `SyncIoBridge`,
    /// then an `age` stream reader) can still reach in and close the inner
    /// source later without needing that something else to hand it back.
    pub fn close_handle(&self) -> SourceCloseHandle {
        SourceCloseHandle {
            source: self.source.clone(),
        }
    }
}

/// See [`SourceAsyncRead::close_handle`].
#[derive(Clone)]
pub struct SourceCloseHandle {
    source: Arc<Mutex<Option<Box<dyn Source>>>>,
}

impl SourceCloseHandle {
    pub async fn close(self) -> Result<(), StorageError> {
        let source = self
            .source
            .lock()
            .await
            .take()
            .expect("source taken exactly once, at close time");
        source.close().await
    }
}

impl AsyncRead for SourceAsyncRead {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        if this.pending.is_none() {
            let source = this.source.clone();
            let want = buf.remaining();
            this.pending = Some(Box::pin(async move {
                let mut guard = source.lock().await;
                let source = guard.as_mut().expect("source not yet closed");
                let mut scratch = vec![0u8; want];
                let n = source.read(&mut scratch).await?;
                Ok((scratch, n))
            }));
        }
        let fut = this.pending.as_mut().expect("just set above");
        match fut.as_mut().poll(cx) {
            Poll::Ready(Ok((scratch, n))) => {
                this.pending = None;
                buf.put_slice(&scratch[..n]);
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => {
                this.pending = None;
                Poll::Ready(Err(to_io_err(e)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
