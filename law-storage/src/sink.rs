use async_trait::async_trait;

use crate::StorageError;

/// Byte sink half of the stage contract (`SPEC_FULL.md` §4.2).
///
/// A `Sink` accepts buffers and is releasable exactly once via `close`.
/// Implementors are not required to be `Sync`; the pipeline composer
/// serializes access to a single owner.
#[async_trait]
pub trait Sink: Send {
    /// Accepts as much of `buf` as the sink can take this call and returns
    /// the number of bytes actually consumed.
    async fn write(&mut self, buf: &[u8]) -> Result<usize, StorageError>;

    /// Releases the sink, flushing any buffered state. Consumes `self` so a
    /// sink cannot be written to after close.
    async fn close(self: Box<Self>) -> Result<(), StorageError>;
}

/// Byte source half of the stage contract.
///
/// `read` fills `buf` and returns the number of bytes produced; `0` signals
/// end of stream.
#[async_trait]
pub trait Source: Send {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError>;

    async fn close(self: Box<Self>) -> Result<(), StorageError>;
}

/// Convenience: drive a [`Sink`] to completion from an in-memory buffer,
/// closing it afterwards regardless of the write outcome.
pub async fn write_all_and_close(
    mut sink: Box<dyn Sink>,
    mut buf: &[u8],
) -> Result<(), StorageError> {
    let write_result = async {
        while !buf.is_empty() {
            let n = sink.write(buf).await?;
            if n == 0 {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "sink accepted zero bytes",
                )));
            }
            buf = &buf[n..];
        }
        Ok(())
    }
    .await;

    let close_result = sink.close().await;
    write_result.and(close_result)
}
