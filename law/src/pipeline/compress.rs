use async_compression::tokio::bufread::GzipDecoder;
use async_compression::tokio::write::GzipEncoder;
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

use law_storage::{Sink, Source, StorageError};

use super::bridge::{SinkAsyncWrite, SourceAsyncRead};

fn io_to_storage(e: std::io::Error) -> StorageError {
    StorageError::Io(e)
}

/// Framed, streaming gzip compression. The object-key suffix `.gz` records
/// this choice so a reader knows which decompressor to pair it with.
pub struct GzipSink {
    encoder: GzipEncoder<SinkAsyncWrite>,
}

impl GzipSink {
    pub fn new(inner: Box<dyn Sink>) -> Self {
        Self {
            encoder: GzipEncoder::new(SinkAsyncWrite::new(inner)),
        }
    }
}

#[async_trait]
impl Sink for GzipSink {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, StorageError> {
        self.encoder.write_all(buf).await.map_err(io_to_storage)?;
        Ok(buf.len())
    }

    async fn close(mut self: Box<Self>) -> Result<(), StorageError> {
        // Flushes the gzip trailer (CRC32 + length) into the inner writer.
        let shutdown_result = self.encoder.shutdown().await.map_err(io_to_storage);
        let close_result = self.encoder.into_inner().into_inner_and_close().await;
        shutdown_result.and(close_result)
    }
}

pub struct GunzipSource {
    decoder: GzipDecoder<BufReader<SourceAsyncRead>>,
}

impl GunzipSource {
    pub fn new(inner: Box<dyn Source>) -> Self {
        Self {
            decoder: GzipDecoder::new(BufReader::new(SourceAsyncRead::new(inner))),
        }
    }
}

#[async_trait]
impl Source for GunzipSource {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.decoder.read(buf).await.map_err(io_to_storage)
    }

    async fn close(self: Box<Self>) -> Result<(), StorageError> {
        self.decoder
            .into_inner()
            .into_inner()
            .into_inner_and_close()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecSource {
        data: Vec<u8>,
        pos: usize,
    }
    #[async_trait]
    impl Source for VecSource {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
            let remaining = &self.data[self.pos..];
            let n = remaining.len().min(buf.len());
            buf[..n].copy_from_slice(&remaining[..n]);
            self.pos += n;
            Ok(n)
        }
        async fn close(self: Box<Self>) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn gzip_round_trips_through_the_bridge() {
        let captured = std::sync::Arc::new(tokio::sync::Mutex::new(Vec::<u8>::new()));

        struct CapturingSink(std::sync::Arc<tokio::sync::Mutex<Vec<u8>>>);
        #[async_trait]
        impl Sink for CapturingSink {
            async fn write(&mut self, buf: &[u8]) -> Result<usize, StorageError> {
                self.0.lock().await.extend_from_slice(buf);
                Ok(buf.len())
            }
            async fn close(self: Box<Self>) -> Result<(), StorageError> {
                Ok(())
            }
        }

        let sink: Box<dyn Sink> = Box::new(GzipSink::new(Box::new(CapturingSink(captured.clone()))));
        law_storage::write_all_and_close(sink, b"hello streaming pipeline world")
            .await
            .unwrap();

        let compressed = captured.lock().await.clone();
        assert_ne!(compressed, b"hello streaming pipeline world");

        let mut decoder: Box<dyn Source> = Box::new(GunzipSource::new(Box::new(VecSource {
            data: compressed,
            pos: 0,
        })));
        let mut out = Vec::new();
        let mut buf = [0u8; 16];
        loop {
            let n = decoder.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        decoder.close().await.unwrap();
        assert_eq!(out, b"hello streaming pipeline world");
    }
}
