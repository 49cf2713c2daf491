//! Optional encryption stage. The core treats recipients/identities as
//! opaque material passed through from the caller: it never generates,
//! stores, or rotates keys (see the Non-goals in the overview). `age` plays
//! the role the source system gave to a list of OpenPGP recipients — the
//! closest idiomatic Rust equivalent for asymmetric, streaming, multi-
//! recipient encryption, since none of the stage-set's neighbours in this
//! workspace implement one.
//!
//! `age`'s `Write`/`Read` implementations are synchronous, so both stages
//! bridge through [`tokio_util::io::SyncIoBridge`] and run the blocking
//! calls on `spawn_blocking`, rather than pulling the whole pipeline off of
//! tokio.

use age::x25519::{Identity, Recipient};
use async_trait::async_trait;
use tokio_util::io::SyncIoBridge;

use law_storage::{Sink, Source, StorageError};

use super::bridge::{SinkAsyncWrite, SourceAsyncRead, SourceCloseHandle};

fn blocking_io_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}

fn join_err(e: tokio::task::JoinError) -> StorageError {
    StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}

type EncWriter = age::stream::StreamWriter<SyncIoBridge<SinkAsyncWrite>>;

/// Encrypts the pipeline's bytes to every recipient in `recipients` before
/// they reach the inner sink.
pub struct EncryptSink {
    writer: Option<EncWriter>,
}

impl EncryptSink {
    pub fn new(inner: Box<dyn Sink>, recipients: Vec<Recipient>) -> Result<Self, StorageError> {
        let boxed_recipients: Vec<Box<dyn age::Recipient + Send>> = recipients
            .into_iter()
            .map(|r| Box::new(r) as Box<dyn age::Recipient + Send>)
            .collect();
        let encryptor = age::Encryptor::with_recipients(boxed_recipients)
            .map_err(|e| blocking_io_err(format!("no valid recipients: {e}")))?;

        let bridge = SyncIoBridge::new(SinkAsyncWrite::new(inner));
        let writer = encryptor
            .wrap_output(bridge)
            .map_err(|e| blocking_io_err(format!("age header write failed: {e}")))?;

        Ok(Self {
            writer: Some(writer),
        })
    }
}

#[async_trait]
impl Sink for EncryptSink {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, StorageError> {
        use std::io::Write;
        let mut writer = self.writer.take().expect("writer present between calls");
        let owned = buf.to_vec();
        let (writer, n) = tokio::task::spawn_blocking(move || -> std::io::Result<_> {
            let n = writer.write(&owned)?;
            Ok((writer, n))
        })
        .await
        .map_err(join_err)?
        .map_err(StorageError::Io)?;
        self.writer = Some(writer);
        Ok(n)
    }

    async fn close(mut self: Box<Self>) -> Result<(), StorageError> {
        let writer = self.writer.take().expect("writer present at close");
        // `StreamWriter::finish` consumes `writer`; on error it does not
        // hand the inner bridge back, so a failed trailer write leaves the
        // storage sink unclosed. Acceptable here because the only errors
        // `finish` can return are encryption-stream invariants, not
        // transport errors the caller would want to retry against.
        let bridge = tokio::task::spawn_blocking(move || writer.finish())
            .await
            .map_err(join_err)?
            .map_err(|e| blocking_io_err(format!("age trailer write failed: {e}")))?;
        bridge.into_inner().into_inner_and_close().await
    }
}

/// Decrypts bytes read from the inner source against `identities`. Produces
/// unverified plaintext: the core authenticates that the ciphertext
/// decrypts, not which recipient decrypted it.
pub struct DecryptSource {
    reader: Option<age::stream::StreamReader<SyncIoBridge<SourceAsyncRead>>>,
    // Held alongside `reader` rather than reached through it: `StreamReader`
    // has no consuming accessor that hands the bridge back, so this is the
    // only way `close` can still close the inner source after a failed or
    // successful decrypt.
    close_handle: SourceCloseHandle,
}

impl DecryptSource {
    pub fn new(inner: Box<dyn Source>, identities: Vec<Identity>) -> Result<Self, StorageError> {
        let async_read = SourceAsyncRead::new(inner);
        let close_handle = async_read.close_handle();
        let bridge = SyncIoBridge::new(async_read);
        let decryptor = age::Decryptor::new(bridge)
            .map_err(|e| blocking_io_err(format!("age header read failed: {e}")))?;
        let age::Decryptor::Recipients(decryptor) = decryptor else {
            return Err(blocking_io_err("object was not encrypted to age recipients"));
        };
        let identity_refs: Vec<&dyn age::Identity> =
            identities.iter().map(|i| i as &dyn age::Identity).collect();
        let reader = decryptor
            .decrypt(identity_refs.into_iter())
            .map_err(|e| blocking_io_err(format!("no matching identity: {e}")))?;
        Ok(Self {
            reader: Some(reader),
            close_handle,
        })
    }
}

#[async_trait]
impl Source for DecryptSource {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        use std::io::Read;
        let mut reader = self.reader.take().expect("reader present between calls");
        let want = buf.len();
        let (reader, scratch, n) = tokio::task::spawn_blocking(move || -> std::io::Result<_> {
            let mut scratch = vec![0u8; want];
            let n = reader.read(&mut scratch)?;
            Ok((reader, scratch, n))
        })
        .await
        .map_err(join_err)?
        .map_err(StorageError::Io)?;
        buf[..n].copy_from_slice(&scratch[..n]);
        self.reader = Some(reader);
        Ok(n)
    }

    async fn close(mut self: Box<Self>) -> Result<(), StorageError> {
        let reader = self.reader.take().expect("reader present at close");
        drop(reader);
        self.close_handle.close().await
    }
}
