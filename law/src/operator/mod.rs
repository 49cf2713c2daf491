//! The operator façade: composes the walker, partitioner, tar writer/reader,
//! storage backend, and pipeline into the four flows a caller actually
//! invokes — `archive`, `unarchive`, `backup`, `restore`.

mod keys;

pub use keys::{backup_part_key, backup_prefix, wal_key};

use std::sync::Arc;

use camino::Utf8Path;
use law_storage::RemoteStorage;
use tracing::Instrument;

use crate::archive::{partition, read_into_directory, walk, write_partition};
use crate::database::DatabaseCollaborator;
use crate::error::LawError;
use crate::pipeline::{build_read_pipeline, build_write_pipeline};

pub struct Operator {
    storage: Arc<dyn RemoteStorage>,
}

impl Operator {
    pub fn new(storage: Arc<dyn RemoteStorage>) -> Self {
        Self { storage }
    }

    /// Copies a single WAL segment to storage under `law_001/<name><EXT>`.
    pub async fn archive(&self, segment_path: &Utf8Path) -> Result<(), LawError> {
        let name = segment_path
            .file_name()
            .ok_or_else(|| LawError::ConfigMissing(format!("not a file path: {segment_path}")))?;
        let span = tracing::info_span!("archive", segment = %name);
        async move {
            let mut source_file = tokio::fs::File::open(segment_path).await?;

            let storage_sink = self.storage.create(&wal_key(name)).await?;
            let sink = build_write_pipeline(storage_sink, 0, None)?;

            copy_file_into_sink(&mut source_file, sink).await
        }
        .instrument(span)
        .await
    }

    /// Fetches a single WAL segment named `segment_name` into `dest_path`.
    pub async fn unarchive(&self, segment_name: &str, dest_path: &Utf8Path) -> Result<(), LawError> {
        let span = tracing::info_span!("unarchive", segment = %segment_name);
        async move {
            let storage_source = self.storage.open(&wal_key(segment_name)).await?;
            let source = build_read_pipeline(storage_source, None)?;

            if let Some(parent) = dest_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut dest_file = tokio::fs::File::create(dest_path).await?;
            copy_source_into_file(source, &mut dest_file).await
        }
        .instrument(span)
        .await
    }

    /// Brackets a full base backup between `start_backup`/`stop_backup`,
    /// streaming each partition as its own compressed (and rate-limited) tar
    /// object.
    pub async fn backup(
        &self,
        cluster_dir: &Utf8Path,
        rate_limit_bytes_per_sec: u64,
        database: &dyn DatabaseCollaborator,
    ) -> Result<(), LawError> {
        let span = tracing::info_span!("backup", cluster_dir = %cluster_dir, label = tracing::field::Empty);
        async move {
            let label = database.start_backup().await?;
            tracing::Span::current().record("label", tracing::field::display(&label.name));

            let backup_result = self
                .backup_partitions(cluster_dir, rate_limit_bytes_per_sec, &label.name, &label.offset)
                .await;

            // `stop_backup` must run even if partition upload failed, so the
            // server's backup-in-progress state doesn't wedge; but a failure
            // while uploading takes precedence over one confirming the stop.
            let stop_result = database.stop_backup().await;
            backup_result.and(stop_result.map(|_| ()))
        }
        .instrument(span)
        .await
    }

    async fn backup_partitions(
        &self,
        cluster_dir: &Utf8Path,
        rate_limit_bytes_per_sec: u64,
        label_name: &str,
        label_offset: &str,
    ) -> Result<(), LawError> {
        let entries = walk(cluster_dir)?;
        let partitions = partition(entries)?;

        for (n, part) in partitions.iter().enumerate() {
            let storage_sink = self
                .storage
                .create(&backup_part_key(label_name, label_offset, n))
                .await?;
            let sink = build_write_pipeline(storage_sink, rate_limit_bytes_per_sec, None)?;
            write_partition(sink, part).await?;
        }
        Ok(())
    }

    /// Restores a base backup named `label_name` into `cluster_dir`. Refuses
    /// outright if the directory looks like a live cluster.
    pub async fn restore(&self, cluster_dir: &Utf8Path, label_name: &str) -> Result<(), LawError> {
        let span = tracing::info_span!("restore", cluster_dir = %cluster_dir, label = %label_name);
        async move {
            let pid_file = cluster_dir.join("postmaster.pid");
            if tokio::fs::try_exists(&pid_file).await? {
                return Err(LawError::AttemptToOverwriteLiveDirectory(
                    cluster_dir.to_string(),
                ));
            }
            if let Some(parent) = cluster_dir.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            let prefix = backup_prefix(label_name);
            let parts = self.storage.list(&prefix).await?;
            for (_key, storage_source) in parts {
                let source = build_read_pipeline(storage_source, None)?;
                read_into_directory(source, cluster_dir).await?;
            }
            Ok(())
        }
        .instrument(span)
        .await
    }
}

async fn copy_file_into_sink(
    file: &mut tokio::fs::File,
    sink: Box<dyn law_storage::Sink>,
) -> Result<(), LawError> {
    use tokio::io::AsyncReadExt;
    let mut buf = vec![0u8; 256 * 1024];
    let mut sink = sink;
    let write_result = async {
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            let mut offset = 0;
            while offset < n {
                let written = sink.write(&buf[offset..n]).await?;
                offset += written;
            }
        }
        Ok::<(), LawError>(())
    }
    .await;
    let close_result = sink.close().await.map_err(LawError::from);
    write_result.and(close_result)
}

async fn copy_source_into_file(
    mut source: Box<dyn law_storage::Source>,
    file: &mut tokio::fs::File,
) -> Result<(), LawError> {
    use tokio::io::AsyncWriteExt;
    let mut buf = vec![0u8; 256 * 1024];
    let read_result = async {
        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).await?;
        }
        Ok::<(), LawError>(())
    }
    .await;
    let close_result = source.close().await.map_err(LawError::from);
    read_result.and(close_result)
}
