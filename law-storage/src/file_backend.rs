use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::remote::{natural_key_order, RemoteStorage};
use crate::sink::{Sink, Source};
use crate::StorageError;

/// Local filesystem storage backend (`file://<root>`).
///
/// Keys are joined onto `root` as relative paths; `create` creates parent
/// directories (mode 0700) before opening for write, `list` walks the tree
/// recursively and returns every regular file already opened for read.
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

struct FileSink {
    file: fs::File,
}

#[async_trait]
impl Sink for FileSink {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, StorageError> {
        self.file.write_all(buf).await?;
        Ok(buf.len())
    }

    async fn close(mut self: Box<Self>) -> Result<(), StorageError> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(())
    }
}

struct FileSource {
    file: fs::File,
}

#[async_trait]
impl Source for FileSource {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        Ok(self.file.read(buf).await?)
    }

    async fn close(self: Box<Self>) -> Result<(), StorageError> {
        Ok(())
    }
}

#[async_trait]
impl RemoteStorage for FileBackend {
    async fn create(&self, key: &str) -> Result<Box<dyn Sink>, StorageError> {
        let path = self.resolve(key);
        if let Some(parent) = path.parent() {
            create_dir_all_0700(parent).await?;
        }
        let file = fs::File::create(&path).await?;
        Ok(Box::new(FileSink { file }))
    }

    async fn open(&self, key: &str) -> Result<Box<dyn Source>, StorageError> {
        let path = self.resolve(key);
        let file = fs::File::open(&path)
            .await
            .map_err(|e| map_open_error(e, key))?;
        Ok(Box::new(FileSource { file }))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Box<dyn Source>)>, StorageError> {
        let base = self.resolve(prefix);
        let mut keys = Vec::new();
        if base.is_dir() {
            for entry in walkdir::WalkDir::new(&base).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
                })?;
                if entry.file_type().is_file() {
                    let rel = entry
                        .path()
                        .strip_prefix(&self.root)
                        .unwrap_or(entry.path())
                        .to_string_lossy()
                        .replace(std::path::MAIN_SEPARATOR, "/");
                    keys.push(rel);
                }
            }
        }
        keys.sort_by(|a, b| natural_key_order(a, b));

        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let source = self.open(&key).await?;
            out.push((key, source));
        }
        Ok(out)
    }
}

fn map_open_error(e: std::io::Error, key: &str) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(e)
    }
}

async fn create_dir_all_0700(dir: &Path) -> Result<(), StorageError> {
    fs::create_dir_all(dir).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        fs::set_permissions(dir, perms).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_small_object() {
        let dir = camino_tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());

        let sink = backend.create("law_001/seg.gz").await.unwrap();
        crate::sink::write_all_and_close(sink, b"hello world")
            .await
            .unwrap();

        let mut source = backend.open("law_001/seg.gz").await.unwrap();
        let mut buf = vec![0u8; 64];
        let n = source.read(&mut buf).await.unwrap();
        source.close().await.unwrap();
        assert_eq!(&buf[..n], b"hello world");
    }

    #[tokio::test]
    async fn list_returns_natural_order() {
        let dir = camino_tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        for n in [0, 1, 2, 10] {
            let sink = backend
                .create(&format!("basebackup_001/base_x_0/part_{n}.tar.gz"))
                .await
                .unwrap();
            crate::sink::write_all_and_close(sink, b"x").await.unwrap();
        }
        let listed = backend
            .list("basebackup_001/base_x_0")
            .await
            .unwrap();
        let keys: Vec<_> = listed.into_iter().map(|(k, _)| k).collect();
        assert!(keys[0].ends_with("part_0.tar.gz"));
        assert!(keys[1].ends_with("part_1.tar.gz"));
        assert!(keys[2].ends_with("part_2.tar.gz"));
        assert!(keys[3].ends_with("part_10.tar.gz"));
    }

    #[tokio::test]
    async fn open_missing_key_is_not_found() {
        let dir = camino_tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        let err = backend.open("law_001/missing.gz").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
