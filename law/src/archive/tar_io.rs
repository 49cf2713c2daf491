use camino::Utf8Path;
use futures::StreamExt;
use tokio::io::AsyncReadExt;

use law_storage::{Sink, Source};

use crate::archive::partition::Partition;
use crate::archive::walker::EntryKind;
use crate::error::LawError;
use crate::pipeline::bridge::{SinkAsyncWrite, SourceAsyncRead};

/// Streams one partition to `sink` as a POSIX tar stream. A member that
/// disappears between enumeration and tar time (a race with the live
/// database) is silently skipped, matching the walker's own tolerance for a
/// changing filesystem underneath it; a member that *grew* since it was
/// stat'd is truncated at its originally recorded size rather than failing
/// the whole partition.
pub async fn write_partition(sink: Box<dyn Sink>, partition: &Partition) -> Result<(), LawError> {
    let mut builder = tokio_tar::Builder::new(SinkAsyncWrite::new(sink));

    for entry in &partition.members {
        match entry.kind {
            EntryKind::Directory => {
                let mut header = tokio_tar::Header::new_gnu();
                header.set_entry_type(tokio_tar::EntryType::Directory);
                header.set_mode(entry.mode);
                header.set_size(0);
                header.set_cksum();
                builder
                    .append_data(&mut header, entry.relative_path.as_str(), tokio::io::empty())
                    .await?;
            }
            EntryKind::Symlink => {
                let target = entry.link_target.clone().unwrap_or_default();
                let mut header = tokio_tar::Header::new_gnu();
                header.set_entry_type(tokio_tar::EntryType::Symlink);
                header.set_mode(entry.mode);
                header.set_size(0);
                header.set_cksum();
                builder
                    .append_link(&mut header, entry.relative_path.as_str(), target.as_str())
                    .await?;
            }
            EntryKind::File => {
                let file = match tokio::fs::File::open(&entry.absolute_path).await {
                    Ok(f) => f,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(LawError::Io(e)),
                };
                let mut header = tokio_tar::Header::new_gnu();
                header.set_entry_type(tokio_tar::EntryType::Regular);
                header.set_mode(entry.mode);
                header.set_size(entry.size);
                header.set_cksum();
                let capped = file.take(entry.size);
                builder
                    .append_data(&mut header, entry.relative_path.as_str(), capped)
                    .await?;
            }
        }
    }

    let async_write = builder.into_inner().await?;
    async_write.into_inner_and_close().await?;
    Ok(())
}

/// Untars a stream from `source` into `dest_root`. Directories are created
/// with the header's mode; symlinks are re-created from the header's link
/// name; regular files are created (parents at mode 0700) and streamed to.
pub async fn read_into_directory(
    source: Box<dyn Source>,
    dest_root: &Utf8Path,
) -> Result<(), LawError> {
    let mut archive = tokio_tar::Archive::new(SourceAsyncRead::new(source));
    let mut entries = archive.entries()?;

    while let Some(entry) = entries.next().await {
        let mut entry = entry?;
        let kind = entry.header().entry_type();
        let mode = entry.header().mode()?;
        let path = entry.path()?.into_owned();
        let relative = Utf8Path::from_path(&path).ok_or_else(|| {
            LawError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "tar entry path is not valid UTF-8",
            ))
        })?;
        let dest_path = dest_root.join(relative);

        match kind {
            tokio_tar::EntryType::Directory => {
                tokio::fs::create_dir_all(&dest_path).await?;
                set_mode(&dest_path, mode).await?;
            }
            tokio_tar::EntryType::Symlink => {
                let link_name = entry.link_name()?.ok_or_else(|| {
                    LawError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "symlink tar entry missing link name",
                    ))
                })?;
                if let Some(parent) = dest_path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                create_symlink(&link_name, &dest_path).await?;
            }
            _ => {
                if let Some(parent) = dest_path.parent() {
                    let parent_existed = tokio::fs::try_exists(parent).await?;
                    tokio::fs::create_dir_all(parent).await?;
                    if !parent_existed {
                        set_mode(parent, 0o700).await?;
                    }
                }
                let mut file = tokio::fs::File::create(&dest_path).await?;
                tokio::io::copy(&mut entry, &mut file).await?;
                set_mode(&dest_path, mode).await?;
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
async fn create_symlink(target: &std::path::Path, dest: &Utf8Path) -> std::io::Result<()> {
    tokio::fs::symlink(target, dest.as_std_path()).await
}

#[cfg(not(unix))]
async fn create_symlink(_target: &std::path::Path, _dest: &Utf8Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symlink restore is only supported on unix",
    ))
}

#[cfg(unix)]
async fn set_mode(path: &Utf8Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_mode(_path: &Utf8Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
