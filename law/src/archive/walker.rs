use camino::{Utf8Path, Utf8PathBuf};

use crate::error::LawError;

/// Filenames excluded from a base backup regardless of where they appear —
/// this cluster's live control files, not part of its durable state.
const EXCLUDED_FILENAMES: &[&str] = &[
    "postmaster.pid",
    "postmaster.opts",
    "postgresql.conf",
    "pg_hba.conf",
    "pg_ident.conf",
    "recovery.conf",
    "recovery.done",
    "promote",
];

/// Directories whose *presence* must survive a restore but whose contents
/// never do — WAL staging areas and temp/log directories the database
/// recreates on its own.
const KEEP_EMPTY_SUBSTRINGS: &[&str] = &[
    "pg_xlog",
    "pg_log",
    "pg_replslot",
    "pg_wal",
    "pgsql_tmp",
    "pg_stat_tmp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// One walked member of a cluster directory. Immutable once produced by
/// [`walk`]; ordering in the returned `Vec` is the walker's own emission
/// order (depth-first, stable when the host filesystem's readdir is).
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub absolute_path: Utf8PathBuf,
    pub relative_path: Utf8PathBuf,
    pub kind: EntryKind,
    pub size: u64,
    pub mode: u32,
    /// Populated only for `EntryKind::Symlink`: the link's raw target.
    pub link_target: Option<Utf8PathBuf>,
}

fn is_excluded(name: &str) -> bool {
    EXCLUDED_FILENAMES.contains(&name)
}

fn is_keep_empty_dir(relative: &Utf8Path) -> bool {
    let s = relative.as_str();
    KEEP_EMPTY_SUBSTRINGS.iter().any(|needle| s.contains(needle))
}

/// Walks `root`, applying the exclude-by-filename, keep-empty-directory, and
/// symlink-metadata policies of the archive walker (§4.4). Directories
/// matched by the keep-empty rule are emitted once, as a directory entry,
/// with their contents pruned from the walk entirely.
pub fn walk(root: &Utf8Path) -> Result<Vec<FileEntry>, LawError> {
    let mut entries = Vec::new();
    walk_dir(root, root, &mut entries)?;
    Ok(entries)
}

fn walk_dir(root: &Utf8Path, dir: &Utf8Path, out: &mut Vec<FileEntry>) -> Result<(), LawError> {
    let mut children: Vec<_> = std::fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    children.sort_by_key(|e| e.file_name());

    for child in children {
        let path = Utf8PathBuf::try_from(child.path())
            .map_err(|e| LawError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        let file_name = child.file_name();
        let file_name = file_name.to_string_lossy();

        if is_excluded(&file_name) {
            continue;
        }

        let relative = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_path_buf();
        let meta = std::fs::symlink_metadata(&path)?;

        if meta.is_symlink() {
            let target = std::fs::read_link(&path)?;
            let target = Utf8PathBuf::try_from(target).map_err(|e| {
                LawError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })?;
            out.push(FileEntry {
                absolute_path: path,
                relative_path: relative,
                kind: EntryKind::Symlink,
                size: 0,
                mode: mode_of(&meta),
                link_target: Some(target),
            });
            continue;
        }

        if meta.is_dir() {
            if is_keep_empty_dir(&relative) {
                out.push(FileEntry {
                    absolute_path: path,
                    relative_path: relative,
                    kind: EntryKind::Directory,
                    size: 0,
                    mode: mode_of(&meta),
                    link_target: None,
                });
                continue;
            }
            out.push(FileEntry {
                absolute_path: path.clone(),
                relative_path: relative,
                kind: EntryKind::Directory,
                size: 0,
                mode: mode_of(&meta),
                link_target: None,
            });
            walk_dir(root, &path, out)?;
            continue;
        }

        out.push(FileEntry {
            absolute_path: path,
            relative_path: relative,
            kind: EntryKind::File,
            size: meta.len(),
            mode: mode_of(&meta),
            link_target: None,
        });
    }
    Ok(())
}

#[cfg(unix)]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn mode_of(_meta: &std::fs::Metadata) -> u32 {
    0o644
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_control_files_and_prunes_keep_empty_dirs() {
        let dir = camino_tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("postmaster.pid"), b"1234").unwrap();
        std::fs::create_dir(dir.path().join("pg_xlog")).unwrap();
        std::fs::write(dir.path().join("pg_xlog").join("seg1"), b"wal").unwrap();
        std::fs::create_dir(dir.path().join("base")).unwrap();
        std::fs::create_dir(dir.path().join("base").join("1")).unwrap();
        std::fs::write(dir.path().join("base").join("1").join("2345"), b"data").unwrap();

        let entries = walk(dir.path()).unwrap();
        let names: Vec<_> = entries
            .iter()
            .map(|e| e.relative_path.as_str().to_string())
            .collect();

        assert!(!names.iter().any(|n| n.contains("postmaster.pid")));
        assert!(names.iter().any(|n| n == "pg_xlog"));
        assert!(!names.iter().any(|n| n.contains("pg_xlog/seg1")));
        assert!(names.iter().any(|n| n.ends_with("base/1/2345")));
    }
}
