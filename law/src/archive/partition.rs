use crate::archive::walker::FileEntry;
use crate::defaults::{MAX_PARTITION_MEMBERS, MAX_PARTITION_SIZE};
use crate::error::LawError;

/// A bounded, ordered run of walker entries that fits in one tar object.
#[derive(Debug, Default)]
pub struct Partition {
    pub members: Vec<FileEntry>,
    pub total_size: u64,
}

/// Splits a walker's output into partitions bounded by `MAX_PARTITION_SIZE`
/// and `MAX_PARTITION_MEMBERS` (§4.5). A single member larger than the size
/// bound is rejected outright rather than silently split, since the tar
/// format has no notion of a partial file spanning two archives here.
pub fn partition(entries: Vec<FileEntry>) -> Result<Vec<Partition>, LawError> {
    let mut partitions = Vec::new();
    let mut current = Partition::default();

    for entry in entries {
        if entry.size > MAX_PARTITION_SIZE {
            return Err(LawError::FileTooLarge {
                path: entry.relative_path.to_string(),
                size: entry.size,
            });
        }

        let would_overflow_size = current.total_size + entry.size >= MAX_PARTITION_SIZE;
        let would_overflow_members = current.members.len() >= MAX_PARTITION_MEMBERS;
        if (would_overflow_size || would_overflow_members) && !current.members.is_empty() {
            partitions.push(std::mem::take(&mut current));
        }

        current.total_size += entry.size;
        current.members.push(entry);
    }
    partitions.push(current);

    Ok(partitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::walker::EntryKind;
    use camino::Utf8PathBuf;

    fn dummy_file(name: &str, size: u64) -> FileEntry {
        FileEntry {
            absolute_path: Utf8PathBuf::from(name),
            relative_path: Utf8PathBuf::from(name),
            kind: EntryKind::File,
            size,
            mode: 0o644,
            link_target: None,
        }
    }

    #[test]
    fn seals_on_member_count_bound() {
        let entries: Vec<_> = (0..crate::defaults::MAX_PARTITION_MEMBERS + 5)
            .map(|n| dummy_file(&format!("f{n}"), 1))
            .collect();
        let partitions = partition(entries).unwrap();
        assert!(partitions.len() >= 2);
        assert!(partitions[0].members.len() <= crate::defaults::MAX_PARTITION_MEMBERS);
    }

    #[test]
    fn oversized_single_member_is_rejected() {
        let entries = vec![dummy_file("huge", crate::defaults::MAX_PARTITION_SIZE + 1)];
        let err = partition(entries).unwrap_err();
        assert!(matches!(err, LawError::FileTooLarge { .. }));
    }

    #[test]
    fn concatenation_preserves_order() {
        let entries: Vec<_> = (0..20).map(|n| dummy_file(&format!("f{n}"), 10)).collect();
        let names: Vec<_> = entries
            .iter()
            .map(|e| e.relative_path.to_string())
            .collect();
        let partitions = partition(entries).unwrap();
        let reassembled: Vec<_> = partitions
            .into_iter()
            .flat_map(|p| p.members)
            .map(|e| e.relative_path.to_string())
            .collect();
        assert_eq!(reassembled, names);
    }
}
