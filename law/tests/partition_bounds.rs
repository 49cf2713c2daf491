//! Property 4: for every walker-shaped output, every emitted partition stays
//! within the size/member bounds, and concatenating all partitions
//! reproduces the input in order.

use camino::Utf8PathBuf;
use law::archive::{partition, EntryKind, FileEntry};
use law::defaults::{MAX_PARTITION_MEMBERS, MAX_PARTITION_SIZE};
use proptest::prelude::*;

fn file_entry(index: usize, size: u64) -> FileEntry {
    let name = Utf8PathBuf::from(format!("f{index}"));
    FileEntry {
        absolute_path: name.clone(),
        relative_path: name,
        kind: EntryKind::File,
        size,
        mode: 0o644,
        link_target: None,
    }
}

proptest! {
    #[test]
    fn partitions_stay_within_bounds_and_preserve_order(
        sizes in proptest::collection::vec(0u64..=(1024 * 1024), 0..200)
    ) {
        let entries: Vec<_> = sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| file_entry(i, size))
            .collect();
        let names: Vec<_> = entries.iter().map(|e| e.relative_path.to_string()).collect();

        let partitions = partition(entries).unwrap();

        for part in &partitions {
            prop_assert!(part.total_size < MAX_PARTITION_SIZE || part.members.is_empty());
            prop_assert!(part.members.len() <= MAX_PARTITION_MEMBERS);
        }

        let reassembled: Vec<_> = partitions
            .into_iter()
            .flat_map(|p| p.members)
            .map(|e| e.relative_path.to_string())
            .collect();
        prop_assert_eq!(reassembled, names);
    }
}
