//! Object-key schema (persisted state layout, version prefix `001`). `EXT`
//! is the pipeline's compression suffix; gzip is the only one implemented,
//! so it's hard-coded here rather than threaded through as a parameter.

const EXT: &str = ".gz";

pub fn wal_key(segment_name: &str) -> String {
    format!("law_001/{segment_name}{EXT}")
}

/// `label` is the combined `<label-name>_<label-offset>` string that
/// identifies one base backup — what a `backup-fetch --name` flag carries.
pub fn backup_prefix(label: &str) -> String {
    format!("basebackup_001/base_{label}/")
}

pub fn backup_part_key(label_name: &str, label_offset: &str, part_index: usize) -> String {
    format!(
        "{}part_{part_index}.tar{EXT}",
        backup_prefix(&format!("{label_name}_{label_offset}"))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wal_key_has_version_prefix_and_extension() {
        assert_eq!(
            wal_key("000000010000000000000001"),
            "law_001/000000010000000000000001.gz"
        );
    }

    #[test]
    fn backup_part_key_embeds_label_and_index() {
        assert_eq!(
            backup_part_key("000000010000000000000003", "00000028", 2),
            "basebackup_001/base_000000010000000000000003_00000028/part_2.tar.gz"
        );
    }
}
