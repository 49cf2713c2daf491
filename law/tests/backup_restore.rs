//! S3/S4-style scenarios: base backup respects the walker's exclude/keep-
//! empty policy and the partitioner's size bound, and restore refuses a
//! live cluster directory.

use async_trait::async_trait;
use law::database::{BackupLabel, DatabaseCollaborator};
use law_storage::AwsCredentials;

struct FixedLabelCollaborator;

#[async_trait]
impl DatabaseCollaborator for FixedLabelCollaborator {
    async fn start_backup(&self) -> Result<BackupLabel, law::LawError> {
        Ok(BackupLabel {
            name: "000000010000000000000001".to_string(),
            offset: "00000000".to_string(),
        })
    }

    async fn stop_backup(&self) -> Result<BackupLabel, law::LawError> {
        self.start_backup().await
    }
}

fn make_cluster(dir: &camino::Utf8Path) {
    std::fs::create_dir_all(dir.join("pg_xlog")).unwrap();
    std::fs::write(dir.join("pg_xlog").join("000000010000000000000001"), b"wal").unwrap();
    std::fs::create_dir_all(dir.join("base").join("1")).unwrap();
    std::fs::write(dir.join("base").join("1").join("2345"), b"table data").unwrap();
    std::fs::write(dir.join("postmaster.pid"), b"1234").unwrap();
}

#[tokio::test]
async fn backup_excludes_control_files_and_restore_reproduces_data_files() {
    let store_dir = camino_tempfile::tempdir().unwrap();
    let cluster_dir = camino_tempfile::tempdir().unwrap();
    let restore_dir = camino_tempfile::tempdir().unwrap();
    make_cluster(cluster_dir.path());

    let ssn = format!("file://{}", store_dir.path());
    let storage = law_storage::from_ssn(&ssn, AwsCredentials::default()).unwrap();
    let operator = law::Operator::new(storage);
    let database = FixedLabelCollaborator;

    operator
        .backup(cluster_dir.path(), 0, &database)
        .await
        .unwrap();

    operator
        .restore(restore_dir.path(), "000000010000000000000001_00000000")
        .await
        .unwrap();

    assert!(!restore_dir.path().join("postmaster.pid").exists());
    assert!(restore_dir.path().join("pg_xlog").is_dir());
    assert!(restore_dir
        .path()
        .join("pg_xlog")
        .read_dir()
        .unwrap()
        .next()
        .is_none());
    assert_eq!(
        std::fs::read(restore_dir.path().join("base").join("1").join("2345")).unwrap(),
        b"table data"
    );
}

#[tokio::test]
async fn restore_refuses_a_live_cluster_directory() {
    let store_dir = camino_tempfile::tempdir().unwrap();
    let cluster_dir = camino_tempfile::tempdir().unwrap();
    std::fs::write(cluster_dir.path().join("postmaster.pid"), b"1234").unwrap();

    let ssn = format!("file://{}", store_dir.path());
    let storage = law_storage::from_ssn(&ssn, AwsCredentials::default()).unwrap();
    let operator = law::Operator::new(storage);

    let err = operator
        .restore(cluster_dir.path(), "irrelevant")
        .await
        .unwrap_err();
    assert!(matches!(err, law::LawError::AttemptToOverwriteLiveDirectory(_)));
}
