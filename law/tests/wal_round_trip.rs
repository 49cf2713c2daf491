//! S1: archiving a WAL segment to a `file://` backend and fetching it back
//! yields a byte-identical file.

use law_storage::AwsCredentials;

#[tokio::test]
async fn wal_push_then_fetch_round_trips() {
    let store_dir = camino_tempfile::tempdir().unwrap();
    let wal_dir = camino_tempfile::tempdir().unwrap();
    let out_dir = camino_tempfile::tempdir().unwrap();

    let segment_name = "000000010000000000000001";
    let segment_path = wal_dir.path().join(segment_name);
    let payload = vec![0x42u8; 64 * 1024];
    std::fs::write(&segment_path, &payload).unwrap();

    let ssn = format!("file://{}", store_dir.path());
    let storage = law_storage::from_ssn(&ssn, AwsCredentials::default()).unwrap();
    let operator = law::Operator::new(storage);

    operator.archive(&segment_path).await.unwrap();

    let expected_key = law::operator::wal_key(segment_name);
    assert!(store_dir.path().join(&expected_key).exists());

    let dest_path = out_dir.path().join("restored_segment");
    operator.unarchive(segment_name, &dest_path).await.unwrap();

    let restored = std::fs::read(&dest_path).unwrap();
    assert_eq!(restored, payload);
}

#[tokio::test]
async fn unsupported_scheme_is_rejected_at_construction() {
    let err = law_storage::from_ssn("scheme://x/y", AwsCredentials::default()).unwrap_err();
    assert!(matches!(err, law_storage::StorageError::UnsupportedScheme(s) if s == "scheme"));
}
