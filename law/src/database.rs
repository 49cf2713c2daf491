//! The database collaborator: the two operations (`start_backup`,
//! `stop_backup`) a base backup needs from the cluster it's backing up, and
//! the two ways of performing them this system ships — talking to a live
//! server over SQL, or reading a stopped one's control file on disk.

use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::NoTls;

use crate::error::LawError;

/// Identifies the point a base backup started (and, once known, stopped):
/// the WAL segment in play and a byte offset within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupLabel {
    pub name: String,
    pub offset: String,
}

#[async_trait]
pub trait DatabaseCollaborator: Send + Sync {
    async fn start_backup(&self) -> Result<BackupLabel, LawError>;
    async fn stop_backup(&self) -> Result<BackupLabel, LawError>;
}

/// Talks to a live server over `DATABASE_URL`, using `pg_start_backup`/
/// `pg_stop_backup` bracketed around the copy of the cluster directory.
pub struct PgQueryCollaborator {
    database_url: String,
}

impl PgQueryCollaborator {
    pub fn new(database_url: String) -> Self {
        Self { database_url }
    }

    fn label_name() -> String {
        format!("freeze_start_{}", Utc::now().to_rfc3339())
    }

    async fn xlogfile_name_offset(&self, lsn_expr: &str) -> Result<BackupLabel, LawError> {
        let (client, connection) = tokio_postgres::connect(&self.database_url, NoTls)
            .await
            .map_err(|e| LawError::DatabaseError(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(error = %e, "database collaborator connection closed with an error");
            }
        });

        let query = format!(
            "SELECT file_name, lpad(file_offset::text, 8, '0') \
             FROM pg_xlogfile_name_offset({lsn_expr})"
        );
        let row = client
            .query_one(&query, &[])
            .await
            .map_err(|e| LawError::DatabaseError(e.to_string()))?;
        Ok(BackupLabel {
            name: row.get(0),
            offset: row.get(1),
        })
    }
}

#[async_trait]
impl DatabaseCollaborator for PgQueryCollaborator {
    async fn start_backup(&self) -> Result<BackupLabel, LawError> {
        let label = Self::label_name();
        self.xlogfile_name_offset(&format!("pg_start_backup('{label}')"))
            .await
    }

    async fn stop_backup(&self) -> Result<BackupLabel, LawError> {
        self.xlogfile_name_offset("pg_stop_backup()").await
    }
}

/// Reads a stopped server's control file via `pg_controldata`, for backups
/// taken against a cluster that isn't (and won't be) running.
pub struct PgControlDataCollaborator {
    pg_controldata_path: String,
    data_dir: String,
}

impl PgControlDataCollaborator {
    pub fn new(pg_controldata_path: String, data_dir: String) -> Self {
        Self {
            pg_controldata_path,
            data_dir,
        }
    }

    async fn run_controldata(&self) -> Result<BackupLabel, LawError> {
        let output = tokio::process::Command::new(&self.pg_controldata_path)
            .arg(&self.data_dir)
            .output()
            .await
            .map_err(|e| LawError::DatabaseError(format!("failed to run pg_controldata: {e}")))?;
        if !output.status.success() {
            return Err(LawError::DatabaseError(format!(
                "pg_controldata exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        parse_controldata(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl DatabaseCollaborator for PgControlDataCollaborator {
    async fn start_backup(&self) -> Result<BackupLabel, LawError> {
        self.run_controldata().await
    }

    async fn stop_backup(&self) -> Result<BackupLabel, LawError> {
        self.run_controldata().await
    }
}

/// Extracts "Latest checkpoint's REDO location" and "Latest checkpoint's
/// TimeLineID" from `pg_controldata`'s text output and synthesizes a
/// `BackupLabel` from them, since there's no live server to ask directly.
fn parse_controldata(text: &str) -> Result<BackupLabel, LawError> {
    let redo_location = field(text, "Latest checkpoint's REDO location")?;
    let timeline = field(text, "Latest checkpoint's TimeLineID")?;

    let (segment_hi, segment_lo) = redo_location
        .split_once('/')
        .ok_or_else(|| LawError::DatabaseError(format!("unparseable REDO location: {redo_location}")))?;
    let segment_hi: u64 = u64::from_str_radix(segment_hi, 16)
        .map_err(|e| LawError::DatabaseError(format!("bad REDO location high bits: {e}")))?;
    let segment_lo: u64 = u64::from_str_radix(segment_lo, 16)
        .map_err(|e| LawError::DatabaseError(format!("bad REDO location low bits: {e}")))?;
    let timeline: u32 = timeline
        .trim()
        .parse()
        .map_err(|e| LawError::DatabaseError(format!("bad TimeLineID: {e}")))?;

    let log_segment = segment_lo >> 24;
    let offset = segment_lo & 0x00ff_ffff;
    let name = format!("{timeline:08X}{segment_hi:08X}{log_segment:08X}");
    Ok(BackupLabel {
        name,
        offset: format!("{offset:08X}"),
    })
}

fn field<'a>(text: &'a str, label: &str) -> Result<&'a str, LawError> {
    text.lines()
        .find_map(|line| line.strip_prefix(label))
        .map(|rest| rest.trim_start_matches(':').trim())
        .ok_or_else(|| LawError::DatabaseError(format!("pg_controldata output missing {label:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_redo_location_and_timeline() {
        let text = "Latest checkpoint's TimeLineID:      1\n\
                     Latest checkpoint's REDO location:   0/3000028\n";
        let label = parse_controldata(text).unwrap();
        assert_eq!(label.name, "000000010000000000000003");
        assert_eq!(label.offset, "00000028");
    }

    #[test]
    fn missing_field_is_a_database_error() {
        let err = parse_controldata("nothing useful here\n").unwrap_err();
        assert!(matches!(err, LawError::DatabaseError(_)));
    }
}
