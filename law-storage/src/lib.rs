//! Storage backends for the archiver/restorer: a local filesystem backend
//! used by tests and single-host setups, and a hand-written S3 client used
//! in production. Both speak the same [`RemoteStorage`]/[`Sink`]/[`Source`]
//! contract so the pipeline above never needs to know which one it's talking
//! to.

mod error;
mod file_backend;
mod remote;
mod s3;
mod sink;

pub use error::StorageError;
pub use file_backend::FileBackend;
pub use remote::{from_ssn, natural_key_order, RemoteStorage};
pub use s3::{sign::AwsCredentials, S3Bucket};
pub use sink::{write_all_and_close, Sink, Source};
