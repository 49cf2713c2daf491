//! Cluster-directory archiving: walking a cluster into a policy-filtered
//! entry list, splitting that list into size/count-bounded partitions, and
//! streaming each partition to and from tar.

mod partition;
mod tar_io;
mod walker;

pub use partition::{partition, Partition};
pub use tar_io::{read_into_directory, write_partition};
pub use walker::{walk, EntryKind, FileEntry};
