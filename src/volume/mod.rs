//! Volume access: partition discovery and per-partition filesystem readers

pub mod fs;
pub mod partition;

use crate::image::{ImageRead, PartitionReader};

pub use fs::{DirectoryEntry, EntryKind, FileRef, NtfsVolume, VolumeReader};
pub use partition::{read_partitions, Partition, TableKind, SECTOR_SIZE};

/// Try to mount `partition` as NTFS; Err for any other (or damaged) filesystem
pub fn open_ntfs<'a, I: ImageRead + ?Sized>(
    image: &'a mut I,
    partition: &Partition,
) -> Result<NtfsVolume<PartitionReader<'a, I>>, String> {
    let len = (partition.sector_count > 0).then(|| partition.byte_len());
    NtfsVolume::open(PartitionReader::new(image, partition.byte_offset(), len))
}
