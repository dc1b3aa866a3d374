//! EWF (Expert Witness Format) E01 reader
//!
//! Decodes EnCase-style physical images into a flat byte stream:
//! - segment discovery (.E01, .E02, ... .EAA)
//! - section chains across segment files
//! - zlib-compressed and stored chunks, with an LRU chunk cache
//!
//! EWF2 (.Ex01) and logical (.L01) containers are recognised and refused.

mod cache;
mod handle;
mod types;

pub use handle::EwfHandle;
pub use types::StoredImageHash;

#[cfg(test)]
pub(crate) use handle::tests::write_e01_set;
