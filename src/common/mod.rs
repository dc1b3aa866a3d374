// Common utilities shared by the image layer and the output pipeline

pub mod audit;
pub mod binary;
pub mod hash;
pub mod io_pool;
pub mod path_security;
pub mod segments;

// Re-exports for convenience
pub use hash::{HashAlgorithm, hash_files_with_progress};
pub use io_pool::FileIoPool;

// Shared constants
pub const BUFFER_SIZE: usize = 8 * 1024 * 1024; // 8MB buffer for optimal throughput
