// Shared File I/O Pool for segment file handles
//
// Split images (E01 sets, numbered raw splits) can run to hundreds of
// segment files. The pool keeps at most `max_open` of them open and evicts
// the least recently used handle when another segment is needed.

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::path::PathBuf;
use tracing::{debug, trace};

/// Default maximum number of simultaneously open file handles
pub const DEFAULT_MAX_OPEN_FILES: usize = 16;

/// Manages segment file handles with LRU eviction
pub struct FileIoPool {
    /// Paths to all segment files in order
    file_paths: Vec<PathBuf>,
    /// Currently open file handles (file_index -> File)
    open_handles: HashMap<usize, File>,
    /// Most recently used at the front
    lru_queue: VecDeque<usize>,
    max_open: usize,
}

impl FileIoPool {
    /// Create a new file pool with specified paths and max open limit
    pub fn new(file_paths: Vec<PathBuf>, max_open: usize) -> Self {
        Self {
            file_paths,
            open_handles: HashMap::new(),
            lru_queue: VecDeque::new(),
            max_open: max_open.max(1),
        }
    }

    /// Get a file handle, opening it if necessary
    pub fn get_file(&mut self, file_index: usize) -> Result<&mut File, String> {
        if file_index >= self.file_paths.len() {
            return Err(format!(
                "File index {} out of range (have {} files)",
                file_index,
                self.file_paths.len()
            ));
        }

        if self.open_handles.contains_key(&file_index) {
            self.lru_queue.retain(|&x| x != file_index);
            self.lru_queue.push_front(file_index);
            trace!(file_index, "File handle cache hit");
        } else {
            if self.open_handles.len() >= self.max_open {
                if let Some(lru_index) = self.lru_queue.pop_back() {
                    trace!(lru_index, "Evicting LRU file handle");
                    self.open_handles.remove(&lru_index);
                }
            }

            let file_path = &self.file_paths[file_index];
            debug!(file_index, path = %file_path.display(), "Opening segment file");
            let file = File::open(file_path)
                .map_err(|e| format!("Failed to open segment {}: {}", file_path.display(), e))?;
            self.open_handles.insert(file_index, file);
            self.lru_queue.push_front(file_index);
        }

        self.open_handles
            .get_mut(&file_index)
            .ok_or_else(|| format!("Segment {} handle vanished from pool", file_index))
    }

    /// Get the number of files in the pool
    pub fn file_count(&self) -> usize {
        self.file_paths.len()
    }

    /// All segment paths in order
    pub fn paths(&self) -> &[PathBuf] {
        &self.file_paths
    }

    /// Get the number of currently open handles
    pub fn open_count(&self) -> usize {
        self.open_handles.len()
    }

    /// Close all open file handles
    pub fn close_all(&mut self) {
        self.open_handles.clear();
        self.lru_queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use tempfile::TempDir;

    #[test]
    fn test_file_pool_eviction() {
        let temp_dir = TempDir::new().unwrap();
        let mut paths = Vec::new();
        for i in 0..5 {
            let path = temp_dir.path().join(format!("disk.E{:02}", i + 1));
            let mut file = File::create(&path).unwrap();
            file.write_all(&[i as u8; 16]).unwrap();
            paths.push(path);
        }

        let mut pool = FileIoPool::new(paths, 3);
        assert_eq!(pool.file_count(), 5);
        assert_eq!(pool.open_count(), 0);

        pool.get_file(0).unwrap();
        pool.get_file(1).unwrap();
        pool.get_file(2).unwrap();
        assert_eq!(pool.open_count(), 3);

        pool.get_file(3).unwrap();
        assert_eq!(pool.open_count(), 3);

        let mut byte = [0u8; 1];
        pool.get_file(4).unwrap().read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], 4);

        pool.close_all();
        assert_eq!(pool.open_count(), 0);
    }

    #[test]
    fn test_file_pool_evicts_least_recently_used() {
        let temp_dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..3)
            .map(|i| {
                let path = temp_dir.path().join(format!("disk.E{:02}", i + 1));
                std::fs::write(&path, [i as u8; 4]).unwrap();
                path
            })
            .collect();

        let mut pool = FileIoPool::new(paths, 2);
        pool.get_file(0).unwrap();
        pool.get_file(1).unwrap();
        // Touching 0 leaves 1 as the eviction candidate
        pool.get_file(0).unwrap();
        pool.get_file(2).unwrap();

        assert_eq!(pool.open_count(), 2);
        assert!(pool.open_handles.contains_key(&0));
        assert!(!pool.open_handles.contains_key(&1));
        assert_eq!(pool.lru_queue, VecDeque::from([2, 0]));

        // Reopening an evicted segment still reads its own bytes
        let mut byte = [0u8; 1];
        pool.get_file(1).unwrap().read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], 1);
        assert!(!pool.open_handles.contains_key(&0));
    }

    #[test]
    fn test_file_pool_out_of_range() {
        let mut pool = FileIoPool::new(Vec::new(), 3);
        assert!(pool.get_file(0).is_err());
    }
}
