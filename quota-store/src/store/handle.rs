use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{FileEntry, Shared};
use crate::error::{Result, StoreError};

/// Result of [`FileHandle::read`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    /// The caller's buffer, filled from the front
    pub buffer: Vec<u8>,
    /// Bytes copied into `buffer`
    pub read_bytes: usize,
}

/// Result of [`FileHandle::write`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    /// The caller's buffer, unchanged
    pub buffer: Vec<u8>,
    /// Bytes written to the file
    pub written_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleState {
    Open,
    Closed,
}

/// An open file.
///
/// Operations on one handle run one at a time. Every handle on the same
/// file sees the same content. Length growth is charged to the store's
/// capacity ledger in the same step that changes the content.
#[derive(Debug)]
pub struct FileHandle {
    name: String,
    entry: Arc<FileEntry>,
    shared: Arc<Shared>,
    state: Mutex<HandleState>,
}

impl FileHandle {
    pub(crate) fn new(name: String, entry: Arc<FileEntry>, shared: Arc<Shared>) -> Self {
        FileHandle {
            name,
            entry,
            shared,
            state: Mutex::new(HandleState::Open),
        }
    }

    /// Name the file was opened under
    pub fn name(&self) -> &str {
        &self.name
    }

    fn ensure_open(&self, state: HandleState) -> Result<()> {
        match state {
            HandleState::Open => Ok(()),
            HandleState::Closed => Err(StoreError::InvalidHandle(self.name.clone())),
        }
    }

    /// Flush and close the handle. Any later call fails with `InvalidHandle`.
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.ensure_open(*state)?;

        *state = HandleState::Closed;
        let handles = self.entry.open_handles.fetch_sub(1, Ordering::AcqRel) - 1;

        debug!("Closed {} ({} open handles)", self.name, handles);
        Ok(())
    }

    /// Make all completed writes visible.
    ///
    /// Content and ledger change together under the store lock, so a write is
    /// already visible when it returns; this only checks the handle.
    pub async fn flush(&self) -> Result<()> {
        let state = self.state.lock().await;
        self.ensure_open(*state)?;

        debug!("Flushed {}", self.name);
        Ok(())
    }

    /// Current length in bytes
    pub async fn get_length(&self) -> Result<u64> {
        let state = self.state.lock().await;
        self.ensure_open(*state)?;

        let length = self.entry.content.read().await.len() as u64;
        debug!("Length of {} is {}", self.name, length);
        Ok(length)
    }

    /// Truncate or zero-extend the file, charging the difference to the ledger
    pub async fn set_length(&self, length: u64) -> Result<()> {
        let state = self.state.lock().await;
        self.ensure_open(*state)?;

        let mut store = self.shared.state.lock().await;
        let mut content = self.entry.content.write().await;
        let old_len = content.len();

        if let Err(e) = store.ledger.check(length.saturating_sub(old_len as u64)) {
            warn!("Refused to resize {} to {} bytes: {}", self.name, length, e);
            return Err(e);
        }
        let new_len = to_usize(length)?;
        if new_len > old_len {
            reserve(&mut content, new_len)?;
        }
        store.ledger.adjust(old_len as u64, length)?;
        content.resize(new_len, 0);

        debug!(
            "Set length of {} from {} to {} ({} remaining)",
            self.name,
            old_len,
            new_len,
            store.ledger.remaining()
        );
        Ok(())
    }

    /// Read up to `buffer.len()` bytes starting at `offset`.
    ///
    /// Reading at or past the end of the file is not an error; it reads 0
    /// bytes.
    pub async fn read(&self, mut buffer: Vec<u8>, offset: u64) -> Result<ReadResult> {
        let state = self.state.lock().await;
        self.ensure_open(*state)?;

        let content = self.entry.content.read().await;
        let read_bytes = match usize::try_from(offset) {
            Ok(start) if start < content.len() => {
                let count = buffer.len().min(content.len() - start);
                buffer[..count].copy_from_slice(&content[start..start + count]);
                count
            }
            _ => 0,
        };

        debug!(
            "Read {} of {} bytes from {} at offset {}",
            read_bytes,
            buffer.len(),
            self.name,
            offset
        );
        Ok(ReadResult { buffer, read_bytes })
    }

    /// Write all of `buffer` at `offset`, growing the file if needed.
    ///
    /// If the growth cannot be covered by the remaining capacity nothing is
    /// written.
    pub async fn write(&self, buffer: Vec<u8>, offset: u64) -> Result<WriteResult> {
        let state = self.state.lock().await;
        self.ensure_open(*state)?;

        if buffer.is_empty() {
            return Ok(WriteResult {
                buffer,
                written_bytes: 0,
            });
        }

        let end = offset
            .checked_add(buffer.len() as u64)
            .ok_or_else(|| StoreError::invalid_argument("write extends past u64::MAX"))?;
        let mut store = self.shared.state.lock().await;
        let mut content = self.entry.content.write().await;
        let old_len = content.len();

        let growth = end.saturating_sub(old_len as u64);
        if let Err(e) = store.ledger.check(growth) {
            warn!(
                "Refused write of {} bytes to {} at offset {}: {}",
                buffer.len(),
                self.name,
                offset,
                e
            );
            return Err(e);
        }
        let start = to_usize(offset)?;
        let end_usize = to_usize(end)?;
        if growth > 0 {
            reserve(&mut content, end_usize)?;
            store.ledger.consume(growth)?;
            content.resize(end_usize, 0);
        }
        content[start..end_usize].copy_from_slice(&buffer);

        debug!(
            "Wrote {} bytes to {} at offset {} (length {}, {} remaining)",
            buffer.len(),
            self.name,
            offset,
            content.len(),
            store.ledger.remaining()
        );
        let written_bytes = buffer.len();
        Ok(WriteResult {
            buffer,
            written_bytes,
        })
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if *self.state.get_mut() == HandleState::Open {
            self.entry.open_handles.fetch_sub(1, Ordering::AcqRel);
            warn!("Handle for {} dropped without close", self.name);
        }
    }
}

fn to_usize(value: u64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| StoreError::invalid_argument(format!("{} exceeds addressable size", value)))
}

/// Make room for `len` bytes before anything is charged
fn reserve(content: &mut Vec<u8>, len: usize) -> Result<()> {
    content
        .try_reserve(len - content.len())
        .map_err(|e| StoreError::invalid_argument(format!("cannot grow to {} bytes: {}", len, e)))
}

#[cfg(test)]
mod tests {
    use crate::error::StoreError;
    use crate::store::QuotaFileStore;

    async fn store_with_capacity(capacity: u64) -> QuotaFileStore {
        let store = QuotaFileStore::new();
        store.request_capacity(capacity).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_write_at_start() {
        let store = store_with_capacity(1024).await;
        let file = store.open("f").await.unwrap();

        let result = file.write(vec![0xDD; 512], 0).await.unwrap();
        assert_eq!(result.written_bytes, 512);
        assert_eq!(result.buffer.len(), 512);
        assert_eq!(file.get_length().await.unwrap(), 512);
        assert_eq!(store.get_remaining_capacity().await, 512);
        file.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_sparse_write_zero_fills() {
        let store = store_with_capacity(1024).await;
        let file = store.open("f").await.unwrap();

        file.write(vec![0xDD; 512], 512).await.unwrap();
        assert_eq!(file.get_length().await.unwrap(), 1024);
        assert_eq!(store.get_remaining_capacity().await, 0);

        let result = file.read(vec![0xFF; 512], 0).await.unwrap();
        assert_eq!(result.read_bytes, 512);
        assert!(result.buffer.iter().all(|&b| b == 0));

        let result = file.read(vec![0; 512], 512).await.unwrap();
        assert_eq!(result.read_bytes, 512);
        assert!(result.buffer.iter().all(|&b| b == 0xDD));
        file.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_overwrite_inside_file_costs_nothing() {
        let store = store_with_capacity(100).await;
        let file = store.open("f").await.unwrap();
        file.write(vec![1; 100], 0).await.unwrap();

        file.write(vec![2; 50], 25).await.unwrap();
        assert_eq!(file.get_length().await.unwrap(), 100);
        assert_eq!(store.get_remaining_capacity().await, 0);

        let result = file.read(vec![0; 100], 0).await.unwrap();
        assert_eq!(&result.buffer[..25], &[1; 25]);
        assert_eq!(&result.buffer[25..75], &[2; 50]);
        assert_eq!(&result.buffer[75..], &[1; 25]);
        file.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_insufficient_capacity_commits_nothing() {
        let store = store_with_capacity(100).await;
        let file = store.open("f").await.unwrap();
        file.write(vec![7; 60], 0).await.unwrap();

        let err = file.write(vec![9; 60], 50).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientCapacity {
                requested: 50,
                remaining: 40
            }
        ));
        assert_eq!(file.get_length().await.unwrap(), 60);
        assert_eq!(store.get_remaining_capacity().await, 40);

        let result = file.read(vec![0; 60], 0).await.unwrap();
        assert!(result.buffer.iter().all(|&b| b == 7));
        file.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_far_growth_reports_insufficient_capacity() {
        let store = store_with_capacity(16).await;
        let file = store.open("f").await.unwrap();

        let err = file.write(vec![1], 1 << 60).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientCapacity { remaining: 16, .. }
        ));

        let err = file.set_length(1 << 60).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientCapacity {
                requested: 1152921504606846976,
                remaining: 16
            }
        ));

        assert_eq!(file.get_length().await.unwrap(), 0);
        assert_eq!(store.get_remaining_capacity().await, 16);
        file.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_growth_reserves_no_memory() {
        let store = store_with_capacity(8).await;
        let file = store.open("f").await.unwrap();
        file.write(vec![1; 8], 0).await.unwrap();

        assert!(file.write(vec![2], 1 << 28).await.is_err());
        assert!(file.set_length(1 << 28).await.is_err());
        assert!(file.entry.content.read().await.capacity() < 1 << 28);
        file.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_write_does_not_extend() {
        let store = QuotaFileStore::new();
        let file = store.open("f").await.unwrap();
        let result = file.write(Vec::new(), 4096).await.unwrap();
        assert_eq!(result.written_bytes, 0);
        assert_eq!(file.get_length().await.unwrap(), 0);
        file.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_offset_overflow() {
        let store = QuotaFileStore::new();
        let file = store.open("f").await.unwrap();
        let err = file.write(vec![1; 2], u64::MAX).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
        file.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_past_end() {
        let store = store_with_capacity(10).await;
        let file = store.open("f").await.unwrap();
        file.write(vec![3; 10], 0).await.unwrap();

        let result = file.read(vec![0; 8], 6).await.unwrap();
        assert_eq!(result.read_bytes, 4);
        assert_eq!(&result.buffer[..4], &[3; 4]);
        assert_eq!(&result.buffer[4..], &[0; 4]);

        let result = file.read(vec![0; 8], 10).await.unwrap();
        assert_eq!(result.read_bytes, 0);

        let result = file.read(vec![0; 8], u64::MAX).await.unwrap();
        assert_eq!(result.read_bytes, 0);
        file.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_set_length_grow_and_shrink() {
        let store = store_with_capacity(1024).await;
        let file = store.open("f").await.unwrap();

        file.set_length(1024).await.unwrap();
        assert_eq!(store.get_remaining_capacity().await, 0);

        let err = store.release_capacity(1).await.unwrap_err();
        assert!(err.is_capacity_error());

        file.set_length(256).await.unwrap();
        assert_eq!(file.get_length().await.unwrap(), 256);
        assert_eq!(store.get_remaining_capacity().await, 768);

        file.set_length(0).await.unwrap();
        assert_eq!(store.get_remaining_capacity().await, 1024);
        file.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_set_length_insufficient_capacity() {
        let store = store_with_capacity(10).await;
        let file = store.open("f").await.unwrap();

        let err = file.set_length(11).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientCapacity { .. }));
        assert_eq!(file.get_length().await.unwrap(), 0);
        assert_eq!(store.get_remaining_capacity().await, 10);
        file.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_set_length_truncates_content() {
        let store = store_with_capacity(8).await;
        let file = store.open("f").await.unwrap();
        file.write(vec![5; 8], 0).await.unwrap();
        file.set_length(4).await.unwrap();
        file.set_length(8).await.unwrap();

        let result = file.read(vec![0xFF; 8], 0).await.unwrap();
        assert_eq!(result.buffer, vec![5, 5, 5, 5, 0, 0, 0, 0]);
        file.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_handle_rejects_operations() {
        let store = store_with_capacity(10).await;
        let file = store.open("f").await.unwrap();
        file.close().await.unwrap();

        assert!(matches!(
            file.close().await.unwrap_err(),
            StoreError::InvalidHandle(_)
        ));
        assert!(matches!(
            file.flush().await.unwrap_err(),
            StoreError::InvalidHandle(_)
        ));
        assert!(file.get_length().await.is_err());
        assert!(file.set_length(1).await.is_err());
        assert!(file.read(vec![0; 1], 0).await.is_err());
        assert!(file.write(vec![0; 1], 0).await.is_err());
        assert_eq!(store.get_remaining_capacity().await, 10);
    }

    #[tokio::test]
    async fn test_handles_share_content() {
        let store = store_with_capacity(16).await;
        let writer = store.open("f").await.unwrap();
        let reader = store.open("f").await.unwrap();
        assert_eq!(store.open_handles("f").await.unwrap(), 2);

        writer.write(b"hello".to_vec(), 0).await.unwrap();
        writer.flush().await.unwrap();

        let result = reader.read(vec![0; 5], 0).await.unwrap();
        assert_eq!(result.buffer, b"hello".to_vec());
        assert_eq!(reader.get_length().await.unwrap(), 5);

        writer.close().await.unwrap();
        reader.close().await.unwrap();
        assert_eq!(store.open_handles("f").await.unwrap(), 0);
        assert_eq!(store.get_remaining_capacity().await, 11);
    }

    #[tokio::test]
    async fn test_concurrent_writers_never_overdraw() {
        let store = store_with_capacity(1000).await;
        let mut tasks = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let file = store.open(&format!("f{}", i)).await.unwrap();
                let result = file.write(vec![1; 100], 0).await;
                file.close().await.unwrap();
                result.is_ok()
            }));
        }

        let mut written = 0;
        for task in tasks {
            if task.await.unwrap() {
                written += 1;
            }
        }
        assert_eq!(written, 10);
        assert_eq!(store.get_remaining_capacity().await, 0);
    }

    #[tokio::test]
    async fn test_name() {
        let store = QuotaFileStore::new();
        let file = store.open("data_file").await.unwrap();
        assert_eq!(file.name(), "data_file");

        let err = store.rename("data_file", "other").await.unwrap_err();
        assert!(matches!(err, StoreError::FileInUse(_)));
        assert_eq!(file.name(), "data_file");
        file.close().await.unwrap();
    }
}
