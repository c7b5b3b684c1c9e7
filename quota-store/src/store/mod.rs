/// Quota-tracked file store
///
/// This module provides:
/// - A flat namespace of named byte files
/// - A capacity ledger that every length change is charged against
/// - File handles with read/write/setLength access

pub mod handle;
pub mod ledger;

pub use handle::{FileHandle, ReadResult, WriteResult};
pub use ledger::{CapacityLedger, CapacitySnapshot};

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{NamePolicy, StoreConfig};
use crate::error::{Result, StoreError};

/// One file in the namespace, shared by every handle opened on it
#[derive(Debug, Default)]
pub(crate) struct FileEntry {
    pub(crate) content: RwLock<Vec<u8>>,
    pub(crate) open_handles: AtomicUsize,
}

impl FileEntry {
    fn is_open(&self) -> bool {
        self.open_handles.load(Ordering::Acquire) > 0
    }
}

/// Namespace and ledger, always locked together
#[derive(Debug)]
pub(crate) struct StoreState {
    pub(crate) files: HashMap<String, Arc<FileEntry>>,
    pub(crate) ledger: CapacityLedger,
}

#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) state: Mutex<StoreState>,
    names: NamePolicy,
}

/// File store with capacity accounting for one execution context.
///
/// Cloning is cheap; clones share the same namespace and ledger.
#[derive(Debug, Clone)]
pub struct QuotaFileStore {
    shared: Arc<Shared>,
}

impl QuotaFileStore {
    /// Create an empty store with no capacity
    pub fn new() -> Self {
        QuotaFileStore {
            shared: Arc::new(Shared {
                state: Mutex::new(StoreState {
                    files: HashMap::new(),
                    ledger: CapacityLedger::new(None),
                }),
                names: NamePolicy::Any,
            }),
        }
    }

    /// Create a store from configuration
    pub fn with_config(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let mut ledger = CapacityLedger::new(config.capacity_limit);
        ledger.grant(config.initial_capacity)?;

        info!(
            "Created store with {} bytes of capacity (limit: {:?}, names: {:?})",
            config.initial_capacity, config.capacity_limit, config.names
        );

        Ok(QuotaFileStore {
            shared: Arc::new(Shared {
                state: Mutex::new(StoreState {
                    files: HashMap::new(),
                    ledger,
                }),
                names: config.names,
            }),
        })
    }

    /// Open the named file, creating it empty if it does not exist
    pub async fn open(&self, name: &str) -> Result<FileHandle> {
        self.shared.names.check(name)?;

        let mut state = self.shared.state.lock().await;
        let entry = match state.files.get(name).cloned() {
            Some(entry) => entry,
            None => {
                let entry = Arc::new(FileEntry::default());
                state.files.insert(name.to_string(), Arc::clone(&entry));
                info!("Created file {}", name);
                entry
            }
        };
        let handles = entry.open_handles.fetch_add(1, Ordering::AcqRel) + 1;
        debug!("Opened {} ({} open handles)", name, handles);

        Ok(FileHandle::new(
            name.to_string(),
            entry,
            Arc::clone(&self.shared),
        ))
    }

    /// Remove the named file and return its capacity to the ledger
    pub async fn delete(&self, name: &str) -> Result<()> {
        let mut state = self.shared.state.lock().await;

        let entry = state
            .files
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        if entry.is_open() {
            return Err(StoreError::FileInUse(name.to_string()));
        }
        let length = entry.content.read().await.len() as u64;

        state.files.remove(name);
        state.ledger.reclaim(length);

        info!(
            "Deleted {} ({} bytes returned, {} remaining)",
            name,
            length,
            state.ledger.remaining()
        );
        Ok(())
    }

    /// All file names, sorted
    pub async fn get_all(&self) -> Vec<String> {
        let state = self.shared.state.lock().await;
        let mut names: Vec<String> = state.files.keys().cloned().collect();
        names.sort();
        names
    }

    /// Move a file to a new name; its length stays charged to the ledger
    pub async fn rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.shared.names.check(new_name)?;

        let mut state = self.shared.state.lock().await;

        let entry = state
            .files
            .get(old_name)
            .ok_or_else(|| StoreError::NotFound(old_name.to_string()))?;
        if old_name == new_name {
            return Ok(());
        }
        if state.files.contains_key(new_name) {
            return Err(StoreError::AlreadyExists(new_name.to_string()));
        }
        if entry.is_open() {
            return Err(StoreError::FileInUse(old_name.to_string()));
        }

        if let Some(entry) = state.files.remove(old_name) {
            state.files.insert(new_name.to_string(), entry);
        }

        info!("Renamed {} to {}", old_name, new_name);
        Ok(())
    }

    /// Ask for more capacity. Returns the remaining capacity afterwards.
    pub async fn request_capacity(&self, amount: u64) -> Result<u64> {
        let mut state = self.shared.state.lock().await;

        let granted = state.ledger.grant(amount)?;
        if granted < amount {
            warn!(
                "Capacity request for {} bytes capped at {} by limit",
                amount, granted
            );
        }
        let remaining = state.ledger.remaining();

        info!("Granted {} bytes ({} remaining)", granted, remaining);
        Ok(remaining)
    }

    /// Give back unused capacity. Returns the remaining capacity afterwards.
    pub async fn release_capacity(&self, amount: u64) -> Result<u64> {
        let mut state = self.shared.state.lock().await;

        if let Err(e) = state.ledger.release(amount) {
            warn!("Refused capacity release: {}", e);
            return Err(e);
        }
        let remaining = state.ledger.remaining();

        info!("Released {} bytes ({} remaining)", amount, remaining);
        Ok(remaining)
    }

    /// Capacity not backing any file length
    pub async fn get_remaining_capacity(&self) -> u64 {
        self.shared.state.lock().await.ledger.remaining()
    }

    pub async fn capacity_snapshot(&self) -> CapacitySnapshot {
        self.shared.state.lock().await.ledger.snapshot()
    }

    /// Check if a file exists
    pub async fn exists(&self, name: &str) -> bool {
        self.shared.state.lock().await.files.contains_key(name)
    }

    /// Number of open handles on a file
    pub async fn open_handles(&self, name: &str) -> Result<usize> {
        let state = self.shared.state.lock().await;
        state
            .files
            .get(name)
            .map(|entry| entry.open_handles.load(Ordering::Acquire))
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }
}

impl Default for QuotaFileStore {
    fn default() -> Self {
        Self::new()
    }
}
