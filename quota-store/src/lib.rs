//! quota-store: File store with capacity accounting
//!
//! A flat namespace of named byte files whose lengths are charged against a
//! capacity ledger. Capacity is requested and released explicitly; files only
//! consume it as their length grows.
//!
//! # Features
//!
//! - **Capacity ledger**: request/release capacity, never overdrawn
//! - **Files**: open (create-if-absent), delete, rename, enumerate
//! - **Handles**: read, write, set length, flush, close
//! - **Async**: Tokio locks; operations on one handle run one at a time
//!
//! # Example
//!
//! ```no_run
//! use quota_store::QuotaFileStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = QuotaFileStore::new();
//!     store.request_capacity(1024).await?;
//!
//!     let file = store.open("data").await?;
//!     let result = file.write(vec![0xDD; 512], 0).await?;
//!     assert_eq!(result.written_bytes, 512);
//!     file.close().await?;
//!
//!     assert_eq!(store.get_remaining_capacity().await, 512);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration management
//! - [`error`]: Error types and handling
//! - [`store`]: The store, its handles and the capacity ledger
//! - [`script`]: Command scripts and built-in scenarios

pub mod config;
pub mod error;
pub mod script;
pub mod store;

// Re-export commonly used types
pub use config::{NamePolicy, StoreConfig};
pub use error::{Result, StoreError};
pub use store::{CapacitySnapshot, FileHandle, QuotaFileStore, ReadResult, WriteResult};
