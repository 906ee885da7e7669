// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The storage port: an abstract keyed blob store.
//!
//! Keys are slash-separated paths like `tasks/task-01J…`. Back-ends must
//! make `write` atomic per key and `list` return keys in lexicographic
//! order (ULID keys therefore come back in creation order).

use async_trait::async_trait;

/// Errors surfaced by storage back-ends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl From<StorageError> for toil_core::Error {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(key) => {
                toil_core::Error::not_found(format!("record not found: {}", key))
            }
            StorageError::InvalidKey(key) => {
                toil_core::Error::invalid_argument(format!("invalid storage key: {}", key))
            }
            other => toil_core::Error::internal("storage failure").with_cause(other),
        }
    }
}

/// Abstract keyed blob store.
#[async_trait]
pub trait StoragePort: Send + Sync + 'static {
    /// Read the blob at `key`. `NotFound` if absent.
    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Write the blob at `key`, creating parent prefixes as needed.
    /// Must be atomic: readers never observe partial writes.
    async fn write(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete the blob at `key`. Deleting an absent key is `NotFound`.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// List keys under a prefix, lexicographically ordered.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// True if a blob exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}
