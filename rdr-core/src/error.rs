//! Error types for RDR reference-data operations

use crate::ReferenceTable;
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found in {table} with key {key}")]
    NotFound { table: ReferenceTable, key: String },

    #[error("Insert failed for {table}: {reason}")]
    InsertFailed { table: ReferenceTable, reason: String },

    #[error("Update failed for {table} with key {key}: {reason}")]
    UpdateFailed {
        table: ReferenceTable,
        key: String,
        reason: String,
    },

    #[error("Full table load failed for {table}: {reason}")]
    LoadFailed { table: ReferenceTable, reason: String },

    #[error("Index error on {index_name}: {reason}")]
    IndexError { index_name: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Cache registry and entity cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache slot {slot} out of range (capacity {capacity})")]
    SlotOutOfRange { slot: usize, capacity: usize },

    #[error("Recursive cache build detected for slot {slot}")]
    RecursiveBuild { slot: usize },

    #[error("Cache slot {slot} holds a value of a different type")]
    SlotTypeMismatch { slot: usize },

    #[error("Index {index_name} on {table} has duplicate key {key}")]
    IndexCollision {
        table: ReferenceTable,
        index_name: String,
        key: String,
    },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Version mismatch on {table} with key {key}: expected {expected}, found {actual}")]
    VersionMismatch {
        table: ReferenceTable,
        key: String,
        expected: i64,
        actual: i64,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all RDR errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RdrError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for RDR operations.
pub type RdrResult<T> = Result<T, RdrError>;

// =============================================================================
// TESTS
// =============================================================================
