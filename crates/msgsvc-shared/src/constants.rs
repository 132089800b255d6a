//! Application-wide constants

pub const DEFAULT_HISTORY_LIMIT: u32 = 20;
pub const MAX_HISTORY_LIMIT: u32 = 100;
pub const DEFAULT_CACHE_MAX_SIZE: usize = 100;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 60;
pub const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_MAX_PARTITIONS: usize = 10_000;
pub const DEFAULT_EVENT_BUFFER: usize = 1_024;

/// Placeholder rendered in place of content that failed to decrypt.
pub const UNREADABLE_CONTENT: &str = "[UNREADABLE]";

/// AES-256 key length in bytes.
pub const ENCRYPTION_KEY_LEN: usize = 32;
