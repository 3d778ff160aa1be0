//! Persistent response cache.
//!
//! Responses are stored one file per key under the cache directory:
//!
//! ```text
//! <cache_dir>/
//!   <key>.json           {"payload", "created_at", "format_version"}
//!   .locks/<key>.lck     reader/writer lock for the entry
//!   .maintenance.lock    marker held while clearing or cleaning
//! ```
//!
//! Keys are SHA-256 digests of the request fields, see [`generate_key`].
//!
//! Lock files under `.locks/` are never removed, not by `clear` or `clean`
//! either: a process may be waiting on one, and a replacement would be a
//! different lock. The directory gains one empty file per key ever written.
//! These files do not count toward `max_entries` or `max_bytes`. Removing
//! the directory by hand is safe only while no cmdgpt process is running.

mod entry;
mod key;
mod store;


pub use entry::{CacheEntry, ENTRY_FORMAT_VERSION};
pub use key::{KEY_LEN, generate_key, validate_key};
pub use store::{CacheSettings, CacheStats, ResponseCache};
