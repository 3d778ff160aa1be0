//! Filesystem utilities for cmdgpt.
//!
//! This module provides the atomic-write primitive that every persisted piece
//! of shared state goes through.

pub mod atomic;

pub use atomic::AtomicFileWriter;
pub use atomic::atomic_write;
pub use atomic::atomic_write_file;
