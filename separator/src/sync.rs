//! Synchronization primitives for in-process communication.
//!
//! This module provides the thread-separator endpoints used to move sample
//! batches between threads within the same process.

pub mod spsc;
