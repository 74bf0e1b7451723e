//! Core thread-separator ring.
//!
//! This module contains the slotted flag ring used by:
//! - [`crate::sync::spsc`] - the `Producer`/`Consumer` endpoints
//! - [`crate::registry`] - handle-addressed observation and maintenance

pub(crate) mod ring;
