//! Thread separators for software-defined-radio pipelines.
//!
//! Fixed-capacity, cache-line-aware queues that move sample batches from a
//! producer thread (a radio receive callback) to a consumer thread (a DSP
//! stage), plus single-thread ring queues for stages interleaved on one
//! thread.
//!
//! - [`registry::Registry`] - queues created once at startup, addressed by id
//! - [`sync::spsc`] - the lock-free [`Producer`]/[`Consumer`] endpoints
//! - [`local::LocalQueues`] - the single-thread counterpart
//!
//! ```
//! use separator::{QueueConfig, Registry, Timeout};
//! use std::time::Duration;
//!
//! let config = QueueConfig::new(2, 64).with_timeout(Timeout::from(Duration::from_secs(5)));
//! let registry = Registry::new(&[config])?;
//! let (mut tx, mut rx) = registry.endpoints(0)?;
//!
//! let rx_thread = std::thread::spawn(move || {
//!     let mut samples = [0i16; 8];
//!     let n = rx.get_many_blocking(separator::sample::as_bytes_mut(&mut samples));
//!     (n, samples)
//! });
//!
//! tx.put_many(separator::sample::as_bytes(&[1i16, 2, 3]))?;
//! tx.finish();
//!
//! let (n, samples) = rx_thread.join().unwrap();
//! assert_eq!(n, 3);
//! assert_eq!(&samples[..3], &[1, 2, 3]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Allow the crate to reference itself as ::separator for derive macro usage
extern crate self as separator;

pub mod bits;
pub mod config;
pub mod error;
pub mod local;
pub mod registry;
pub mod sample;
mod spsc;
pub mod sync;
pub mod trace;
pub mod wait;

pub use config::{LocalConfig, QueueConfig};
pub use error::{ConfigError, QueueError, Side, Signal};
pub use local::{LocalQueue, LocalQueues};
pub use registry::Registry;
pub use sync::spsc::{Consumer, ConsumerStats, Producer, ProducerStats};
pub use trace::init_tracing;
pub use wait::{Backoff, Timeout};

#[doc(inline)]
pub use separator_derive::Sample;

#[doc(inline)]
pub use sample::Sample;

// Hidden re-export for the derive macro
#[doc(hidden)]
pub use sample::Sample as __SamplePrivate;
