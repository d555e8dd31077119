//! `mss_bridge` — bridges a codec library to a host's pull-model media stream source.
//!
//! The host (the *MSS*) pulls samples on demand; this crate answers by pulling
//! packets out of a demuxer and handing them over with host timestamps and
//! stream selection semantics.
//!
//! This crate provides:
//! - Session creation from a byte stream or a url (`Interop`)
//! - Preference-aware stream enumeration and selection
//! - Seeking with time-base conversion
//! - A custom I/O shim over host byte sources
//! - A Symphonia-backed codec library and an in-process MSS (`PullSource`)

// Session entry points (most consumers should start here).
pub mod adapter;
pub mod config;

// The two contracts the adapter sits between.
pub mod codec;
pub mod mss;

// Host-provided bytes and the custom I/O shim over them.
pub mod byte_source;
pub mod io_context;

// Per-stream sample delivery.
pub mod reader;
pub mod sample_provider;
pub mod stream_factory;

pub mod metadata;
pub mod pull_source;
pub mod time;

// Built-in codec library.
pub mod backends;

// Logging configuration and control.
#[cfg(feature = "logging")]
pub mod logging;

mod error;
mod open;

#[cfg(test)]
mod test_support;

pub use adapter::Interop;
#[cfg(feature = "async-source")]
pub use byte_source::AsyncByteSource;
pub use byte_source::ByteSource;
pub use config::{Config, Dictionary};
pub use error::{Error, Result};
pub use mss::{MediaStreamSource, StreamDescriptor};
pub use pull_source::PullSource;
