//! # trackref-source
//!
//! The backend side of trackref: bulk sources that speak wire records,
//! the converter table that turns them into registry entities, and the
//! issue parser and stream that feed a registry.
//!
//! [`SourceLoader`] adapts any [`BulkSource`] to the registry's
//! `BatchLoader` contract.

pub mod adapter;
pub mod config;
pub mod convert;
pub mod parse;
pub mod snapshot;
pub mod stream;
pub mod transport;
pub mod wire;

pub use adapter::SourceLoader;
pub use config::{ConfigError, ResolverConfig, SourceConfig, StreamConfig, TrackerConfig};
pub use convert::{CONVERTERS, ConverterSpec, category_for_kind, convert, converter_for};
pub use parse::IssueParser;
pub use snapshot::{OfflineSource, SnapshotError, SnapshotSource, read_records};
pub use stream::{IssueStream, StreamError};
pub use transport::{BulkSource, TransportError};
pub use wire::{Reference, WireError, WireRecord};
