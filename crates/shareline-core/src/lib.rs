//! Shareline Core - Shared types, path model, and transport traits
//!
//! This crate contains the foundational types used across all Shareline components.
//! It performs no network or filesystem I/O itself; transports implement the
//! traits in [`transport`] and the client crate drives them.

pub mod address;
pub mod config;
pub mod error;
pub mod path;
pub mod transport;
pub mod types;

pub use address::ShareAddress;
pub use config::{Config, ConnectionConfig, LocalConfig};
pub use error::*;
pub use path::SharePath;
pub use transport::{
    ReadStream, RemoteFile, ShareHandle, ShareTransport, TransportResult, TransportSession,
    WriteStream,
};
pub use types::*;

/// Separator between segments of a share-relative path
pub const PATH_SEPARATOR: char = '/';

/// Separator used by UNC addresses (`\\server\share\path`)
pub const UNC_SEPARATOR: char = '\\';

/// Maximum path length in bytes
pub const MAX_PATH_LEN: usize = 4096;

/// Maximum filename length in bytes
pub const MAX_FILENAME_LEN: usize = 255;
