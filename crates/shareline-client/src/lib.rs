//! Shareline Client - Typed access to remote file shares
//!
//! This crate provides:
//! - [`Connection`]: one logical session to a (server, share) pair, with
//!   delayed establishment and a single transparent reconnect
//! - [`ShareDirectory`] / [`ShareFile`]: value items addressing paths on a share
//! - Listing and regex search over directory trees with a stable order
//! - [`ShareReader`] / [`ShareWriter`]: streams that release their remote
//!   handle exactly once
//! - Transports: [`MemoryTransport`] (in-process) and [`LocalTransport`]
//!   (a local directory tree)
//!
//! # Architecture
//!
//! ```text
//! ShareDirectory / ShareFile ──▶ Arc<Connection> ──share()──▶ ShareHandle
//!        (path values)            (reconnects once)           (transport)
//! ```
//!
//! Items never keep a share handle. Every remote call asks the connection for
//! the live handle, so a stale session is replaced underneath them.
//!
//! # Example
//!
//! ```
//! use std::io::Write;
//! use shareline_client::{MemoryTransport, ShareDirectory, ShareNode};
//! use shareline_core::Credentials;
//!
//! let server = MemoryTransport::new("fileserver").with_share("data");
//! let connection = server.open_connection("data", Credentials::anonymous())?;
//!
//! let root = ShareDirectory::root(connection);
//! let reports = root.create_directory_in_current_directory("reports")?;
//! let file = reports.create_file_in_current_directory("q1.txt")?;
//! file.output_stream()?.write_all(b"numbers")?;
//!
//! let found = root.list_files_matching("q[0-9]\\.txt", true)?;
//! assert_eq!(found[0].full_address(), "\\\\fileserver\\data\\reports\\q1.txt");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod connection;
pub mod directory;
pub mod file;
pub mod item;
pub mod local;
pub mod memory;
pub mod resolve;
pub mod stream;
mod traversal;

pub use connection::Connection;
pub use directory::ShareDirectory;
pub use file::ShareFile;
pub use item::{Location, ShareItem, ShareNode};
pub use local::LocalTransport;
pub use memory::{MemoryStatsSnapshot, MemoryTransport};
pub use resolve::{open_address, resolve};
pub use stream::{ShareReader, ShareWriter};
