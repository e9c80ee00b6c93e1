//! Building items from full addresses
//!
//! `\\server\share\path` is split into its parts, a connection to the share
//! is opened and the path is classified:
//! - the share root is always a directory
//! - an existing entry becomes an item of its actual kind
//! - an absent entry follows the [`CreationStrategy`]

use std::sync::Arc;

use tracing::debug;

use shareline_core::{
    ConnectionConfig, CreationStrategy, Credentials, EntryKind, Result, ShareAddress, ShareError,
    SharePath, ShareTransport,
};

use crate::connection::Connection;
use crate::item::{Location, ShareItem};

/// Connect to the share named in `address` and build the item it points at.
///
/// The connection is owned by the returned item; reach it through
/// [`crate::ShareNode::connection`] to close it.
pub fn open_address(
    transport: Arc<dyn ShareTransport>,
    address: &str,
    credentials: Credentials,
    config: ConnectionConfig,
    strategy: CreationStrategy,
) -> Result<ShareItem> {
    let parsed = ShareAddress::parse(address)?;
    let connection = Connection::from_config(
        transport,
        parsed.server.clone(),
        parsed.share.clone(),
        credentials,
        config,
    )?;
    resolve(Arc::new(connection), parsed.path, strategy)
}

/// Build the item at `path` on `connection`, classified by what exists there
pub fn resolve(
    connection: Arc<Connection>,
    path: SharePath,
    strategy: CreationStrategy,
) -> Result<ShareItem> {
    let location = Location::new(connection, path);
    if location.path().is_root() {
        return Ok(ShareItem::build(location, EntryKind::Directory));
    }

    let kind = match location.probe()? {
        Some(kind) => kind,
        None => match strategy {
            CreationStrategy::AsDirectory => EntryKind::Directory,
            CreationStrategy::AsFile => EntryKind::File,
            CreationStrategy::FailIfAbsent => {
                return Err(ShareError::PathResolution {
                    address: location.address().to_unc(),
                    reason: "no such file or directory".to_string(),
                })
            }
        },
    };

    debug!("Resolved {:?} as {}", location, kind);
    Ok(ShareItem::build(location, kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ShareNode;
    use crate::memory::MemoryTransport;

    fn transport() -> MemoryTransport {
        let transport = MemoryTransport::new("fileserver").with_share("data");
        transport.put_dir("data", "Directory").unwrap();
        transport.put_file("data", "Directory/File", b"x").unwrap();
        transport
    }

    fn open(transport: &MemoryTransport, address: &str, strategy: CreationStrategy) -> Result<ShareItem> {
        open_address(
            Arc::new(transport.clone()),
            address,
            Credentials::anonymous(),
            ConnectionConfig::default(),
            strategy,
        )
    }

    #[test]
    fn test_existing_entries_use_actual_kind() {
        let transport = transport();

        let item = open(&transport, "\\\\fileserver\\data\\Directory", CreationStrategy::AsFile).unwrap();
        assert_eq!(item.kind(), EntryKind::Directory);
        assert_eq!(item.path(), "Directory");

        let item = open(&transport, "\\\\fileserver\\data\\Directory\\File", CreationStrategy::AsDirectory).unwrap();
        assert_eq!(item.kind(), EntryKind::File);
        assert_eq!(item.full_address(), "\\\\fileserver\\data\\Directory\\File");
    }

    #[test]
    fn test_share_root_is_directory() {
        let transport = transport();
        for address in ["\\\\fileserver\\data", "\\\\fileserver\\data\\", "//fileserver/data"] {
            let item = open(&transport, address, CreationStrategy::AsFile).unwrap();
            assert_eq!(item.kind(), EntryKind::Directory);
            assert_eq!(item.path(), "");
        }
    }

    #[test]
    fn test_absent_entries_follow_strategy() {
        let transport = transport();
        let address = "\\\\fileserver\\data\\Directory\\New";

        let as_dir = open(&transport, address, CreationStrategy::AsDirectory).unwrap();
        assert_eq!(as_dir.kind(), EntryKind::Directory);
        assert!(!as_dir.is_directory().unwrap());
        let as_file = open(&transport, address, CreationStrategy::AsFile).unwrap();
        assert_eq!(as_file.kind(), EntryKind::File);
        assert!(matches!(
            open(&transport, address, CreationStrategy::FailIfAbsent),
            Err(ShareError::PathResolution { .. })
        ));
    }

    #[test]
    fn test_malformed_and_unreachable_addresses() {
        let transport = transport();
        assert!(matches!(
            open(&transport, "fileserver\\data", CreationStrategy::AsFile),
            Err(ShareError::PathResolution { .. })
        ));
        assert!(matches!(
            open(&transport, "\\\\elsewhere\\data", CreationStrategy::AsFile),
            Err(ShareError::Connection { .. })
        ));
    }

    #[test]
    fn test_item_owns_its_connection() {
        let transport = transport();
        let item = open(&transport, "\\\\fileserver\\data\\Directory", CreationStrategy::FailIfAbsent).unwrap();
        assert!(item.connection().is_alive());

        item.connection().close().unwrap();
        assert_eq!(transport.stats().sessions_closed, 1);
    }
}
