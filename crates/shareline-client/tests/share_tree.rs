//! End-to-end behaviour of items, traversal, rename and streams over an
//! in-memory share server.

use std::io::{Read, Write};
use std::sync::Arc;

use shareline_client::{
    open_address, Connection, MemoryTransport, ShareDirectory, ShareFile, ShareItem, ShareNode,
};
use shareline_core::{
    ConnectionConfig, CreationStrategy, Credentials, LivenessState, ShareError, TransportError,
};

fn server() -> MemoryTransport {
    MemoryTransport::new("fileserver").with_share("data")
}

fn connect(server: &MemoryTransport) -> Arc<Connection> {
    server
        .open_connection("data", Credentials::anonymous())
        .unwrap()
}

fn paths(items: &[ShareItem]) -> Vec<String> {
    items.iter().map(|item| item.path()).collect()
}

#[test]
fn test_search_by_name_finds_every_depth() {
    let server = server();
    for dir in ["Dir1/Dir2/Dir3", "Dir4/Dir1/Other", "Dir5/Dir1", "Dir1/Dir2/Dir1"] {
        server.put_dir("data", dir).unwrap();
    }
    server.put_file("data", "Dir1/file.txt", b"").unwrap();
    let root = ShareDirectory::root(connect(&server));

    let shallow = root.list_files_matching("Dir1", false).unwrap();
    assert_eq!(paths(&shallow), vec!["Dir1"]);

    let deep = root.list_files_matching("Dir1", true).unwrap();
    assert_eq!(
        paths(&deep),
        vec!["Dir1", "Dir1/Dir2/Dir1", "Dir4/Dir1", "Dir5/Dir1"]
    );

    let nested = root.list_files_matching("Dir3", true).unwrap();
    assert_eq!(paths(&nested), vec!["Dir1/Dir2/Dir3"]);
    assert!(nested.iter().all(|item| item.is_directory().unwrap()));
}

#[test]
fn test_rename_round_trip_restores_tree() {
    let server = server();
    server.put_dir("data", "Project/src").unwrap();
    server.put_file("data", "Project/src/main.txt", b"entry").unwrap();
    let root = ShareDirectory::root(connect(&server));
    let before = paths(&root.list_files(|_: &ShareItem| true, true).unwrap());

    let project = ShareDirectory::new(Arc::clone(root.connection()), "Project").unwrap();
    let renamed = project.rename_to("Archive", false).unwrap();
    assert_eq!(renamed.path(), "Archive");
    assert!(!project.exists().unwrap());

    let restored = renamed.rename_to("Project", false).unwrap();
    assert_eq!(restored, project);
    let after = paths(&root.list_files(|_: &ShareItem| true, true).unwrap());
    assert_eq!(before, after);
    assert_eq!(
        server.file_content("data", "Project/src/main.txt"),
        Some(b"entry".to_vec())
    );
}

#[test]
fn test_rename_conflict_with_and_without_replace() {
    let server = server();
    server.put_file("data", "a.txt", b"a").unwrap();
    server.put_file("data", "b.txt", b"b").unwrap();
    server.put_dir("data", "folder").unwrap();
    let conn = connect(&server);
    let a = ShareFile::new(Arc::clone(&conn), "a.txt").unwrap();

    let err = a.rename_to("b.txt", false).unwrap_err();
    assert!(matches!(err, ShareError::RenameConflict { .. }));
    assert!(a.exists().unwrap());
    assert_eq!(server.file_content("data", "b.txt"), Some(b"b".to_vec()));

    // A file never replaces a directory, even when asked to
    let err = a.rename_to("folder", true).unwrap_err();
    assert!(matches!(
        err,
        ShareError::RenameConflict {
            source: TransportError::KindMismatch { .. },
            ..
        }
    ));

    let b = a.rename_to("b.txt", true).unwrap();
    assert_eq!(b.name(), "b.txt");
    assert_eq!(server.file_content("data", "b.txt"), Some(b"a".to_vec()));
    assert_eq!(server.stats().open_files(), 0);
}

#[test]
fn test_ensure_exists_twice_is_idempotent() {
    let server = server();
    let conn = connect(&server);
    let dir = ShareDirectory::new(Arc::clone(&conn), "Cache").unwrap();

    dir.ensure_exists().unwrap();
    dir.ensure_exists().unwrap();

    let root = ShareDirectory::root(conn);
    assert_eq!(paths(&root.list_files(|_: &ShareItem| true, false).unwrap()), vec!["Cache"]);
}

#[test]
fn test_streams_release_handles_after_failures() {
    let server = server();
    server.put_file("data", "in.bin", b"0123456789").unwrap();
    let conn = connect(&server);

    let input = ShareFile::new(Arc::clone(&conn), "in.bin").unwrap();
    let mut reader = input.input_stream().unwrap();
    let mut head = [0u8; 4];
    reader.read_exact(&mut head).unwrap();
    server.set_fail_reads(true);
    assert!(reader.read(&mut head).is_err());
    drop(reader);
    server.set_fail_reads(false);

    let output = ShareFile::new(conn, "out.bin").unwrap();
    let mut writer = output.output_stream().unwrap();
    writer.write_all(b"partial").unwrap();
    server.set_fail_writes(true);
    assert!(writer.write_all(b"more").is_err());
    drop(writer);

    let stats = server.stats();
    assert_eq!(stats.streams_opened, 2);
    assert_eq!(stats.streams_closed, 2);
    assert_eq!(stats.files_opened, stats.files_closed);
}

#[test]
fn test_stale_connection_reconnects_once() {
    let server = server();
    server.put_file("data", "a.txt", b"a").unwrap();
    let conn = connect(&server);
    let file = ShareFile::new(Arc::clone(&conn), "a.txt").unwrap();
    assert_eq!(server.stats().connects, 1);

    server.drop_sessions();
    assert_eq!(conn.liveness(), LivenessState::Stale);

    assert!(file.exists().unwrap());
    assert_eq!(file.size().unwrap(), 1);
    assert_eq!(server.stats().connects, 2);
    assert_eq!(conn.liveness(), LivenessState::Connected);
}

#[test]
fn test_reconnect_failure_surfaces() {
    let server = server();
    let conn = connect(&server);
    let dir = ShareDirectory::root(Arc::clone(&conn));

    server.drop_sessions();
    server.set_unreachable(true);
    assert!(matches!(
        dir.get_files(),
        Err(ShareError::Connection {
            source: TransportError::Unreachable(_),
            ..
        })
    ));
}

#[test]
fn test_equality_across_connections() {
    let server = server();
    let first = ShareFile::new(connect(&server), "Dir/a.txt").unwrap();
    let second = ShareFile::new(connect(&server), "Dir/a.txt").unwrap();
    assert_eq!(first, second);
    assert_eq!(first.parent(), second.parent());

    let other_server = MemoryTransport::new("backup").with_share("data");
    let third = ShareFile::new(connect(&other_server), "Dir/a.txt").unwrap();
    assert_ne!(first, third);
}

#[test]
fn test_path_construction_rules() {
    let server = server();
    let conn = connect(&server);

    for valid in ["", "a", "a/b", "a\\b", "with space.txt"] {
        assert!(ShareDirectory::new(Arc::clone(&conn), valid).is_ok(), "{:?}", valid);
    }
    for invalid in [".", "..", "a/../b", "a//b", "/", "a/./b"] {
        assert!(
            matches!(
                ShareDirectory::new(Arc::clone(&conn), invalid),
                Err(ShareError::InvalidName { .. })
            ),
            "{:?}",
            invalid
        );
    }

    let root = ShareDirectory::root(conn);
    assert_eq!(root.parent(), root);
    assert_eq!(root.root(), root);
}

#[test]
fn test_open_address_round_trip() {
    let server = server();
    server.put_dir("data", "Directory").unwrap();

    let item = open_address(
        Arc::new(server.clone()),
        "\\\\fileserver\\data\\Directory\\File",
        Credentials::anonymous(),
        ConnectionConfig::default(),
        CreationStrategy::AsFile,
    )
    .unwrap();
    let file = item.into_file().unwrap();
    assert!(!file.exists().unwrap());

    file.create_file().unwrap();
    assert!(file.exists().unwrap());
    assert_eq!(file.full_address(), "\\\\fileserver\\data\\Directory\\File");
    assert_eq!(file.parent().full_address(), "\\\\fileserver\\data\\Directory");
}
