//! Inode bookkeeping across request sequences the kernel actually sends.

use clap::Parser;
use fuser::MountOption;
use pathfuse_fuser::{InodeTable, MountArgs, MountConfig, ROOT_INODE};

#[test]
fn test_lookup_rename_forget_cycle() {
    let table = InodeTable::new();
    let dir = table.lookup("/d");
    let file = table.lookup("/d/x");
    table.lookup("/d/x");

    table.rename("/d", "/e");
    assert_eq!(table.path(dir).as_deref(), Some("/e"));
    assert_eq!(table.path(file).as_deref(), Some("/e/x"));
    assert_eq!(table.get_inode("/e/x"), Some(file));
    assert_eq!(table.get_inode("/d/x"), None);

    // Two lookups, two forgets.
    assert!(!table.forget(file, 1));
    assert!(table.forget(file, 1));
    assert_eq!(table.path(file), None);
    assert_eq!(table.get_inode("/e/x"), None);
    assert_eq!(table.path(dir).as_deref(), Some("/e"));
}

#[test]
fn test_unlinked_inode_survives_until_forget() {
    let table = InodeTable::new();
    let ino = table.lookup("/gone");
    table.remove_path("/gone");
    assert_eq!(table.get_inode("/gone"), None);
    assert_eq!(table.path(ino).as_deref(), Some("/gone"));

    // A new file under the same name gets a fresh inode.
    let fresh = table.lookup("/gone");
    assert_ne!(fresh, ino);

    assert!(table.forget(ino, 1));
    assert_eq!(table.path(fresh).as_deref(), Some("/gone"));
}

#[test]
fn test_root_is_permanent() {
    let table = InodeTable::new();
    assert!(!table.forget(ROOT_INODE, u64::MAX));
    assert_eq!(table.path(ROOT_INODE).as_deref(), Some("/"));
}

#[test]
fn test_argument_vector_to_mount_options() {
    let args = MountArgs::try_parse_from([
        "memfs",
        "/mnt/mem",
        "-o",
        "ro,fsname=scratch",
        "-o",
        "allow_other",
        "-f",
    ])
    .unwrap();
    assert!(args.foreground);

    let config = MountConfig::default().subtype("memfs");
    let options = args.mount_options(&config);
    assert!(options.contains(&MountOption::RO));
    assert!(options.contains(&MountOption::AllowOther));
    assert!(options.contains(&MountOption::FSName("scratch".to_string())));
    assert!(options.contains(&MountOption::Subtype("memfs".to_string())));
    assert_eq!(
        options
            .iter()
            .filter(|o| matches!(o, MountOption::FSName(_)))
            .count(),
        1
    );
}
