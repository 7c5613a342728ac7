mod common;

use common::{AnyDump, Sandbox};
use kdumpd::inventory::{DumpSniffer, Inventory};
use kdumpd::KdumpError;
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn inventory(sb: &Sandbox) -> Inventory {
    Inventory::new(sb.crash_dir(), Arc::new(AnyDump))
}

fn names(inv: &Inventory) -> Vec<String> {
    inv.list().into_iter().map(|d| d.name).collect()
}

#[test]
fn test_list_newest_first() {
    let sb = Sandbox::new();
    sb.add_dump("202301010000", 1);
    sb.add_dump("202403150930", 1);
    sb.add_dump("202312312359", 1);

    assert_eq!(
        names(&inventory(&sb)),
        vec!["202403150930", "202312312359", "202301010000"]
    );
}

#[test]
fn test_list_skips_invalid_entries() {
    let sb = Sandbox::new();
    sb.add_dump("202401031542", 8);
    // Bad names
    sb.add_dump("notadump0000", 8);
    sb.add_dump("196001010000", 8);
    sb.add_dump("202413010000", 8);
    sb.add_dump("202401320000", 8);
    // Empty dump file
    sb.add_dump("202401010000", 0);
    // Directory without a dump file
    fs::create_dir_all(sb.crash_dir().join("202401020000")).unwrap();
    // Dump path is a directory
    fs::create_dir_all(sb.crash_dir().join("202401040000/dump.202401040000")).unwrap();
    // Plain file with a valid name
    fs::write(sb.crash_dir().join("202401050000"), "x").unwrap();

    assert_eq!(names(&inventory(&sb)), vec!["202401031542"]);
}

#[test]
fn test_list_missing_crash_dir() {
    let sb = Sandbox::new();
    fs::remove_dir_all(sb.crash_dir()).unwrap();
    assert!(inventory(&sb).list().is_empty());
}

#[test]
fn test_sniffer_rejects() {
    struct Nothing;
    impl DumpSniffer for Nothing {
        fn is_kdump(&self, _path: &Path) -> bool {
            false
        }
    }

    let sb = Sandbox::new();
    sb.add_dump("202401031542", 8);
    let inv = Inventory::new(sb.crash_dir(), Arc::new(Nothing));
    assert!(inv.list().is_empty());
}

#[test]
fn test_size_errors() {
    let sb = Sandbox::new();
    let inv = inventory(&sb);
    sb.add_dump("202401031542", 42);
    sb.add_dump("202401010000", 0);
    fs::create_dir_all(sb.crash_dir().join("202401040000/dump.202401040000")).unwrap();

    assert_eq!(inv.size("202401031542").unwrap(), 42);
    assert!(matches!(inv.size("202401010000"), Err(KdumpError::Empty(_))));
    assert!(matches!(inv.size("202401040000"), Err(KdumpError::NotRegular(_))));
    assert!(matches!(inv.size("202402020000"), Err(KdumpError::NotFound(_))));
}

#[test]
fn test_delete_by_positive_and_negative_index() {
    let sb = Sandbox::new();
    sb.add_dump("202401010000", 1);
    sb.add_dump("202402010000", 1);
    sb.add_dump("202403010000", 1);
    let inv = inventory(&sb);

    // Newest and oldest
    assert_eq!(inv.delete(&[0, -1]).unwrap(), 2);
    assert_eq!(names(&inv), vec!["202402010000"]);
}

#[test]
fn test_delete_same_dump_twice_removes_once() {
    let sb = Sandbox::new();
    sb.add_dump("202401010000", 1);
    sb.add_dump("202402010000", 1);
    let inv = inventory(&sb);

    // 1 and -1 both name the oldest of two
    assert_eq!(inv.delete(&[1, -1]).unwrap(), 1);
    assert_eq!(names(&inv), vec!["202402010000"]);
}

#[test]
fn test_delete_bad_index_deletes_nothing() {
    let sb = Sandbox::new();
    sb.add_dump("202401010000", 1);
    sb.add_dump("202402010000", 1);
    let inv = inventory(&sb);

    let err = inv.delete(&[0, 5]).unwrap_err();
    assert_eq!(err.to_string(), "index (5) out of range [-2..1]");
    assert_eq!(names(&inv).len(), 2);

    let err = inv.delete(&[7, -3]).unwrap_err();
    assert!(matches!(err, KdumpError::BadIndices(ref v) if v == &vec![7, -3]));
    assert_eq!(names(&inv).len(), 2);
}

#[test]
fn test_delete_all() {
    let sb = Sandbox::new();
    sb.add_dump("202401010000", 1);
    sb.add_dump("202402010000", 1);
    let inv = inventory(&sb);

    assert_eq!(inv.delete(&[]).unwrap(), 2);
    assert!(inv.list().is_empty());
    assert_eq!(inv.delete(&[]).unwrap(), 0);
    assert!(inv.delete(&[0]).is_err());
}

#[test]
fn test_dmesg_by_index() {
    let sb = Sandbox::new();
    let newest = sb.add_dump("202402010000", 1);
    sb.add_dump("202401010000", 1);
    let inv = inventory(&sb);

    let logs = inv.dmesg_by_index(&[0, 9, -1]);
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[0].filename, newest.display().to_string());
    assert_eq!(logs[0].dmesg, "panic at 202402010000\n");
    assert!(!logs[1].is_resolved());
    assert_eq!(logs[1].index, 9);
    assert_eq!(logs[2].dmesg, "panic at 202401010000\n");

    let all = inv.dmesg_by_index(&[]);
    assert_eq!(all.iter().map(|l| l.index).collect::<Vec<_>>(), vec![0, 1]);
}

#[test]
fn test_dmesg_missing_log_is_empty() {
    let sb = Sandbox::new();
    let dir = sb.add_dump("202402010000", 1);
    fs::remove_file(dir.join("dmesg.202402010000")).unwrap();
    let inv = inventory(&sb);

    let logs = inv.dmesg_by_index(&[0]);
    assert!(logs[0].is_resolved());
    assert!(logs[0].dmesg.is_empty());
}

#[test]
fn test_delete_middle_index() {
    let sb = Sandbox::new();
    sb.add_dump("202401010000", 1);
    sb.add_dump("202401020000", 1);
    sb.add_dump("202401030000", 1);
    let inv = inventory(&sb);

    assert_eq!(inv.delete(&[1]).unwrap(), 1);
    assert_eq!(names(&inv), vec!["202401030000", "202401010000"]);
    assert!(!sb.crash_dir().join("202401020000").exists());
}

#[test]
fn test_delete_last_negative_index_alone() {
    let sb = Sandbox::new();
    sb.add_dump("202401010000", 1);
    sb.add_dump("202401020000", 1);
    sb.add_dump("202401030000", 1);
    let inv = inventory(&sb);

    assert_eq!(inv.delete(&[-1]).unwrap(), 1);
    assert_eq!(names(&inv), vec!["202401030000", "202401020000"]);
}
