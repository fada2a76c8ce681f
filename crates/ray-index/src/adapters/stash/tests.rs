//! # Stash Tests

use super::*;
use crate::domain::errors::IndexError;
use crate::domain::notice::Notice;
use crate::adapters::serializer::BincodeNoticeSerializer;
use crate::ports::outbound::{NoticeSerializer, Stash};
use std::fs;
use tempfile::TempDir;

fn notice(target: u64) -> Notice {
    Notice::new(target, 1000 + target).with("bout", target.to_string())
}

fn collect(stash: &dyn Stash) -> Vec<Notice> {
    let mut notices: Vec<Notice> = stash.iter().unwrap().map(|n| n.unwrap()).collect();
    notices.sort();
    notices
}

// =============================================================================
// DIR STASH
// =============================================================================

#[test]
fn test_entry_path_is_sharded() {
    let key = entry_key(b"hello");
    assert_eq!(key.len(), 64);

    let path = entry_path(&key);
    let parts: Vec<_> = path.iter().map(|p| p.to_string_lossy().into_owned()).collect();
    assert_eq!(parts[0], &key[0..2]);
    assert_eq!(parts[1], &key[2..4]);
    assert_eq!(parts[2], format!("{}.nser", &key[4..]));
}

#[test]
fn test_add_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let stash = DirStash::open(dir.path()).unwrap();

    stash.add(&notice(1)).unwrap();
    stash.add(&notice(1)).unwrap();
    stash.add(&notice(2)).unwrap();

    assert_eq!(stash.len().unwrap(), 2);
    assert_eq!(collect(&stash), vec![notice(1), notice(2)]);
}

#[test]
fn test_add_writes_no_temp_files() {
    let dir = TempDir::new().unwrap();
    let stash = DirStash::open(dir.path()).unwrap();
    stash.add(&notice(1)).unwrap();

    let leftovers: Vec<_> = walkdir::WalkDir::new(dir.path())
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().map_or(false, |x| x == "tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_remove_hides_until_restart() {
    let dir = TempDir::new().unwrap();
    let stash = DirStash::open(dir.path()).unwrap();
    stash.add(&notice(1)).unwrap();
    stash.add(&notice(2)).unwrap();

    stash.remove(&notice(1)).unwrap();
    assert_eq!(collect(&stash), vec![notice(2)]);
    assert_eq!(stash.done_count(), 1);
    stash.close().unwrap();

    // The done-set is not persisted
    let reopened = DirStash::open(dir.path()).unwrap();
    assert_eq!(collect(&reopened), vec![notice(1), notice(2)]);
    assert_eq!(reopened.done_count(), 0);
}

#[test]
fn test_iter_is_a_snapshot() {
    let dir = TempDir::new().unwrap();
    let stash = DirStash::open(dir.path()).unwrap();
    stash.add(&notice(1)).unwrap();

    let mut iter = stash.iter().unwrap();
    stash.add(&notice(2)).unwrap();

    assert_eq!(iter.next().unwrap().unwrap(), notice(1));
    assert!(iter.next().is_none());
}

#[test]
fn test_corrupt_entry_is_reported() {
    let dir = TempDir::new().unwrap();
    let stash = DirStash::open(dir.path()).unwrap();

    let bad = dir.path().join(entry_path(&entry_key(b"garbage")));
    fs::create_dir_all(bad.parent().unwrap()).unwrap();
    fs::write(&bad, [1, 2, 3]).unwrap();

    let results: Vec<_> = stash.iter().unwrap().collect();
    assert_eq!(results.len(), 1);
    match &results[0] {
        Err(IndexError::DeserializationFailure { path, .. }) => assert_eq!(path, &bad),
        other => panic!("Expected DeserializationFailure, got {:?}", other),
    }
}

#[test]
fn test_second_open_is_contention() {
    let dir = TempDir::new().unwrap();
    let _stash = DirStash::open(dir.path()).unwrap();

    let result = DirStash::open(dir.path());
    assert!(matches!(result, Err(IndexError::LockContention { .. })));
}

#[test]
fn test_copy_to_reconciles_counts() {
    let source_dir = TempDir::new().unwrap();
    let target_dir = TempDir::new().unwrap();
    let source = DirStash::open(source_dir.path()).unwrap();
    let target = DirStash::open(target_dir.path()).unwrap();

    // The target already holds work of its own, one entry of it done
    target.add(&notice(9)).unwrap();
    target.add(&notice(8)).unwrap();
    target.remove(&notice(8)).unwrap();
    let before = target.len().unwrap();
    assert_eq!(before, 1);

    for i in 1..=4 {
        source.add(&notice(i)).unwrap();
    }
    source.remove(&notice(4)).unwrap();

    let copied = source.copy_to(&target).unwrap();
    assert_eq!(copied, 3);
    assert_eq!(target.len().unwrap(), before + copied);
    assert_eq!(
        collect(&target),
        vec![notice(1), notice(2), notice(3), notice(9)]
    );
    assert_eq!(target.done_count(), 1);

    // Local done-set is cleared, so the removed entry is pending again
    assert_eq!(source.done_count(), 0);
    assert_eq!(source.len().unwrap(), 4);

    // Shard layout is preserved
    let seeded = [notice(8), notice(9)].map(|n| {
        let bytes = BincodeNoticeSerializer.serialize(&n).unwrap();
        entry_path(&entry_key(&bytes))
    });
    for (i, e) in walkdir::WalkDir::new(target_dir.path())
        .min_depth(3)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| !seeded.iter().any(|p| e.path().ends_with(p)))
        .enumerate()
    {
        let relative = e.path().strip_prefix(target_dir.path()).unwrap();
        assert!(source_dir.path().join(relative).is_file(), "entry #{}", i);
    }
}

#[test]
fn test_copy_to_other_kind_is_unsupported() {
    let dir = TempDir::new().unwrap();
    let source = DirStash::open(dir.path()).unwrap();
    source.add(&notice(1)).unwrap();

    let target = MemoryStash::new();
    match source.copy_to(&target) {
        Err(IndexError::UnsupportedTarget { kind }) => assert_eq!(kind, "memory"),
        other => panic!("Expected UnsupportedTarget, got {:?}", other),
    }
    assert_eq!(target.len().unwrap(), 0);
}

#[test]
fn test_display_summary() {
    let dir = TempDir::new().unwrap();
    let stash = DirStash::open(dir.path()).unwrap();
    stash.add(&notice(1)).unwrap();
    stash.add(&notice(2)).unwrap();
    stash.remove(&notice(2)).unwrap();

    let summary = stash.to_string();
    assert!(summary.starts_with("2 files in "));
    assert!(summary.ends_with(", 1 of them are done"));
}

#[test]
fn test_count_entries_beside_the_owner() {
    let dir = TempDir::new().unwrap();
    let stash = DirStash::open(dir.path()).unwrap();
    stash.add(&notice(1)).unwrap();
    stash.add(&notice(2)).unwrap();

    // Counting neither needs nor disturbs the owner's lock
    assert_eq!(DirStash::count_entries(dir.path()).unwrap(), 2);
    assert!(matches!(
        DirStash::open(dir.path()),
        Err(IndexError::LockContention { .. })
    ));
    stash.add(&notice(3)).unwrap();
    assert_eq!(DirStash::count_entries(dir.path()).unwrap(), 3);

    assert_eq!(
        DirStash::count_entries(&dir.path().join("missing")).unwrap(),
        0
    );
}

#[test]
fn test_dir_stash_refuses_unindexable_notice() {
    let dir = TempDir::new().unwrap();
    let stash = DirStash::open(dir.path()).unwrap();

    let reserved = Notice::new(0, 10).with("tag", "alpha");
    match stash.add(&reserved) {
        Err(IndexError::InvalidNotice { reason, .. }) => assert!(reason.contains("target 0")),
        other => panic!("Expected InvalidNotice, got {:?}", other),
    }

    let long_name = Notice::new(1, 10).with("a".repeat(70_000), "x");
    assert!(matches!(
        stash.add(&long_name),
        Err(IndexError::InvalidNotice { .. })
    ));

    assert_eq!(stash.len().unwrap(), 0);
    assert_eq!(DirStash::count_entries(dir.path()).unwrap(), 0);
}

// =============================================================================
// MEMORY STASH
// =============================================================================

#[test]
fn test_memory_stash_mirrors_dir_semantics() {
    let stash = MemoryStash::new();
    stash.add(&notice(1)).unwrap();
    stash.add(&notice(1)).unwrap();
    stash.add(&notice(2)).unwrap();
    assert_eq!(stash.len().unwrap(), 2);

    stash.remove(&notice(2)).unwrap();
    assert_eq!(collect(&stash), vec![notice(1)]);

    // Re-adding a done notice makes it pending again
    stash.add(&notice(2)).unwrap();
    assert_eq!(stash.len().unwrap(), 2);
}

#[test]
fn test_memory_stash_corrupt_entry() {
    let stash = MemoryStash::new();
    stash.insert_raw("bad", vec![1, 2, 3]);

    let result = stash.iter().unwrap().next().unwrap();
    assert!(matches!(result, Err(IndexError::DeserializationFailure { .. })));
}

#[test]
fn test_memory_copy_to_memory() {
    let source = MemoryStash::new();
    let target = MemoryStash::new();
    source.add(&notice(1)).unwrap();
    source.add(&notice(2)).unwrap();
    source.remove(&notice(1)).unwrap();

    assert_eq!(source.copy_to(&target).unwrap(), 1);
    assert_eq!(collect(&target), vec![notice(2)]);
    assert_eq!(source.done_count(), 0);
}

#[test]
fn test_memory_stash_refuses_unindexable_notice() {
    let stash = MemoryStash::new();

    let result = stash.add(&Notice::new(0, 10).with("tag", "alpha"));
    assert!(matches!(result, Err(IndexError::InvalidNotice { .. })));
    assert_eq!(stash.len().unwrap(), 0);
}
