//! Tests for atomic file writes.

use super::atomic::{read_json, write_file, write_json};

#[test]
fn atomic_write_replaces_content() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("unit.json");
  write_file(&path, b"old", true).unwrap();
  write_file(&path, b"new content", true).unwrap();
  assert_eq!(std::fs::read(&path).unwrap(), b"new content");
}

#[test]
fn atomic_write_leaves_no_temp_files() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("unit.json");
  for i in 0..5 {
    write_file(&path, format!("v{}", i).as_bytes(), true).unwrap();
  }
  let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
  assert_eq!(entries.len(), 1);
}

#[test]
fn write_creates_parent_dirs() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("a").join("b").join("unit.json");
  write_file(&path, b"x", false).unwrap();
  assert!(path.exists());
}

#[test]
fn json_roundtrip() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("list.json");
  write_json(&path, &vec![1u32, 2, 3], true).unwrap();
  let back: Vec<u32> = read_json(&path).unwrap();
  assert_eq!(back, vec![1, 2, 3]);
}

#[test]
fn read_missing_file_returns_error() {
  let dir = tempfile::tempdir().unwrap();
  let r = read_json::<Vec<u32>>(&dir.path().join("nonexistent.json"));
  assert!(r.is_err());
}

#[test]
fn atomic_write_into_new_dir_syncs_and_lands() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("nodes").join("3.json");
  write_file(&path, b"{}", true).unwrap();
  assert_eq!(std::fs::read(&path).unwrap(), b"{}");
  let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap()).unwrap().collect();
  assert_eq!(entries.len(), 1);
}
