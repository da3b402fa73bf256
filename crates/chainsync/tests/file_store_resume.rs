//! Restart against a cursor file: the second run picks up where the first committed.

mod common;

use chainsync::{Cursor, CursorStore, FileCursorStore, FilterChain, SyncDriver};
use common::{fast_config, new_log, Recorder, ScriptedSource};
use std::path::PathBuf;

fn temp_dir(tag: &str) -> PathBuf {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis();
    let dir = std::env::temp_dir().join(format!(
        "chainsync_it_{}_{}_{}",
        tag,
        std::process::id(),
        millis
    ));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

#[test]
fn restart_resumes_from_cursor_file() {
    common::init_tracing();
    let dir = temp_dir("resume");
    let path = dir.join("cursor.json");
    let source = ScriptedSource::with_blocks(100, 105, 1);

    let log = new_log();
    let mut first = SyncDriver::new(
        fast_config(100, Some(102)),
        source.clone(),
        FileCursorStore::new(&path),
        FilterChain::new().with_filter(Recorder::new("rec", &log)),
    )
    .unwrap();
    assert_eq!(first.run().unwrap().final_height, 102);
    drop(first);

    let raw = std::fs::read_to_string(&path).unwrap();
    let on_disk: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(
        on_disk,
        serde_json::json!({"block_height": 103, "transaction_index": null})
    );

    let mut second = SyncDriver::new(
        fast_config(100, Some(105)),
        source.clone(),
        FileCursorStore::new(&path),
        FilterChain::new().with_filter(Recorder::new("rec", &log)),
    )
    .unwrap();
    assert_eq!(second.run().unwrap().final_height, 105);

    let heights: Vec<u64> = log.lock().unwrap().iter().map(|(_, h, _)| *h).collect();
    assert_eq!(heights, vec![100, 101, 102, 103, 104, 105]);
    assert_eq!(
        FileCursorStore::new(&path).get_cursor(Cursor::new(0)).unwrap(),
        Cursor::new(106)
    );
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn unreadable_cursor_file_is_fatal_after_budget() {
    let dir = temp_dir("corrupt");
    let path = dir.join("cursor.json");
    std::fs::write(&path, b"garbage").unwrap();
    let source = ScriptedSource::with_blocks(0, 3, 1);
    let mut driver = SyncDriver::new(
        fast_config(0, Some(3)),
        source.clone(),
        FileCursorStore::new(&path),
        FilterChain::new(),
    )
    .unwrap();

    let err = driver.run().unwrap_err();
    assert!(matches!(
        err,
        chainsync::SyncError::Store {
            attempts: 3,
            cursor: None,
            ..
        }
    ));
    assert!(source.fetched().is_empty());
    let _ = std::fs::remove_dir_all(dir);
}
