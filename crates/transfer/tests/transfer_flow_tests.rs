use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use chunkyard_transfer::{
    TransferConfig, TransferCoordinator, TransferError, checksum_bytes,
};
use tempfile::TempDir;

fn coordinator(dir: &TempDir) -> TransferCoordinator {
    let config = TransferConfig {
        sync_writes: false,
        ..TransferConfig::with_root(dir.path())
    };
    TransferCoordinator::open(config).unwrap()
}

fn leftover_temp_files(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with(".partial-"))
        .count()
}

#[test]
fn rewriting_a_chunk_keeps_the_last_payload() {
    let dir = TempDir::new().unwrap();
    let c = coordinator(&dir);

    c.put_chunk("t1", 0, Some(1), b"draft").unwrap();
    c.put_chunk("t1", 0, Some(1), b"final").unwrap();
    assert_eq!(c.status("t1", Some(1)).unwrap().received, vec![0]);

    c.finalize("t1", "doc.txt", 1).unwrap();
    assert_eq!(std::fs::read(dir.path().join("doc.txt")).unwrap(), b"final");
}

#[test]
fn finalize_refuses_gaps_and_reports_them() {
    let dir = TempDir::new().unwrap();
    let c = coordinator(&dir);
    c.put_chunk("t1", 0, Some(4), b"a").unwrap();
    c.put_chunk("t1", 3, Some(4), b"d").unwrap();

    let err = c.finalize("t1", "out.bin", 4).unwrap_err();
    match &err {
        TransferError::IncompleteTransfer {
            transfer_id,
            missing,
        } => {
            assert_eq!(transfer_id, "t1");
            assert_eq!(missing, &vec![1, 2]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_retryable());
    assert!(!dir.path().join("out.bin").exists());

    c.put_chunk("t1", 1, Some(4), b"b").unwrap();
    c.put_chunk("t1", 2, Some(4), b"c").unwrap();
    let artifact = c.finalize("t1", "out.bin", 4).unwrap();
    assert_eq!(artifact.size, 4);
    assert_eq!(std::fs::read(&artifact.path).unwrap(), b"abcd");
}

#[test]
fn arrival_order_does_not_change_content() {
    let dir = TempDir::new().unwrap();
    let c = coordinator(&dir);
    c.put_chunk("t1", 1, Some(2), b"BBB").unwrap();
    c.put_chunk("t1", 0, Some(2), b"AAA").unwrap();

    let artifact = c.finalize("t1", "ab.txt", 2).unwrap();
    assert_eq!(std::fs::read(&artifact.path).unwrap(), b"AAABBB");
    assert_eq!(artifact.sha256, checksum_bytes(b"AAABBB"));
}

#[test]
fn indices_past_ten_sort_numerically() {
    let dir = TempDir::new().unwrap();
    let c = coordinator(&dir);
    for i in (0..12u64).rev() {
        c.put_chunk("t1", i, Some(12), &[b'a' + i as u8]).unwrap();
    }
    c.finalize("t1", "letters.txt", 12).unwrap();
    assert_eq!(
        std::fs::read(dir.path().join("letters.txt")).unwrap(),
        b"abcdefghijkl"
    );
}

#[test]
fn readers_never_see_a_partial_artifact() {
    let dir = TempDir::new().unwrap();
    let c = Arc::new(coordinator(&dir));
    let path = dir.path().join("shared.bin");

    let old = vec![b'A'; 64 * 1024];
    let new = vec![b'B'; 96 * 1024];
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let (old, new, done, path) = (old.clone(), new.clone(), Arc::clone(&done), path.clone());
        thread::spawn(move || {
            let mut observed = 0usize;
            while !done.load(Ordering::SeqCst) {
                match std::fs::read(&path) {
                    Ok(bytes) => {
                        assert!(bytes == old || bytes == new, "torn read of {} bytes", bytes.len());
                        observed += 1;
                    }
                    Err(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
                }
            }
            observed
        })
    };

    for round in 0..20u64 {
        let id = format!("round-{round}");
        let content = if round % 2 == 0 { &old } else { &new };
        for (i, chunk) in content.chunks(16 * 1024).enumerate() {
            c.put_chunk(&id, i as u64, None, chunk).unwrap();
        }
        let count = content.len().div_ceil(16 * 1024) as u64;
        c.finalize(&id, "shared.bin", count).unwrap();
    }
    done.store(true, Ordering::SeqCst);

    reader.join().unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), new);
    assert_eq!(leftover_temp_files(&dir), 0);
}

#[test]
fn ranges_cover_the_artifact_exactly() {
    let dir = TempDir::new().unwrap();
    let c = coordinator(&dir);
    c.put_chunk("t1", 0, None, b"0123456789").unwrap();
    c.finalize("t1", "ten.bin", 1).unwrap();

    assert_eq!(c.download_range("ten.bin", 0, Some(4)).unwrap(), b"0123");
    assert_eq!(c.download_range("ten.bin", 1, Some(4)).unwrap(), b"4567");
    assert_eq!(c.download_range("ten.bin", 2, Some(4)).unwrap(), b"89");
    assert!(c.download_range("ten.bin", 3, Some(4)).unwrap().is_empty());

    let mut rebuilt = Vec::new();
    for i in 0.. {
        let part = c.download_range("ten.bin", i, Some(3)).unwrap();
        if part.is_empty() {
            break;
        }
        rebuilt.extend_from_slice(&part);
    }
    assert_eq!(rebuilt, b"0123456789");
}

#[test]
fn successful_finalize_removes_staging() {
    let dir = TempDir::new().unwrap();
    let c = coordinator(&dir);
    c.put_chunk("t1", 0, None, b"x").unwrap();
    assert!(dir.path().join("t1").is_dir());

    c.finalize("t1", "x.txt", 1).unwrap();
    assert!(!dir.path().join("t1").exists());
    assert!(c.status("t1", None).unwrap().is_empty());
    assert_eq!(leftover_temp_files(&dir), 0);
}

#[test]
fn failed_finalize_keeps_staging() {
    let dir = TempDir::new().unwrap();
    let c = coordinator(&dir);
    c.put_chunk("t1", 0, None, b"hello").unwrap();

    let err = c
        .finalize_verified("t1", "hello.txt", 1, &"0".repeat(64))
        .unwrap_err();
    assert!(matches!(err, TransferError::ChecksumMismatch { .. }));
    assert!(!dir.path().join("hello.txt").exists());
    assert_eq!(leftover_temp_files(&dir), 0);

    assert_eq!(c.read_chunk("t1", 0).unwrap(), b"hello");
    let artifact = c
        .finalize_verified("t1", "hello.txt", 1, &checksum_bytes(b"hello"))
        .unwrap();
    assert_eq!(artifact.size, 5);
}

#[test]
fn concurrent_finalize_publishes_once() {
    let dir = TempDir::new().unwrap();
    let c = Arc::new(coordinator(&dir));
    for i in 0..8u64 {
        c.put_chunk("t1", i, Some(8), &[i as u8; 1024]).unwrap();
    }

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let c = Arc::clone(&c);
            thread::spawn(move || c.finalize("t1", "merged.bin", 8))
        })
        .collect();

    let digests: Vec<String> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap().sha256)
        .collect();
    assert!(digests.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(c.artifact_len("merged.bin").unwrap(), 8 * 1024);
    assert_eq!(leftover_temp_files(&dir), 0);
}

#[test]
fn state_survives_a_restart() {
    let dir = TempDir::new().unwrap();
    {
        let c = coordinator(&dir);
        c.put_chunk("t1", 0, Some(2), b"first-").unwrap();
    }

    let c = coordinator(&dir);
    assert_eq!(c.status("t1", Some(2)).unwrap().missing, vec![1]);
    c.put_chunk("t1", 1, Some(2), b"second").unwrap();
    c.finalize("t1", "resumed.txt", 2).unwrap();
    assert_eq!(
        c.download_range("resumed.txt", 0, None).unwrap(),
        b"first-second"
    );
}
