//! Long-running concurrency tests
//!
//! Run with `--features stress`.

#![cfg(feature = "stress")]


use anyhow::Result;
use cephfs_oss::aio::{completion, Aio};
use cephfs_oss::layout::OpenEnv;
use cephfs_oss::plugin::{StorageHandle, StorageSystem};
use common::*;
use std::thread;

#[test]
fn test_concurrent_writers_and_readers() -> Result<()> {
    let harness = TestHarness::with_config(|b| b.aio_workers(4))?;
    let threads = 16;
    let rounds = 50;

    thread::scope(|s| {
        for t in 0..threads {
            let harness = &harness;
            s.spawn(move || {
                for r in 0..rounds {
                    let path = format!("/t{}-{}", t, r);
                    let content = random_bytes(4096 + r * 17);
                    put(harness, &path, &content).unwrap();
                    assert_eq!(get(harness, &path).unwrap(), content);
                    harness.oss().unlink(&path).unwrap();
                }
            });
        }
    });

    assert_dir_contains_exactly(harness.backing(), &[]);
    harness.cleanup()
}

#[test]
fn test_async_flood_then_shutdown() -> Result<()> {
    let harness = TestHarness::with_config(|b| b.aio_workers(2).drain_timeout("10s"))?;
    let content = random_bytes(1 << 20);
    put(&harness, "/flood", &content)?;

    let file = harness.oss().new_file("e2e")?;
    file.open("/flood", libc::O_RDONLY, 0, &OpenEnv::new())?;

    let mut receivers = Vec::new();
    for i in 0..1024u64 {
        let (done, rx) = completion();
        file.read_aio(Aio::read((i % 256) * 4096, 4096), done)?;
        receivers.push(rx);
    }
    harness.oss().manager().shutdown();

    // every request completes exactly once, either with data or refused
    for rx in receivers {
        let aio = rx.blocking_recv()?;
        assert!(
            aio.result == 4096 || aio.result == -(libc::ESHUTDOWN as i64),
            "unexpected result {}",
            aio.result
        );
    }
    file.close()?;

    harness.cleanup()
}
