//! Integration tests for the executor and the transfer engine.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fileaccess_core::{Encoding, ErrorKind, FileAccessError, HashAlgorithm, PathResolver, RootTable};
use fileaccess_ops::{
    ChannelSink, EmittedEvent, EventBridge, Executor, FetchOptions, PROGRESS_EVENT,
    ProgressEvent, TransferEngine, TransferEvent, TransferHandle, TransferRequest, TransferState,
    WriteOptions,
};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;

const CHUNK: usize = 64 * 1024;

fn resolver(dir: &Path) -> PathResolver {
    PathResolver::new(RootTable::rooted_at(dir).unwrap())
}

fn executor(dir: &Path) -> Executor {
    Executor::new(resolver(dir))
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Engine wired to a bridge with a channel listener attached.
fn engine(dir: &Path) -> (TransferEngine, Arc<EventBridge>, UnboundedReceiver<EmittedEvent>) {
    let bridge = Arc::new(EventBridge::new());
    let (sink, rx) = ChannelSink::new();
    bridge.subscribe(Arc::new(sink));
    let engine = TransferEngine::new(resolver(dir), bridge.clone())
        .with_chunk_size(CHUNK)
        .with_create_parents(true);
    (engine, bridge, rx)
}

/// Receive events until `terminals` terminal events have arrived.
async fn collect(rx: &mut UnboundedReceiver<EmittedEvent>, terminals: usize) -> Vec<TransferEvent> {
    let mut events = Vec::new();
    let mut seen = 0;
    while seen < terminals {
        let emitted = tokio::time::timeout(Duration::from_secs(20), rx.recv())
            .await
            .expect("timed out waiting for events")
            .expect("event channel closed");
        let event = emitted.to_transfer_event().unwrap();
        if event.is_terminal() {
            seen += 1;
        }
        events.push(event);
    }
    events
}

/// Cancel a transfer from inside the event stream, on its first progress event.
fn cancel_on_first_progress(engine: &TransferEngine, bridge: &EventBridge) {
    let registry = engine.registry();
    bridge.subscribe(Arc::new(move |name: &str, payload: &Value| {
        if name == PROGRESS_EVENT {
            let handle = TransferHandle::from_raw(payload["handle"].as_u64().unwrap());
            registry.cancel(handle);
        }
    }));
}

fn write_source(dir: &Path, relative: &str, data: &[u8]) {
    let path = dir.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, data).unwrap();
}

/// Sorted file names in a directory, temp files included.
fn names_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn progress_of(events: &[TransferEvent]) -> Vec<ProgressEvent> {
    events
        .iter()
        .filter_map(|e| match e {
            TransferEvent::Progress(p) => Some(*p),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Loopback HTTP server
// ---------------------------------------------------------------------------

struct Reply {
    status: &'static str,
    body: Vec<u8>,
    /// Bytes to send before stalling for a long time.
    stall_after: Option<usize>,
}

impl Reply {
    fn ok(body: Vec<u8>) -> Self {
        Self {
            status: "200 OK",
            body,
            stall_after: None,
        }
    }
}

/// Serve one canned response per connection, returning the base URL.
async fn serve(reply: Reply) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let reply = Arc::new(reply);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let reply = Arc::clone(&reply);
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
                    reply.status,
                    reply.body.len()
                );
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                match reply.stall_after {
                    Some(prefix) => {
                        let _ = socket.write_all(&reply.body[..prefix]).await;
                        let _ = socket.flush().await;
                        tokio::time::sleep(Duration::from_secs(60)).await;
                    }
                    None => {
                        let _ = socket.write_all(&reply.body).await;
                    }
                }
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}")
}

/// A loopback URL nothing is listening on.
async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/gone")
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

#[test]
fn test_write_read_hello_in_cache() {
    let dir = tempfile::tempdir().unwrap();
    let exec = executor(dir.path());
    exec.mkdir("Cache").unwrap();

    exec.write_encoded("Cache/a.txt", "hello", Encoding::Utf8, WriteOptions::default())
        .unwrap();

    assert_eq!(exec.read_text("Cache/a.txt", Encoding::Utf8).unwrap(), "hello");
    let stat = exec.stat("Cache/a.txt").unwrap();
    assert!(stat.exists);
    assert!(!stat.is_directory);
    assert_eq!(stat.size, 5);
    assert_eq!(stat.filename, "a.txt");
    assert!(stat.last_modified.is_some());
}

#[test]
fn test_write_read_binary_and_empty() {
    let dir = tempfile::tempdir().unwrap();
    let exec = executor(dir.path());
    let opts = WriteOptions::create_parents();

    let binary: Vec<u8> = (0..=255u8).rev().collect();
    exec.write("Documents/bin", &binary, opts).unwrap();
    assert_eq!(exec.read("Documents/bin").unwrap(), binary);

    exec.write("Documents/empty", &[], opts).unwrap();
    assert!(exec.read("Documents/empty").unwrap().is_empty());
    assert_eq!(exec.stat("Documents/empty").unwrap().size, 0);
}

#[test]
fn test_stat_missing_is_absent() {
    let dir = tempfile::tempdir().unwrap();
    let exec = executor(dir.path());

    let stat = exec.stat("Cache/nope").unwrap();
    assert!(!stat.exists);
    assert_eq!(stat.size, 0);
    assert!(!exec.exists("Cache/nope").unwrap());
}

#[test]
fn test_mkdir_nested_then_stat() {
    let dir = tempfile::tempdir().unwrap();
    let exec = executor(dir.path());

    let created = exec.mkdir("Documents/a/b/c").unwrap();
    assert!(created.ends_with("Documents/a/b/c"));
    assert!(exec.stat("Documents/a/b/c").unwrap().is_directory);
    assert!(exec.is_dir("Documents/a").unwrap());

    // Existing directory is fine.
    exec.mkdir("Documents/a/b").unwrap();
}

#[test]
fn test_delete_strictness() {
    let dir = tempfile::tempdir().unwrap();
    let exec = executor(dir.path());

    exec.delete("Cache/missing", false).unwrap();
    let err = exec.delete("Cache/missing", true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    exec.write("Cache/tree/f", b"x", WriteOptions::create_parents())
        .unwrap();
    exec.delete("Cache/tree", true).unwrap();
    assert!(!exec.exists("Cache/tree").unwrap());
}

#[test]
fn test_move_respects_destination() {
    let dir = tempfile::tempdir().unwrap();
    let exec = executor(dir.path());
    let opts = WriteOptions::create_parents();
    exec.write("Cache/src", b"new", opts).unwrap();
    exec.write("Cache/dst", b"old", opts).unwrap();

    let err = exec.move_to("Cache/src", "Cache/dst", false).unwrap_err();
    assert!(matches!(err, FileAccessError::DestinationExists { .. }));
    assert_eq!(exec.read("Cache/src").unwrap(), b"new");
    assert_eq!(exec.read("Cache/dst").unwrap(), b"old");

    exec.move_to("Cache/src", "Cache/dst", true).unwrap();
    assert!(!exec.exists("Cache/src").unwrap());
    assert_eq!(exec.read("Cache/dst").unwrap(), b"new");

    let err = exec.move_to("Cache/src", "Cache/other", false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_move_across_roots() {
    let dir = tempfile::tempdir().unwrap();
    let exec = executor(dir.path());
    exec.write("Cache/d/one", b"1", WriteOptions::create_parents())
        .unwrap();
    exec.mkdir("Documents").unwrap();

    exec.move_to("Cache/d", "Documents/d", false).unwrap();
    assert_eq!(exec.read("Documents/d/one").unwrap(), b"1");
    assert!(!exec.exists("Cache/d").unwrap());
}

#[test]
fn test_copy_tree_and_list() {
    let dir = tempfile::tempdir().unwrap();
    let exec = executor(dir.path());
    let opts = WriteOptions::create_parents();
    exec.write("Documents/src/b.txt", b"bb", opts).unwrap();
    exec.write("Documents/src/a.txt", b"a", opts).unwrap();
    exec.write("Documents/src/sub/c.txt", b"ccc", opts).unwrap();

    let bytes = exec.copy("Documents/src", "Documents/dst").unwrap();
    assert_eq!(bytes, 6);
    assert_eq!(
        exec.list("Documents/dst").unwrap(),
        vec!["a.txt".to_string(), "b.txt".to_string(), "sub".to_string()]
    );

    let stats = exec.stat_dir("Documents/dst").unwrap();
    assert_eq!(stats.len(), 3);
    assert_eq!(stats[1].size, 2);
    assert!(stats[2].is_directory);
}

#[test]
fn test_copy_missing_source() {
    let dir = tempfile::tempdir().unwrap();
    let exec = executor(dir.path());
    let err = exec.copy("Cache/none", "Cache/x").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_escaping_paths_rejected_everywhere() {
    let dir = tempfile::tempdir().unwrap();
    let exec = executor(dir.path());

    for path in ["Cache/../../etc/passwd", "/etc/passwd", "nowhere/a", ""] {
        assert_eq!(exec.read(path).unwrap_err().kind(), ErrorKind::InvalidPath);
        assert_eq!(
            exec.write(path, b"x", WriteOptions::create_parents())
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidPath
        );
    }
    assert!(!dir.path().join("etc").exists());
}

#[test]
fn test_hash_matches_reference_digests() {
    use sha2::Digest;

    let dir = tempfile::tempdir().unwrap();
    let exec = executor(dir.path()).with_buffer_size(CHUNK);
    let data = patterned(3 * CHUNK + 17);
    exec.write("Cache/big", &data, WriteOptions::create_parents())
        .unwrap();

    assert_eq!(
        exec.hash("Cache/big", HashAlgorithm::Sha256).unwrap(),
        hex::encode(sha2::Sha256::digest(&data))
    );
    assert_eq!(
        exec.hash("Cache/big", HashAlgorithm::Sha512).unwrap(),
        hex::encode(sha2::Sha512::digest(&data))
    );
    assert_eq!(
        exec.hash("Cache/big", HashAlgorithm::Md5).unwrap(),
        hex::encode(md5::Md5::digest(&data))
    );
    assert_eq!(
        exec.hash("Cache/big", HashAlgorithm::Blake3).unwrap(),
        blake3::hash(&data).to_hex().to_string()
    );
}

#[test]
fn test_concat_and_read_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let exec = executor(dir.path());
    let opts = WriteOptions::create_parents();
    exec.write("Cache/part1", b"abc", opts).unwrap();
    exec.write("Cache/part2", b"def", opts).unwrap();

    assert_eq!(exec.concat("Cache/part2", "Cache/part1").unwrap(), 3);
    assert_eq!(exec.read("Cache/part1").unwrap(), b"abcdef");
    assert_eq!(exec.read_chunk("Cache/part1", 1, 4).unwrap(), b"bcde");
}

#[test]
fn test_execute_dispatch() {
    use fileaccess_ops::{Operation, OperationOutput};

    let dir = tempfile::tempdir().unwrap();
    let exec = executor(dir.path());

    let out = exec.execute(Operation::mkdir("Cache")).unwrap();
    assert!(matches!(out, OperationOutput::Path(_)));
    exec.execute(Operation::write("Cache/x", "data", WriteOptions::default()))
        .unwrap();

    let text = exec
        .execute(Operation::read_text("Cache/x", Encoding::Base64))
        .unwrap()
        .into_text()
        .unwrap();
    assert_eq!(text, "ZGF0YQ==");

    let exists = exec
        .execute(Operation::Exists {
            path: "Cache/x".into(),
        })
        .unwrap();
    assert_eq!(exists.as_bool(), Some(true));

    exec.execute(Operation::delete("Cache/x", true)).unwrap();
    let stat = exec.execute(Operation::stat("Cache/x")).unwrap();
    assert!(matches!(stat, OperationOutput::Stat(s) if !s.exists));
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ten_mib_copy_reports_every_chunk() {
    const TOTAL: usize = 10 * 1024 * 1024;
    let dir = tempfile::tempdir().unwrap();
    let data = patterned(TOTAL);
    write_source(dir.path(), "Cache/big.bin", &data);
    let (engine, _bridge, mut rx) = engine(dir.path());

    let handle = engine.copy("Cache/big.bin", "Documents/big.bin").unwrap();
    let events = collect(&mut rx, 1).await;

    let progress: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            TransferEvent::Progress(p) => Some(*p),
            _ => None,
        })
        .collect();
    assert!(progress.len() >= TOTAL / CHUNK);
    assert!(progress.windows(2).all(|w| w[0].written <= w[1].written));
    assert!(progress.iter().all(|p| p.handle == handle));
    assert_eq!(progress.last().unwrap().written, TOTAL as u64);
    assert_eq!(progress[0].total, Some(TOTAL as u64));

    match events.last().unwrap() {
        TransferEvent::Complete(complete) => assert_eq!(complete.written, TOTAL as u64),
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(
        std::fs::read(dir.path().join("Documents").join("big.bin")).unwrap(),
        data
    );
    assert!(engine.state(handle).is_none());
}

#[tokio::test]
async fn test_cancelled_copy_emits_single_terminal_and_removes_partial() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "Cache/src.bin", &patterned(20 * CHUNK));
    let (engine, bridge, mut rx) = engine(dir.path());
    cancel_on_first_progress(&engine, &bridge);

    let handle = engine.copy("Cache/src.bin", "Cache/dst.bin").unwrap();
    let events = collect(&mut rx, 1).await;

    let terminal = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminal, 1);
    match events.last().unwrap() {
        TransferEvent::Error(error) => {
            assert_eq!(error.handle, handle);
            assert_eq!(error.kind, ErrorKind::Cancelled);
        }
        other => panic!("expected cancellation, got {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err(), "no events after the terminal one");
    assert_eq!(names_in(&dir.path().join("Cache")), vec!["src.bin"]);
    assert!(!engine.cancel(handle));
}

#[tokio::test]
async fn test_cancelled_copy_keeps_partial_when_asked() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "Cache/src.bin", &patterned(20 * CHUNK));
    let (engine, bridge, mut rx) = engine(dir.path());
    cancel_on_first_progress(&engine, &bridge);

    engine
        .start(TransferRequest::Copy {
            source: "Cache/src.bin".into(),
            destination: "Cache/dst.bin".into(),
            keep_partial: Some(true),
        })
        .unwrap();
    collect(&mut rx, 1).await;

    let kept = std::fs::metadata(dir.path().join("Cache").join("dst.bin")).unwrap();
    assert!(kept.len() > 0);
    assert!(kept.len() < (20 * CHUNK) as u64);
}

#[tokio::test]
async fn test_cancel_unknown_handle_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _bridge, mut rx) = engine(dir.path());

    assert!(!engine.cancel(TransferHandle::from_raw(9999)));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_fetch_writes_body_and_reports_response() {
    let dir = tempfile::tempdir().unwrap();
    let body = patterned(300 * 1024);
    let base = serve(Reply::ok(body.clone())).await;
    let (engine, _bridge, mut rx) = engine(dir.path());

    let handle = engine
        .fetch(format!("{base}/file.bin"), "Cache/dl/file.bin", FetchOptions::default())
        .unwrap();
    let events = collect(&mut rx, 1).await;

    let mut last_written = 0;
    for event in &events[..events.len() - 1] {
        let TransferEvent::Progress(progress) = event else {
            panic!("unexpected event {event:?}");
        };
        assert!(progress.written >= last_written);
        assert_eq!(progress.total, Some(body.len() as u64));
        last_written = progress.written;
    }
    assert_eq!(last_written, body.len() as u64);

    match events.last().unwrap() {
        TransferEvent::Complete(complete) => {
            assert_eq!(complete.handle, handle);
            assert_eq!(complete.written, body.len() as u64);
            let response = complete.response.as_ref().unwrap();
            assert_eq!(response.status, 200);
            assert!(response.ok);
            assert!(!response.redirected);
            assert_eq!(response.url, format!("{base}/file.bin"));
            assert_eq!(
                response.headers.get("content-length").map(String::as_str),
                Some(body.len().to_string().as_str())
            );
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(
        std::fs::read(dir.path().join("Cache").join("dl").join("file.bin")).unwrap(),
        body
    );
}

#[tokio::test]
async fn test_fetch_error_status_still_completes() {
    let dir = tempfile::tempdir().unwrap();
    let base = serve(Reply {
        status: "404 Not Found",
        body: b"missing".to_vec(),
        stall_after: None,
    })
    .await;
    let (engine, _bridge, mut rx) = engine(dir.path());

    engine
        .fetch(format!("{base}/x"), "Cache/x", FetchOptions::default())
        .unwrap();
    let events = collect(&mut rx, 1).await;

    match events.last().unwrap() {
        TransferEvent::Complete(complete) => {
            let response = complete.response.as_ref().unwrap();
            assert_eq!(response.status, 404);
            assert_eq!(response.status_text, "Not Found");
            assert!(!response.ok);
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_fetch_does_not_affect_others() {
    let dir = tempfile::tempdir().unwrap();
    let body = patterned(2 * CHUNK);
    let base = serve(Reply::ok(body.clone())).await;
    let dead = dead_url().await;
    let (engine, _bridge, mut rx) = engine(dir.path());

    let bad = engine
        .fetch(dead, "Cache/bad", FetchOptions::default())
        .unwrap();
    let good = engine
        .fetch(format!("{base}/ok"), "Cache/good", FetchOptions::default())
        .unwrap();
    let events = collect(&mut rx, 2).await;

    let terminal_for = |handle: TransferHandle| {
        events
            .iter()
            .find(|e| e.is_terminal() && e.handle() == handle)
            .cloned()
            .unwrap()
    };
    match terminal_for(bad) {
        TransferEvent::Error(error) => assert_eq!(error.kind, ErrorKind::ReadError),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(matches!(terminal_for(good), TransferEvent::Complete(_)));
    assert!(!dir.path().join("Cache").join("bad").exists());
    assert_eq!(std::fs::read(dir.path().join("Cache").join("good")).unwrap(), body);
}

#[tokio::test]
async fn test_cancel_stalled_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let base = serve(Reply {
        status: "200 OK",
        body: patterned(4 * CHUNK),
        stall_after: Some(1024),
    })
    .await;
    let (engine, bridge, mut rx) = engine(dir.path());
    cancel_on_first_progress(&engine, &bridge);

    let handle = engine
        .fetch(format!("{base}/slow"), "Cache/slow", FetchOptions::default())
        .unwrap();
    let events = collect(&mut rx, 1).await;

    match events.last().unwrap() {
        TransferEvent::Error(error) => {
            assert_eq!(error.handle, handle);
            assert_eq!(error.kind, ErrorKind::Cancelled);
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert!(!dir.path().join("Cache").join("slow").exists());
    assert!(engine.active().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ten_mib_fetch_reports_chunk_sized_progress() {
    const TOTAL: usize = 10 * 1024 * 1024;
    let dir = tempfile::tempdir().unwrap();
    let body = patterned(TOTAL);
    let base = serve(Reply::ok(body.clone())).await;
    let (engine, _bridge, mut rx) = engine(dir.path());

    engine
        .fetch(format!("{base}/big"), "Cache/big.bin", FetchOptions::default())
        .unwrap();
    let events = collect(&mut rx, 1).await;
    let progress = progress_of(&events);

    assert!(progress.len() >= TOTAL / CHUNK);
    let mut previous = 0;
    for event in &progress {
        assert!(event.written >= previous);
        assert!(event.written - previous <= CHUNK as u64);
        previous = event.written;
    }
    assert_eq!(previous, TOTAL as u64);
    match events.last().unwrap() {
        TransferEvent::Complete(complete) => assert_eq!(complete.written, TOTAL as u64),
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(std::fs::read(dir.path().join("Cache").join("big.bin")).unwrap(), body);
}

#[tokio::test]
async fn test_throttled_copy_still_reports_total() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "Cache/src.bin", &patterned(10 * CHUNK));
    let (engine, _bridge, mut rx) = engine(dir.path());
    let engine = engine.with_progress_interval(Some(Duration::from_secs(3600)));

    engine.copy("Cache/src.bin", "Cache/dst.bin").unwrap();
    let events = collect(&mut rx, 1).await;
    let progress = progress_of(&events);

    assert_eq!(progress.len(), 2);
    assert_eq!(progress[0].written, CHUNK as u64);
    assert_eq!(progress[1].written, (10 * CHUNK) as u64);
    assert_eq!(progress[1].total, Some((10 * CHUNK) as u64));
    assert!(matches!(events.last().unwrap(), TransferEvent::Complete(_)));
}

#[tokio::test]
async fn test_cancel_while_pending() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "Cache/src.bin", &patterned(4 * CHUNK));
    let (engine, _bridge, mut rx) = engine(dir.path());

    // The current-thread runtime cannot poll the task before the next await.
    let handle = engine.copy("Cache/src.bin", "Cache/dst.bin").unwrap();
    assert_eq!(engine.state(handle), Some(TransferState::Pending));
    assert!(engine.cancel(handle));

    let events = collect(&mut rx, 1).await;
    assert_eq!(events.len(), 1);
    match &events[0] {
        TransferEvent::Error(error) => {
            assert_eq!(error.handle, handle);
            assert_eq!(error.kind, ErrorKind::Cancelled);
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(names_in(&dir.path().join("Cache")), vec!["src.bin"]);
    assert!(engine.active().is_empty());
}

#[tokio::test]
async fn test_copy_onto_itself_keeps_content() {
    let dir = tempfile::tempdir().unwrap();
    let data = patterned(3 * CHUNK + 7);
    write_source(dir.path(), "Cache/f.bin", &data);
    let (engine, _bridge, mut rx) = engine(dir.path());

    engine.copy("Cache/f.bin", "Cache/./f.bin").unwrap();
    let events = collect(&mut rx, 1).await;

    match events.last().unwrap() {
        TransferEvent::Complete(complete) => assert_eq!(complete.written, data.len() as u64),
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(std::fs::read(dir.path().join("Cache").join("f.bin")).unwrap(), data);
    assert_eq!(names_in(&dir.path().join("Cache")), vec!["f.bin"]);
}

#[tokio::test]
async fn test_cancelled_fetch_leaves_existing_destination() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "Cache/slow", b"previous download");
    let base = serve(Reply {
        status: "200 OK",
        body: patterned(4 * CHUNK),
        stall_after: Some(1024),
    })
    .await;
    let (engine, bridge, mut rx) = engine(dir.path());
    cancel_on_first_progress(&engine, &bridge);

    engine
        .fetch(format!("{base}/slow"), "Cache/slow", FetchOptions::default())
        .unwrap();
    let events = collect(&mut rx, 1).await;

    match events.last().unwrap() {
        TransferEvent::Error(error) => assert_eq!(error.kind, ErrorKind::Cancelled),
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(
        std::fs::read(dir.path().join("Cache").join("slow")).unwrap(),
        b"previous download"
    );
    assert_eq!(names_in(&dir.path().join("Cache")), vec!["slow"]);
}

#[tokio::test]
async fn test_failed_copy_leaves_existing_destination() {
    let dir = tempfile::tempdir().unwrap();
    write_source(dir.path(), "Cache/keep.txt", b"keep me");
    let (engine, _bridge, mut rx) = engine(dir.path());

    engine.copy("Cache/missing", "Cache/keep.txt").unwrap();
    let events = collect(&mut rx, 1).await;

    match events.last().unwrap() {
        TransferEvent::Error(error) => assert_eq!(error.kind, ErrorKind::NotFound),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(
        std::fs::read(dir.path().join("Cache").join("keep.txt")).unwrap(),
        b"keep me"
    );
}
