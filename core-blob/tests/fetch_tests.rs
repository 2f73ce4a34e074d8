//! End-to-end transfer tests against a mocked HTTP bridge and a real
//! temporary filesystem.

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    BridgeError, ByteStream, HttpBody, HttpClient, HttpMethod, HttpRequest, HttpStreamResponse,
    PlatformDirectories,
};
use bytes::Bytes;
use core_blob::response::ResponseType;
use core_blob::{
    cache_key, wrap, BlobError, BlobFetcher, DataKind, Encoding, FormField, Fs, Headers, Payload,
    ProgressOptions, RequestBody, RequestConfig, RnfbEncode, SessionRegistry,
};
use core_runtime::config::BlobConfig;
use core_runtime::events::{CoreEvent, EventBus, TransferEvent};
use futures::stream::{self, StreamExt};
use mockall::mock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

mock! {
    Http {}

    #[async_trait]
    impl HttpClient for Http {
        async fn send(&self, request: HttpRequest) -> BridgeResult<HttpStreamResponse>;
        async fn is_connected(&self) -> bool;
    }
}

fn body_of(chunks: &[&'static [u8]]) -> ByteStream {
    let chunks: Vec<std::io::Result<Bytes>> =
        chunks.iter().map(|c| Ok(Bytes::from_static(c))).collect();
    stream::iter(chunks).boxed()
}

fn response(status: u16, content_type: &str, chunks: &[&'static [u8]]) -> HttpStreamResponse {
    let length = chunks.iter().map(|c| c.len() as u64).sum();
    let mut headers = HashMap::new();
    headers.insert("content-type".to_string(), content_type.to_string());
    HttpStreamResponse {
        status,
        headers,
        final_url: "https://example.com/file".to_string(),
        content_length: Some(length),
        body: body_of(chunks),
    }
}

fn fetcher(root: &Path, http: Arc<dyn HttpClient>) -> BlobFetcher {
    let config = BlobConfig::builder()
        .file_system(Arc::new(TokioFileSystem::new()))
        .http_client(http)
        .directories(PlatformDirectories::rooted_at(root))
        .build()
        .unwrap();
    let fs = Fs::new(&config, EventBus::new(64)).with_sessions(SessionRegistry::new());
    BlobFetcher::new(&config, fs)
}

#[tokio::test]
async fn test_buffered_json_response() {
    let dir = tempfile::tempdir().unwrap();
    let mut http = MockHttp::new();
    http.expect_send()
        .withf(|req| req.method == HttpMethod::Get && req.url == "https://example.com/file")
        .times(1)
        .returning(|_| Ok(response(200, "application/json", &[b"{\"ok\":", b"true}"])));

    let fetcher = fetcher(dir.path(), Arc::new(http));
    let res = fetcher
        .fetch(
            RequestConfig::default(),
            HttpMethod::Get,
            "https://example.com/file",
            Headers::new(),
            RequestBody::Empty,
        )
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.info().resp_type, ResponseType::Json);
    assert_eq!(res.info().rnfb_encode, RnfbEncode::Utf8);
    assert_eq!(res.response_type(), DataKind::Utf8);
    assert_eq!(res.data(), Payload::Text("{\"ok\":true}".to_string()));
    let value: serde_json::Value = res.json().await.unwrap();
    assert_eq!(value["ok"], true);
    assert!(res.path().is_none());
}

#[tokio::test]
async fn test_error_status_still_resolves() {
    let dir = tempfile::tempdir().unwrap();
    let mut http = MockHttp::new();
    http.expect_send()
        .returning(|_| Ok(response(404, "text/plain", &[b"missing"])));

    let fetcher = fetcher(dir.path(), Arc::new(http));
    let res = fetcher
        .fetch(
            RequestConfig::default(),
            HttpMethod::Get,
            "https://example.com/file",
            Headers::new(),
            RequestBody::Empty,
        )
        .await
        .unwrap();

    assert_eq!(res.status(), 404);
    assert_eq!(res.text().await.unwrap(), "missing");
}

#[tokio::test]
async fn test_file_cache_stores_body_and_joins_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut http = MockHttp::new();
    http.expect_send()
        .returning(|_| Ok(response(200, "image/png", &[b"PNG", b"DATA"])));

    let fetcher = fetcher(dir.path(), Arc::new(http));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in_cb = seen.clone();

    let task = fetcher
        .fetch(
            RequestConfig::default()
                .file_cache(true)
                .append_ext("png")
                .session("gallery"),
            HttpMethod::Get,
            "https://example.com/file",
            Headers::new(),
            RequestBody::Empty,
        )
        .progress(move |received, total| seen_in_cb.lock().unwrap().push((received, total)));
    let task_id = task.task_id().to_string();
    let res = task.await.unwrap();

    let stored = res.path().unwrap().to_path_buf();
    assert_eq!(
        stored,
        dir.path()
            .join("Caches")
            .join(format!("RNFetchBlobTmp_{}.png", task_id))
    );
    assert_eq!(res.response_type(), DataKind::Path);
    assert_eq!(std::fs::read(&stored).unwrap(), b"PNGDATA");
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(3, Some(7)), (7, Some(7))]
    );

    let session = fetcher.fs().session("gallery");
    assert_eq!(session.list(), vec![stored.clone()]);
    session.dispose(fetcher.fs().access().as_ref()).await.unwrap();
    assert!(!stored.exists());
}

#[tokio::test]
async fn test_cached_key_skips_network() {
    let dir = tempfile::tempdir().unwrap();
    let mut http = MockHttp::new();
    http.expect_send().never();

    let fetcher = fetcher(dir.path(), Arc::new(http));
    let cached = dir.path().join("Caches").join(cache_key("avatar-42"));
    std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
    std::fs::write(&cached, b"cached bytes").unwrap();

    let res = fetcher
        .fetch(
            RequestConfig::default().key("avatar-42"),
            HttpMethod::Get,
            "https://example.com/avatar",
            Headers::new(),
            RequestBody::Empty,
        )
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.path(), Some(cached.as_path()));
    assert_eq!(res.text().await.unwrap(), "cached bytes");
}

#[tokio::test]
async fn test_key_miss_downloads_into_key_path() {
    let dir = tempfile::tempdir().unwrap();
    let mut http = MockHttp::new();
    http.expect_send()
        .times(1)
        .returning(|_| Ok(response(200, "image/jpeg", &[b"JPEG"])));

    let fetcher = fetcher(dir.path(), Arc::new(http));
    let res = fetcher
        .fetch(
            RequestConfig::default().key("banner").append_ext("jpg"),
            HttpMethod::Get,
            "https://example.com/banner",
            Headers::new(),
            RequestBody::Empty,
        )
        .await
        .unwrap();

    let expected = dir
        .path()
        .join("Caches")
        .join(format!("{}.jpg", cache_key("banner")));
    assert_eq!(res.path(), Some(expected.as_path()));
    assert_eq!(std::fs::read(expected).unwrap(), b"JPEG");
}

#[tokio::test]
async fn test_cancel_removes_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut http = MockHttp::new();
    http.expect_send().returning(|_| {
        let mut res = response(200, "application/octet-stream", &[b"first"]);
        res.content_length = Some(1024);
        res.body = res.body.chain(stream::pending()).boxed();
        Ok(res)
    });

    let fetcher = fetcher(dir.path(), Arc::new(http));
    let mut events = fetcher.events().subscribe();

    let task = fetcher.fetch(
        RequestConfig::default().file_cache(true),
        HttpMethod::Get,
        "https://example.com/big",
        Headers::new(),
        RequestBody::Empty,
    );
    let token = task.cancel_token();
    let task_id = task.task_id().to_string();
    let err = task
        .progress(move |_, _| token.cancel())
        .await
        .unwrap_err();

    assert!(matches!(err, BlobError::Cancelled { ref task_id } if !task_id.is_empty()));
    let partial = dir
        .path()
        .join("Caches")
        .join(format!("RNFetchBlobTmp_{}", task_id));
    assert!(!partial.exists());

    let mut cancelled = false;
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Transfer(TransferEvent::Cancelled { task_id: id }) = event {
            cancelled = id == task_id;
        }
    }
    assert!(cancelled);
}

#[tokio::test]
async fn test_cancel_before_start_never_sends() {
    let dir = tempfile::tempdir().unwrap();
    let mut http = MockHttp::new();
    http.expect_send().never();

    let fetcher = fetcher(dir.path(), Arc::new(http));
    let task = fetcher.fetch(
        RequestConfig::default(),
        HttpMethod::Get,
        "https://example.com/",
        Headers::new(),
        RequestBody::Empty,
    );
    task.cancel();
    assert!(task.await.unwrap_err().is_cancelled());
}

#[tokio::test]
async fn test_overwrite_false_appends_to_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut http = MockHttp::new();
    http.expect_send()
        .returning(|_| Ok(response(200, "text/plain", &[b" world"])));

    let fetcher = fetcher(dir.path(), Arc::new(http));
    let target = dir.path().join("log.txt");
    std::fs::write(&target, b"hello").unwrap();

    fetcher
        .fetch(
            RequestConfig::default()
                .path(wrap::wrap(target.to_string_lossy()))
                .overwrite(false),
            HttpMethod::Get,
            "https://example.com/log",
            Headers::new(),
            RequestBody::Empty,
        )
        .await
        .unwrap();

    assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello world");
}

#[tokio::test]
async fn test_base64_body_is_decoded_and_marker_stripped() {
    let dir = tempfile::tempdir().unwrap();
    let mut http = MockHttp::new();
    http.expect_send()
        .withf(|req| {
            req.headers.get("Content-Type").map(String::as_str) == Some("image/png")
                && req.body.len() == Some(3)
        })
        .returning(|_| Ok(response(201, "text/plain", &[b"ok"])));

    let fetcher = fetcher(dir.path(), Arc::new(http));
    let mut headers = Headers::new();
    headers.insert("Content-Type".to_string(), "image/png;BASE64".to_string());

    let res = fetcher
        .fetch(
            RequestConfig::default(),
            HttpMethod::Post,
            "https://example.com/upload",
            headers,
            RequestBody::from("AAEC"),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
}

#[tokio::test]
async fn test_request_options_reach_the_bridge() {
    let dir = tempfile::tempdir().unwrap();
    let mut http = MockHttp::new();
    http.expect_send()
        .withf(|req| {
            req.timeout == Some(Duration::from_millis(1500))
                && !req.follow_redirects
                && req.trust_all_certificates
        })
        .returning(|_| Ok(response(302, "", &[])));

    let fetcher = fetcher(dir.path(), Arc::new(http));
    let res = fetcher
        .fetch(
            RequestConfig::default()
                .timeout(Duration::from_millis(1500))
                .follow_redirect(false)
                .trusty(true),
            HttpMethod::Get,
            "https://example.com/file",
            Headers::new(),
            RequestBody::Empty,
        )
        .await
        .unwrap();

    assert_eq!(res.status(), 302);
    assert_eq!(res.info().resp_type, ResponseType::Empty);
    assert_eq!(res.info().redirects, vec!["https://example.com/file".to_string()]);
}

/// Drains streamed request bodies the way a real client would.
struct DrainingClient {
    received: Arc<Mutex<Vec<u8>>>,
}

#[async_trait]
impl HttpClient for DrainingClient {
    async fn send(&self, request: HttpRequest) -> BridgeResult<HttpStreamResponse> {
        if let HttpBody::Stream { mut stream, .. } = request.body {
            while let Some(chunk) = stream.next().await {
                self.received.lock().unwrap().extend_from_slice(&chunk?);
            }
        }
        Ok(response(200, "text/plain", &[b"done"]))
    }
}

#[tokio::test]
async fn test_upload_progress_covers_whole_body() {
    let dir = tempfile::tempdir().unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));
    let fetcher = fetcher(
        dir.path(),
        Arc::new(DrainingClient {
            received: received.clone(),
        }),
    );

    let source = dir.path().join("upload.bin");
    std::fs::write(&source, vec![9u8; 200_000]).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in_cb = seen.clone();
    let res = fetcher
        .fetch(
            RequestConfig::default(),
            HttpMethod::Put,
            "https://example.com/upload",
            Headers::new(),
            RequestBody::Text(wrap::wrap(source.to_string_lossy())),
        )
        .upload_progress_with(ProgressOptions::count(4), move |written, total| {
            seen_in_cb.lock().unwrap().push((written, total))
        })
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(received.lock().unwrap().len(), 200_000);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.last(), Some(&(200_000, Some(200_000))));
    assert!(seen.len() <= 5);
}

#[tokio::test]
async fn test_multipart_upload_sets_boundary_header() {
    let dir = tempfile::tempdir().unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));
    let fetcher = fetcher(
        dir.path(),
        Arc::new(DrainingClient {
            received: received.clone(),
        }),
    );

    let task = fetcher.fetch(
        RequestConfig::default(),
        HttpMethod::Post,
        "https://example.com/form",
        Headers::new(),
        RequestBody::Multipart(vec![FormField::text("name", "value")]),
    );
    let boundary = format!("RNFetchBlob-{}", task.task_id());
    task.await.unwrap();

    let body = String::from_utf8(received.lock().unwrap().clone()).unwrap();
    assert!(body.starts_with(&format!("--{}\r\n", boundary)));
    assert!(body.ends_with(&format!("--{}--\r\n", boundary)));
}

#[tokio::test]
async fn test_fetch_file_get_reads_with_encoding() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = fetcher(dir.path(), Arc::new(MockHttp::new()));
    let source = dir.path().join("local.txt");
    std::fs::write(&source, b"local data").unwrap();

    let mut headers = Headers::new();
    headers.insert("Encoding".to_string(), "base64".to_string());
    headers.insert("bufferSize".to_string(), "4".to_string());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in_cb = seen.clone();
    let res = fetcher
        .fetch_file(
            RequestConfig::default(),
            HttpMethod::Get,
            wrap::wrap(source.to_string_lossy()),
            headers,
            RequestBody::Empty,
        )
        .progress(move |read, total| seen_in_cb.lock().unwrap().push((read, total)))
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.info().rnfb_encode, RnfbEncode::Base64);
    assert_eq!(res.base64().await.unwrap(), "bG9jYWwgZGF0YQ==");
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(4, Some(10)), (8, Some(10)), (10, Some(10))]
    );
}

#[tokio::test]
async fn test_fetch_file_post_writes_body() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = fetcher(dir.path(), Arc::new(MockHttp::new()));
    let target = dir.path().join("out.txt");

    let res = fetcher
        .fetch_file(
            RequestConfig::default(),
            HttpMethod::Post,
            format!("file://{}", target.to_string_lossy()),
            Headers::new(),
            RequestBody::from("written locally"),
        )
        .await
        .unwrap();

    assert_eq!(res.path(), Some(target.as_path()));
    assert_eq!(
        fetcher
            .fs()
            .read_file(&target.to_string_lossy(), Encoding::Utf8, None)
            .await
            .unwrap(),
        Payload::Text("written locally".to_string())
    );
}

#[tokio::test]
async fn test_fetch_file_rejects_remote_urls() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = fetcher(dir.path(), Arc::new(MockHttp::new()));
    let err = fetcher
        .fetch_file(
            RequestConfig::default(),
            HttpMethod::Get,
            "https://example.com/file",
            Headers::new(),
            RequestBody::Empty,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BlobError::InvalidUri(_)));
}

#[tokio::test]
async fn test_completed_event_carries_stored_path() {
    let dir = tempfile::tempdir().unwrap();
    let mut http = MockHttp::new();
    http.expect_send()
        .returning(|_| Ok(response(200, "image/gif", &[b"GIF89a"])));

    let fetcher = fetcher(dir.path(), Arc::new(http));
    let mut events = fetcher.events().subscribe();
    let target = dir.path().join("Documents").join("a.gif");

    fetcher
        .fetch(
            RequestConfig::default().path(target.to_string_lossy()),
            HttpMethod::Get,
            "https://example.com/a.gif",
            Headers::new(),
            RequestBody::Empty,
        )
        .await
        .unwrap();

    let mut kinds = Vec::new();
    while let Ok(CoreEvent::Transfer(event)) = events.try_recv() {
        if let TransferEvent::Completed { path, status, .. } = &event {
            assert_eq!(*status, 200);
            assert_eq!(path.as_deref(), Some(target.to_string_lossy().as_ref()));
        }
        kinds.push(std::mem::discriminant(&event));
    }
    assert!(kinds.len() >= 3);
}

#[tokio::test]
async fn test_slow_body_outlasting_timeout_completes() {
    let dir = tempfile::tempdir().unwrap();
    let mut http = MockHttp::new();
    http.expect_send().returning(|_| {
        let mut res = response(200, "text/plain", &[]);
        res.content_length = Some(6);
        res.body = stream::unfold(0u8, |i| async move {
            if i == 6 {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            Some((Ok::<_, std::io::Error>(Bytes::from(vec![b'a' + i])), i + 1))
        })
        .boxed();
        Ok(res)
    });

    let fetcher = fetcher(dir.path(), Arc::new(http));
    let started = std::time::Instant::now();
    let res = fetcher
        .fetch(
            RequestConfig::default().timeout(Duration::from_millis(250)),
            HttpMethod::Get,
            "https://example.com/slow",
            Headers::new(),
            RequestBody::Empty,
        )
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(500));
    assert_eq!(res.text().await.unwrap(), "abcdef");
}

#[tokio::test]
async fn test_stalled_body_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let mut http = MockHttp::new();
    http.expect_send().returning(|_| {
        let mut res = response(200, "application/octet-stream", &[b"first"]);
        res.content_length = Some(1024);
        res.body = res.body.chain(stream::pending()).boxed();
        Ok(res)
    });

    let fetcher = fetcher(dir.path(), Arc::new(http));
    let target = dir.path().join("Documents").join("stalled.bin");
    let err = fetcher
        .fetch(
            RequestConfig::default()
                .path(target.to_string_lossy())
                .timeout(Duration::from_millis(100)),
            HttpMethod::Get,
            "https://example.com/stalled",
            Headers::new(),
            RequestBody::Empty,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BlobError::Bridge(BridgeError::Timeout)));
    assert!(!target.exists());
}

#[tokio::test]
async fn test_fetch_file_utf8_rejects_invalid_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = fetcher(dir.path(), Arc::new(MockHttp::new()));
    let source = dir.path().join("binary.dat");
    std::fs::write(&source, [0xff, 0xfe, b'A']).unwrap();

    let err = fetcher
        .fetch_file(
            RequestConfig::default(),
            HttpMethod::Get,
            wrap::wrap(source.to_string_lossy()),
            Headers::new(),
            RequestBody::Empty,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BlobError::Encoding(_)));

    let mut headers = Headers::new();
    headers.insert("encoding".to_string(), "base64".to_string());
    let res = fetcher
        .fetch_file(
            RequestConfig::default(),
            HttpMethod::Get,
            wrap::wrap(source.to_string_lossy()),
            headers,
            RequestBody::Empty,
        )
        .await
        .unwrap();
    assert_eq!(res.data(), Payload::Text("//5B".to_string()));
}

#[tokio::test]
async fn test_forced_utf8_header_keeps_invalid_bytes_as_base64() {
    let dir = tempfile::tempdir().unwrap();
    let mut http = MockHttp::new();
    http.expect_send().returning(|_| {
        let mut res = response(200, "text/plain", &[&[0xff, 0xfe, b'A']]);
        res.headers
            .insert("rnfb-response".to_string(), "utf8".to_string());
        Ok(res)
    });

    let fetcher = fetcher(dir.path(), Arc::new(http));
    let res = fetcher
        .fetch(
            RequestConfig::default(),
            HttpMethod::Get,
            "https://example.com/bytes",
            Headers::new(),
            RequestBody::Empty,
        )
        .await
        .unwrap();

    assert_eq!(res.info().rnfb_encode, RnfbEncode::Base64);
    assert_eq!(res.response_type(), DataKind::Base64);
    assert_eq!(res.data(), Payload::Text("//5B".to_string()));
    assert!(res.text().await.is_err());
}

#[tokio::test]
async fn test_path_outranks_key() {
    let dir = tempfile::tempdir().unwrap();
    let mut http = MockHttp::new();
    http.expect_send()
        .times(1)
        .returning(|_| Ok(response(200, "text/plain", &[b"fresh"])));

    let fetcher = fetcher(dir.path(), Arc::new(http));
    let cached = dir.path().join("Caches").join(cache_key("report"));
    std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
    std::fs::write(&cached, b"stale").unwrap();
    let target = dir.path().join("Documents").join("report.txt");

    let res = fetcher
        .fetch(
            RequestConfig::default()
                .key("report")
                .path(target.to_string_lossy()),
            HttpMethod::Get,
            "https://example.com/report",
            Headers::new(),
            RequestBody::Empty,
        )
        .await
        .unwrap();

    assert_eq!(res.path(), Some(target.as_path()));
    assert_eq!(std::fs::read(&target).unwrap(), b"fresh");
    assert_eq!(std::fs::read(&cached).unwrap(), b"stale");
}

#[tokio::test]
async fn test_stored_response_accessors() {
    let dir = tempfile::tempdir().unwrap();
    let mut http = MockHttp::new();
    http.expect_send()
        .returning(|_| Ok(response(200, "application/json", &[b"{\"n\":", b"7}"])));

    let fetcher = fetcher(dir.path(), Arc::new(http));
    let res = fetcher
        .fetch(
            RequestConfig::default().file_cache(true).append_ext("json"),
            HttpMethod::Get,
            "https://example.com/data.json",
            Headers::new(),
            RequestBody::Empty,
        )
        .await
        .unwrap();
    let stored = res.path().unwrap().to_path_buf();

    let value: serde_json::Value = res.json().await.unwrap();
    assert_eq!(value["n"], 7);
    assert_eq!(res.base64().await.unwrap(), "eyJuIjo3fQ==");
    assert_eq!(res.array().await.unwrap(), b"{\"n\":7}".to_vec());
    assert_eq!(
        res.read_file(Encoding::Utf8).await.unwrap(),
        Payload::Text("{\"n\":7}".to_string())
    );

    let session = res.session("downloads").unwrap();
    assert_eq!(session.list(), vec![stored.clone()]);

    let chunks = Arc::new(Mutex::new(String::new()));
    let chunks_in_cb = chunks.clone();
    let reader = res.read_stream(Encoding::Utf8).await.unwrap().unwrap();
    assert_eq!(reader.path(), stored.as_path());
    reader.on_data(move |data| {
        if let Payload::Text(text) = data {
            chunks_in_cb.lock().unwrap().push_str(&text);
        }
    });
    reader.open().unwrap();
    reader.wait().await.unwrap();
    assert_eq!(*chunks.lock().unwrap(), "{\"n\":7}");

    res.flush().await.unwrap();
    assert!(!stored.exists());
    res.flush().await.unwrap();
}

#[tokio::test]
async fn test_buffered_response_has_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut http = MockHttp::new();
    http.expect_send()
        .returning(|_| Ok(response(200, "text/plain", &[b"in memory"])));

    let fetcher = fetcher(dir.path(), Arc::new(http));
    let res = fetcher
        .fetch(
            RequestConfig::default(),
            HttpMethod::Get,
            "https://example.com/note",
            Headers::new(),
            RequestBody::Empty,
        )
        .await
        .unwrap();

    assert!(res.session("downloads").is_none());
    assert!(!fetcher.fs().sessions().contains("downloads"));
    assert!(res.read_stream(Encoding::Utf8).await.unwrap().is_none());
    res.flush().await.unwrap();
    assert_eq!(res.array().await.unwrap(), b"in memory".to_vec());
    assert_eq!(res.base64().await.unwrap(), "aW4gbWVtb3J5");
}
