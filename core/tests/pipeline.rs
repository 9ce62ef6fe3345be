//! End-to-end pipeline scenarios against in-process HTTP stubs

use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode, Uri};
use axum::Router;
use tokio::net::TcpListener;

use ganda_core::emit::file_sink;
use ganda_core::{LeveledLogger, Pipeline, PipelineConfig, PipelineIo, ResponseBodyMode};

// ============================================================================
// Harness
// ============================================================================

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().expect("lock").clone()).expect("utf8")
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Bind the router on an ephemeral port, return its base url
async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("http://{addr}")
}

/// Run a full pipeline over `input`, returning (stdout, stderr)
async fn run_ganda(config: PipelineConfig, input: String) -> (String, String) {
    let stdout = SharedBuf::default();
    let stderr = SharedBuf::default();

    let logger: Arc<LeveledLogger> = if config.silent {
        Arc::new(LeveledLogger::silent())
    } else {
        Arc::new(LeveledLogger::new(config.color, Box::new(stderr.clone())))
    };

    let io = PipelineIo {
        input: Box::new(Cursor::new(input.into_bytes())),
        output: Arc::new(Mutex::new(Box::new(stdout.clone()))),
        logger,
    };

    let pipeline = Pipeline::new(config).expect("pipeline");
    pipeline.run(io).await.expect("run");

    (stdout.contents(), stderr.contents())
}

fn hello_router() -> Router {
    Router::new().fallback(|uri: Uri| async move { format!("Hello {}", uri.path()) })
}

fn status_router(status: StatusCode) -> Router {
    Router::new().fallback(move || async move { (status, String::new()) })
}

fn counting_router(status: StatusCode, counter: Arc<AtomicUsize>) -> Router {
    Router::new().fallback(move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        (status, String::new())
    })
}

/// Fails with 500 for the first `fail_times` requests, then answers 200
fn flaky_router(fail_times: usize, counter: Arc<AtomicUsize>) -> Router {
    Router::new().fallback(move || async move {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        if n < fail_times {
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        } else {
            (StatusCode::OK, "Retried request".to_string())
        }
    })
}

fn quick_retry_config(retries: u32) -> PipelineConfig {
    PipelineConfig {
        retries,
        base_retry_delay: Duration::from_millis(1),
        ..Default::default()
    }
}

// ============================================================================
// Happy path and output modes
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_happy_path() {
    let base = serve(hello_router()).await;
    let url = format!("{base}/foo/1");

    let (stdout, stderr) = run_ganda(PipelineConfig::default(), format!("{url}\n")).await;

    assert_eq!(stdout, "Hello /foo/1\n");
    assert_eq!(stderr, format!("Response: 200 {url}\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_color_output() {
    let base = serve(hello_router()).await;
    let url = format!("{base}/foo/1");

    let config = PipelineConfig {
        color: true,
        ..Default::default()
    };
    let (stdout, stderr) = run_ganda(config, format!("{url}\n")).await;

    assert_eq!(stdout, "Hello /foo/1\n");
    assert_eq!(stderr, format!("\x1b[32mResponse: 200 {url}\x1b[0m\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_silent_output() {
    let base = serve(hello_router()).await;
    let url = format!("{base}/foo/1");

    let config = PipelineConfig {
        silent: true,
        ..Default::default()
    };
    let (stdout, stderr) = run_ganda(config, format!("{url}\n")).await;

    assert_eq!(stdout, "Hello /foo/1\n");
    assert_eq!(stderr, "");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_response_body_transforms() {
    let base = serve(hello_router()).await;
    let url = format!("{base}/bar");

    let cases = [
        (ResponseBodyMode::Raw, "Hello /bar\n"),
        (ResponseBodyMode::Discard, ""),
        (ResponseBodyMode::Escaped, "\"Hello /bar\"\n"),
        (ResponseBodyMode::Base64, "SGVsbG8gL2Jhcg==\n"),
        (
            ResponseBodyMode::Sha256,
            "13a05f3ce0f3edc94bdeee3783c969dfb27c234b6dd98ce7fd004ffc69a45ece\n",
        ),
    ];

    for (mode, expected) in cases {
        let config = PipelineConfig {
            response_body: mode,
            ..Default::default()
        };
        let (stdout, stderr) = run_ganda(config, format!("{url}\n")).await;

        assert_eq!(stdout, expected, "stdout for {mode}");
        assert_eq!(stderr, format!("Response: 200 {url}\n"), "stderr for {mode}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_every_url_gets_exactly_one_log_line() {
    let base = serve(hello_router()).await;

    let count = 12;
    let input: String = (0..count)
        .map(|i| format!("{base}/foo/{i}\n"))
        .collect();

    let config = PipelineConfig {
        request_workers: 5,
        response_workers: 3,
        ..Default::default()
    };
    let (stdout, stderr) = run_ganda(config, input).await;

    assert_eq!(stderr.matches("Response: 200 ").count(), count);
    assert_eq!(stdout.matches("Hello /foo/").count(), count);
    assert_eq!(stdout.lines().count(), count);
}

// ============================================================================
// JSON envelope
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_json_envelope_on_error() {
    let base = serve(status_router(StatusCode::NOT_FOUND)).await;
    let url = format!("{base}/bar");

    let config = PipelineConfig {
        json_envelope: true,
        ..Default::default()
    };
    let (stdout, stderr) = run_ganda(config, format!("{url}\n")).await;

    assert_eq!(
        stdout,
        format!("{{ \"url\": \"{url}\", \"code\": 404, \"body\": null }}\n")
    );
    assert_eq!(stderr, format!("Response: 404 {url}\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_json_envelope_body_variants() {
    let router = Router::new().fallback(|| async { "{ \"foo\": \"/bar\" }" });
    let base = serve(router).await;
    let url = format!("{base}/bar");

    let cases = [
        (
            ResponseBodyMode::Raw,
            format!("{{ \"url\": \"{url}\", \"code\": 200, \"body\": {{ \"foo\": \"/bar\" }} }}\n"),
        ),
        (
            ResponseBodyMode::Discard,
            format!("{{ \"url\": \"{url}\", \"code\": 200, \"body\": null }}\n"),
        ),
        (
            ResponseBodyMode::Escaped,
            format!(
                "{{ \"url\": \"{url}\", \"code\": 200, \"body\": \"\"{{ \\\"foo\\\": \\\"/bar\\\" }}\"\" }}\n"
            ),
        ),
        (
            ResponseBodyMode::Base64,
            format!(
                "{{ \"url\": \"{url}\", \"code\": 200, \"body\": \"eyAiZm9vIjogIi9iYXIiIH0=\" }}\n"
            ),
        ),
        (
            ResponseBodyMode::Sha256,
            format!(
                "{{ \"url\": \"{url}\", \"code\": 200, \"body\": \"f660cd1420c6acd9408932b9983909c26ab6cb21ffb40525670a7b7aa67092ec\" }}\n"
            ),
        ),
    ];

    for (mode, expected) in cases {
        let config = PipelineConfig {
            json_envelope: true,
            response_body: mode,
            ..Default::default()
        };
        let (stdout, _) = run_ganda(config, format!("{url}\n")).await;
        assert_eq!(stdout, expected, "envelope for {mode}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sha256_envelope_known_digest() {
    let router = Router::new().fallback(|| async { "hello world" });
    let base = serve(router).await;
    let url = format!("{base}/x");

    let config = PipelineConfig {
        json_envelope: true,
        response_body: ResponseBodyMode::Sha256,
        ..Default::default()
    };
    let (stdout, _) = run_ganda(config, format!("{url}\n")).await;

    assert!(stdout
        .contains("\"body\": \"b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9\""));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_json_lines_context_round_trips() {
    let base = serve(status_router(StatusCode::OK)).await;
    let url = format!("{base}/x");

    let input = format!(
        "{{\"url\":\"{url}\",\"context\":[\"a\",\"b\"]}}\n{{\"url\":\"{url}\",\"method\":\"DELETE\",\"context\":\"baz\"}}\n"
    );

    let config = PipelineConfig {
        json_envelope: true,
        ..Default::default()
    };
    let (stdout, stderr) = run_ganda(config, input).await;

    assert_eq!(
        stdout,
        format!(
            "{{ \"url\": \"{url}\", \"code\": 200, \"body\": null, \"context\": [\"a\",\"b\"] }}\n{{ \"url\": \"{url}\", \"code\": 200, \"body\": null, \"context\": \"baz\" }}\n"
        )
    );
    assert_eq!(
        stderr,
        format!("Response: 200 {url}\nResponse: 200 {url}\n")
    );
}

// ============================================================================
// Retries
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_retry_then_success() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let base = serve(flaky_router(1, Arc::clone(&attempts))).await;
    let url = format!("{base}/bar");

    let (stdout, stderr) = run_ganda(quick_retry_config(1), format!("{url}\n")).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(stdout, "Retried request\n");
    assert_eq!(
        stderr,
        format!("Response: 500 {url} (1)\nResponse: 200 {url}\n")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_exhausted_retries_surface_final_response() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let base = serve(counting_router(
        StatusCode::INTERNAL_SERVER_ERROR,
        Arc::clone(&attempts),
    ))
    .await;
    let url = format!("{base}/bar");

    let (stdout, stderr) = run_ganda(quick_retry_config(2), format!("{url}\n")).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(stdout, "");
    assert_eq!(
        stderr,
        format!(
            "Response: 500 {url} (1)\nResponse: 500 {url} (2)\nResponse: 500 {url}\n"
        )
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_4xx_is_never_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let base = serve(counting_router(
        StatusCode::BAD_REQUEST,
        Arc::clone(&attempts),
    ))
    .await;
    let url = format!("{base}/bar");

    let (stdout, stderr) = run_ganda(quick_retry_config(3), format!("{url}\n")).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(stdout, "");
    assert_eq!(stderr, format!("Response: 400 {url}\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_transport_error_drops_descriptor() {
    // nothing is listening on this port
    let url = "http://127.0.0.1:9/unreachable";

    let config = PipelineConfig {
        connect_timeout: Duration::from_millis(250),
        ..Default::default()
    };
    let (stdout, stderr) = run_ganda(config, format!("{url}\n")).await;

    assert_eq!(stdout, "");
    assert!(stderr.contains(&format!("{url} Error: ")));
    assert_eq!(stderr.lines().count(), 1);
}

// ============================================================================
// Request shaping
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_connection_header_and_per_line_override() {
    let router = Router::new().fallback(|headers: HeaderMap| async move {
        let token = headers
            .get("x-token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("missing");
        let connection = headers
            .get("connection")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("missing");
        format!("{token}/{connection}")
    });
    let base = serve(router).await;
    let url = format!("{base}/h");

    let input = format!(
        "{{\"url\":\"{url}\"}}\n{{\"url\":\"{url}\",\"headers\":{{\"X-Token\":\"line-value\"}}}}\n"
    );

    let config = PipelineConfig {
        request_headers: vec![ganda_core::Header::new("X-Token", "static-value")],
        ..Default::default()
    };
    let (stdout, _) = run_ganda(config, input).await;

    assert_eq!(stdout, "static-value/keep-alive\nline-value/keep-alive\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_data_template_posts_rendered_body() {
    let router = Router::new().fallback(|body: String| async move { body });
    let base = serve(router).await;
    let url = format!("{base}/post");

    let config = PipelineConfig {
        request_method: "POST".to_string(),
        data_template: Some("value: %s".to_string()),
        ..Default::default()
    };
    let (stdout, _) = run_ganda(config, format!("{url} 123\n")).await;

    assert_eq!(stdout, "value: 123\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_json_lines_body_is_sent() {
    let router = Router::new().fallback(|body: String| async move { body });
    let base = serve(router).await;
    let url = format!("{base}/post");

    let input = format!(
        "{{\"url\":\"{url}\",\"method\":\"POST\",\"body\":{{\"a\":1}}}}\n{{\"url\":\"{url}\",\"method\":\"POST\",\"body\":\"aGVsbG8=\",\"bodyType\":\"base64\"}}\n"
    );
    let (stdout, _) = run_ganda(PipelineConfig::default(), input).await;

    assert_eq!(stdout, "{\"a\":1}\nhello\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bad_url_is_logged_and_dropped() {
    let base = serve(hello_router()).await;
    let url = format!("{base}/ok");

    let input = format!("not-a-url\n{url}\n");
    let (stdout, stderr) = run_ganda(PipelineConfig::default(), input).await;

    assert_eq!(stdout, "Hello /ok\n");
    assert!(stderr.contains("not-a-url Error: "));
    assert!(stderr.contains(&format!("Response: 200 {url}")));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_parse_error_aborts_stream_but_not_in_flight_work() {
    let base = serve(hello_router()).await;
    let url = format!("{base}/first");

    let input = format!("{{\"url\":\"{url}\"}}\nnot json\n{{\"url\":\"{base}/never\"}}\n");
    let (stdout, stderr) = run_ganda(PipelineConfig::default(), input).await;

    assert_eq!(stdout, "Hello /first\n");
    assert!(stderr.contains("error parsing requests Error: line 2"));
    assert!(!stderr.contains("/never"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fatal_parse_error_before_any_request() {
    let stdout = SharedBuf::default();
    let stderr = SharedBuf::default();

    let io = PipelineIo {
        input: Box::new(Cursor::new(b"{\"method\":\"POST\"}\n".to_vec())),
        output: Arc::new(Mutex::new(Box::new(stdout.clone()))),
        logger: Arc::new(LeveledLogger::new(false, Box::new(stderr.clone()))),
    };

    let pipeline = Pipeline::new(PipelineConfig::default()).expect("pipeline");
    let result = pipeline.run(io).await;

    assert!(result.is_err(), "first-line parse error should be fatal");
    assert!(result
        .expect_err("parse error")
        .to_string()
        .contains("missing url property"));
    assert_eq!(stdout.contents(), "");
}

// ============================================================================
// Throttle
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_throttle_spaces_out_requests() {
    let base = serve(hello_router()).await;
    let input: String = (0..3).map(|i| format!("{base}/{i}\n")).collect();

    let config = PipelineConfig {
        request_workers: 3,
        throttle_per_second: std::num::NonZeroU32::new(50),
        ..Default::default()
    };

    let start = std::time::Instant::now();
    let (stdout, _) = run_ganda(config, input).await;
    let elapsed = start.elapsed();

    assert_eq!(stdout.lines().count(), 3);
    // 50/s means the third request cannot start before ~40ms
    assert!(elapsed >= Duration::from_millis(30), "finished in {elapsed:?}");
}

// ============================================================================
// File output
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_responses_saved_to_files() {
    let base = serve(hello_router()).await;
    let url = format!("{base}/bar");
    let dir = tempfile::tempdir().expect("tempdir");

    let config = PipelineConfig {
        output_directory: Some(dir.path().to_path_buf()),
        ..Default::default()
    };
    let (stdout, stderr) = run_ganda(config, format!("{url}\n")).await;

    let filename = file_sink::sanitized_filename(&url);
    let path = dir.path().join(&filename);

    assert_eq!(stdout, "");
    assert_eq!(
        std::fs::read_to_string(&path).expect("response file"),
        "Hello /bar"
    );
    assert_eq!(
        stderr,
        format!("Response: 200 {url} -> {}\n", path.display())
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_files_land_in_hashed_subdirectories() {
    let base = serve(hello_router()).await;
    let url = format!("{base}/bar");
    let dir = tempfile::tempdir().expect("tempdir");

    let config = PipelineConfig {
        output_directory: Some(dir.path().to_path_buf()),
        subdir_length: 2,
        ..Default::default()
    };
    let (_, stderr) = run_ganda(config, format!("{url}\n")).await;

    let filename = file_sink::sanitized_filename(&url);
    let path = file_sink::target_path(dir.path(), 2, &filename);

    assert!(path.exists(), "missing {path:?}; stderr: {stderr}");
    assert_eq!(
        path.parent().and_then(|p| p.file_name()).map(|n| n.len()),
        Some(2)
    );
}
