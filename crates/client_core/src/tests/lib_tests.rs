use super::*;
use std::{
    collections::VecDeque,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::oneshot};

struct RecordedUpload {
    field_name: String,
    filename: Option<String>,
    content_type: Option<String>,
    byte_len: usize,
    num_colors: Option<u32>,
}

enum MockReply {
    Body(Value),
    Status(StatusCode, Value),
    Gated {
        unblock: oneshot::Receiver<()>,
        body: Value,
    },
}

#[derive(Clone)]
struct ServerState {
    hits: Arc<AtomicUsize>,
    uploads: Arc<Mutex<Vec<RecordedUpload>>>,
    replies: Arc<Mutex<VecDeque<MockReply>>>,
}

#[derive(Deserialize)]
struct AnalyzeQuery {
    num_colors: Option<u32>,
}

async fn handle_analyze(
    State(state): State<ServerState>,
    Query(query): Query<AnalyzeQuery>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let mut recorded = RecordedUpload {
        field_name: String::new(),
        filename: None,
        content_type: None,
        byte_len: 0,
        num_colors: query.num_colors,
    };
    while let Some(field) = multipart.next_field().await.expect("read multipart field") {
        recorded.field_name = field.name().unwrap_or_default().to_string();
        recorded.filename = field.file_name().map(str::to_string);
        recorded.content_type = field.content_type().map(str::to_string);
        recorded.byte_len = field.bytes().await.expect("field bytes").len();
    }
    state.uploads.lock().await.push(recorded);

    let reply = state
        .replies
        .lock()
        .await
        .pop_front()
        .unwrap_or_else(|| MockReply::Body(palette_body(json!([red_swatch()]))));
    match reply {
        MockReply::Body(body) => (StatusCode::OK, Json(body)).into_response(),
        MockReply::Status(status, body) => (status, Json(body)).into_response(),
        MockReply::Gated { unblock, body } => {
            let _ = unblock.await;
            (StatusCode::OK, Json(body)).into_response()
        }
    }
}

async fn spawn_analysis_service() -> (String, ServerState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let state = ServerState {
        hits: Arc::new(AtomicUsize::new(0)),
        uploads: Arc::new(Mutex::new(Vec::new())),
        replies: Arc::new(Mutex::new(VecDeque::new())),
    };
    let app = Router::new()
        .route(ANALYZE_PATH, post(handle_analyze))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

fn red_swatch() -> Value {
    json!({"rgb": [255, 0, 0], "hex": "#FF0000", "percentage": 42.5, "name": "red"})
}

fn palette_body(colors: Value) -> Value {
    let total = colors.as_array().map(Vec::len).unwrap_or(0);
    json!({
        "filename": "upload.png",
        "image_size": {"width": 2, "height": 2},
        "colors": colors,
        "total_colors": total,
    })
}

fn sample_png() -> Vec<u8> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    let pixels = image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]));
    image::DynamicImage::ImageRgba8(pixels)
        .write_to(&mut buffer, image::ImageFormat::Png)
        .expect("encode sample png");
    buffer.into_inner()
}

fn png_selection() -> ImageSelection {
    ImageSelection {
        filename: "upload.png".to_string(),
        mime_type: Some("image/png".to_string()),
        bytes: sample_png(),
    }
}

#[tokio::test]
async fn select_image_decodes_preview_and_enters_image_selected() {
    let client = AnalysisClient::new(DEFAULT_SERVER_URL);

    client.select_image(png_selection()).await.expect("select");

    assert_eq!(client.state().await, WorkflowState::ImageSelected);
    let preview = client.preview().await.expect("preview present");
    assert!(preview.width > 0 && preview.height > 0);
    assert!(!preview.rgba.is_empty());
    assert_eq!(
        client.selected_filename().await.as_deref(),
        Some("upload.png")
    );
}

#[tokio::test]
async fn empty_selection_is_a_noop() {
    let client = AnalysisClient::new(DEFAULT_SERVER_URL);

    client
        .select_image(ImageSelection {
            filename: String::new(),
            mime_type: None,
            bytes: Vec::new(),
        })
        .await
        .expect("empty selection");

    assert_eq!(client.state().await, WorkflowState::Idle);
    assert!(client.preview().await.is_none());
    assert_eq!(client.selected_filename().await, None);
}

#[tokio::test]
async fn undecodable_selection_is_abandoned_and_surfaced() {
    let client = AnalysisClient::new(DEFAULT_SERVER_URL);
    client.select_image(png_selection()).await.expect("select");

    let err = client
        .select_image(ImageSelection {
            filename: "notes.txt".to_string(),
            mime_type: Some("text/plain".to_string()),
            bytes: b"definitely not pixels".to_vec(),
        })
        .await
        .expect_err("must fail to decode");

    assert!(matches!(err, UploadError::DecodeFailure { .. }));
    // The previous selection and state survive the abandoned one.
    assert_eq!(client.state().await, WorkflowState::ImageSelected);
    assert_eq!(
        client.selected_filename().await.as_deref(),
        Some("upload.png")
    );
    assert!(client.preview().await.is_some());
}

#[tokio::test]
async fn upload_without_selection_fails_fast_and_sends_nothing() {
    let (server_url, state) = spawn_analysis_service().await;
    let client = AnalysisClient::new(server_url);

    let err = client.trigger_upload(None).await.expect_err("no selection");

    assert!(matches!(err, UploadError::NoImageSelected));
    assert_eq!(client.state().await, WorkflowState::Idle);
    assert_eq!(state.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn successful_upload_delivers_palette_in_service_order() {
    let (server_url, state) = spawn_analysis_service().await;
    state.replies.lock().await.push_back(MockReply::Body(palette_body(json!([
        red_swatch(),
        {"rgb": [0, 0, 255], "hex": "#0000FF", "percentage": 30.0, "name": "blue", "is_dark": true},
    ]))));

    let client = AnalysisClient::new(server_url);
    client.select_image(png_selection()).await.expect("select");
    let colors = client.trigger_upload(Some(5)).await.expect("upload");

    assert_eq!(colors.len(), 2);
    assert_eq!(colors[0].hex, "#FF0000");
    assert_eq!(colors[0].percentage, 42.5);
    assert_eq!(colors[1].name, "blue");
    assert_eq!(client.state().await, WorkflowState::ResultsReady);
    assert_eq!(client.swatches().await, colors);
    assert_eq!(
        client.analyzed_filename().await.as_deref(),
        Some("upload.png")
    );

    let uploads = state.uploads.lock().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].field_name, UPLOAD_FIELD_NAME);
    assert_eq!(uploads[0].filename.as_deref(), Some("upload.png"));
    assert_eq!(uploads[0].content_type.as_deref(), Some("image/png"));
    assert!(uploads[0].byte_len > 0);
    assert_eq!(uploads[0].num_colors, Some(5));
}

#[tokio::test]
async fn non_success_status_fails_upload_and_keeps_previous_results() {
    let (server_url, state) = spawn_analysis_service().await;
    {
        let mut replies = state.replies.lock().await;
        replies.push_back(MockReply::Body(palette_body(json!([red_swatch()]))));
        replies.push_back(MockReply::Status(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"detail": "Error processing image: cannot identify image file"}),
        ));
    }

    let client = AnalysisClient::new(server_url);
    client.select_image(png_selection()).await.expect("select");
    client.trigger_upload(None).await.expect("first upload");

    let err = client
        .trigger_upload(None)
        .await
        .expect_err("second upload must fail");

    match err {
        UploadError::TransportFailure { status, reason } => {
            assert_eq!(status, Some(500));
            assert!(
                reason.contains("cannot identify image file"),
                "service detail missing from: {reason}"
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(client.state().await, WorkflowState::UploadFailed);
    let kept = client.swatches().await;
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].hex, "#FF0000");
    assert_eq!(state.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn connection_refused_is_a_transport_failure() {
    // Grab an ephemeral port, then close it so nothing is listening.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let client = AnalysisClient::new(format!("http://{addr}"));
    client.select_image(png_selection()).await.expect("select");

    let err = client.trigger_upload(None).await.expect_err("must fail");
    assert!(matches!(
        err,
        UploadError::TransportFailure { status: None, .. }
    ));
    assert_eq!(client.state().await, WorkflowState::UploadFailed);
    assert!(client.swatches().await.is_empty());
}

#[tokio::test]
async fn body_without_colors_is_malformed() {
    let (server_url, state) = spawn_analysis_service().await;
    state
        .replies
        .lock()
        .await
        .push_back(MockReply::Body(json!({"message": "no palette here"})));

    let client = AnalysisClient::new(server_url);
    client.select_image(png_selection()).await.expect("select");

    let err = client.trigger_upload(None).await.expect_err("must fail");
    assert!(matches!(err, UploadError::MalformedResponse { .. }));
    assert_eq!(client.state().await, WorkflowState::UploadFailed);
}

#[tokio::test]
async fn second_successful_upload_fully_replaces_first_palette() {
    let (server_url, state) = spawn_analysis_service().await;
    {
        let mut replies = state.replies.lock().await;
        replies.push_back(MockReply::Body(palette_body(json!([red_swatch()]))));
        replies.push_back(MockReply::Body(palette_body(json!([
            {"rgb": [0, 128, 0], "hex": "#008000", "percentage": 60.0, "name": "green"},
            {"rgb": [255, 255, 255], "hex": "#FFFFFF", "percentage": 40.0, "name": "white"},
        ]))));
    }

    let client = AnalysisClient::new(server_url);
    client.select_image(png_selection()).await.expect("select");
    client.trigger_upload(None).await.expect("first upload");
    client.trigger_upload(None).await.expect("second upload");

    let swatches = client.swatches().await;
    assert_eq!(swatches.len(), 2);
    assert_eq!(swatches[0].hex, "#008000");
    assert_eq!(swatches[1].hex, "#FFFFFF");
    assert!(swatches.iter().all(|swatch| swatch.hex != "#FF0000"));
}

#[tokio::test]
async fn reentrant_upload_is_rejected_without_a_second_request() {
    let (server_url, state) = spawn_analysis_service().await;
    let (unblock_tx, unblock_rx) = oneshot::channel();
    state.replies.lock().await.push_back(MockReply::Gated {
        unblock: unblock_rx,
        body: palette_body(json!([red_swatch()])),
    });

    let client = AnalysisClient::new(server_url);
    client.select_image(png_selection()).await.expect("select");

    let background = tokio::spawn({
        let client = client.clone();
        async move { client.trigger_upload(None).await }
    });

    let mut saw_uploading = false;
    for _ in 0..200 {
        if client.state().await == WorkflowState::Uploading {
            saw_uploading = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(saw_uploading, "upload never reached the in-flight state");

    let err = client
        .trigger_upload(None)
        .await
        .expect_err("re-entrant upload");
    assert!(matches!(err, UploadError::UploadInFlight));

    let err = client
        .select_image(png_selection())
        .await
        .expect_err("selection during upload");
    assert!(matches!(err, UploadError::UploadInFlight));

    unblock_tx.send(()).expect("unblock mock service");
    let colors = background.await.expect("join").expect("upload");
    assert_eq!(colors.len(), 1);
    assert_eq!(state.hits.load(Ordering::SeqCst), 1);
    assert_eq!(client.state().await, WorkflowState::ResultsReady);
}

#[tokio::test]
async fn out_of_range_palette_size_is_rejected_locally() {
    let (server_url, state) = spawn_analysis_service().await;
    let client = AnalysisClient::new(server_url);
    client.select_image(png_selection()).await.expect("select");

    for requested in [0u8, 21, 255] {
        let err = client
            .trigger_upload(Some(requested))
            .await
            .expect_err("out of range");
        assert!(matches!(
            err,
            UploadError::InvalidPaletteSize { requested: r } if r == requested
        ));
    }

    assert_eq!(client.state().await, WorkflowState::ImageSelected);
    assert_eq!(state.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn workflow_events_track_selection_and_results() {
    let (server_url, state) = spawn_analysis_service().await;
    state
        .replies
        .lock()
        .await
        .push_back(MockReply::Body(palette_body(json!([red_swatch()]))));

    let client = AnalysisClient::new(server_url);
    let mut events = client.subscribe_events();

    client.select_image(png_selection()).await.expect("select");
    match events.recv().await.expect("preview event") {
        WorkflowEvent::PreviewReady {
            filename,
            width,
            height,
        } => {
            assert_eq!(filename, "upload.png");
            assert!(width > 0 && height > 0);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    client.trigger_upload(None).await.expect("upload");
    match events.recv().await.expect("results event") {
        WorkflowEvent::ResultsReady { count } => assert_eq!(count, 1),
        other => panic!("unexpected event: {other:?}"),
    }
}

fn sample_swatch(hex: &str, percentage: f64, name: &str) -> ColorSwatch {
    ColorSwatch {
        rgb: shared::domain::Rgb::from_hex(hex).expect("hex").0,
        hex: hex.to_string(),
        percentage,
        name: name.to_string(),
        is_dark: None,
    }
}

#[test]
fn render_swatches_preserves_order_and_duplicates() {
    let colors = vec![
        sample_swatch("#FF0000", 42.5, "red"),
        sample_swatch("#FF0000", 10.0, "red"),
        sample_swatch("#0000FF", 5.0, "blue"),
    ];

    let rows = render_swatches(&colors);

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].hex, "#FF0000");
    assert_eq!(rows[1].hex, "#FF0000");
    assert_eq!(rows[2].hex, "#0000FF");
    assert_eq!(rows[0].percentage, 42.5);
    assert!(rows[2].is_dark);
}

#[test]
fn render_swatches_is_idempotent() {
    let colors = vec![
        sample_swatch("#102030", 7.0, ""),
        sample_swatch("#FFFFFF", 93.0, "white"),
    ];

    assert_eq!(render_swatches(&colors), render_swatches(&colors));
}

#[test]
fn swatch_display_labels() {
    let rows = render_swatches(&[
        sample_swatch("#FF0000", 42.5, "red"),
        sample_swatch("#102030", 7.0, ""),
    ]);

    assert_eq!(rows[0].percentage_label(), "42.50%");
    assert_eq!(rows[0].tooltip(), "red (#FF0000) - 42.50%");
    assert_eq!(rows[1].tooltip(), "#102030 - 7.00%");
}
