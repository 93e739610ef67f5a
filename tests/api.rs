use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use image::{ImageFormat, Rgb, RgbImage};
use ndarray::Array4;
use retina_dr::{
    config::{Config, ConfigArgs, DevicePreference},
    diagnosis::CLASSES,
    models::{Device, ModelManager, SeverityModel},
    web::{create_app, AppState},
    RetinaError,
};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "retina-test-boundary";

/// Returns fixed log-probabilities and counts forward passes.
struct StubModel {
    log_probs: Vec<f32>,
    calls: AtomicUsize,
}

impl StubModel {
    fn new(probs: [f32; 5]) -> Arc<Self> {
        Arc::new(Self {
            log_probs: probs.iter().map(|p| p.ln()).collect(),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SeverityModel for StubModel {
    fn forward(&self, input: Array4<f32>) -> retina_dr::Result<Vec<f32>> {
        assert_eq!(input.shape(), &[1, 3, 224, 224]);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.log_probs.clone())
    }
}

struct TestApp {
    router: Router,
    upload_dir: TempDir,
    _static_dir: TempDir,
}

impl TestApp {
    fn new(model: Option<Arc<StubModel>>) -> Self {
        let upload_dir = tempfile::tempdir().unwrap();
        let static_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            static_dir.path().join("index.html"),
            "<html><body>retina front-end</body></html>",
        )
        .unwrap();

        let config = Config::new(ConfigArgs {
            upload_dir: upload_dir.path().to_path_buf(),
            static_dir: static_dir.path().to_path_buf(),
            device: DevicePreference::Cpu,
            ..ConfigArgs::default()
        })
        .unwrap();

        let models = match model {
            Some(model) => ModelManager::with_model(model, Device::Cpu),
            None => ModelManager::unavailable(Device::Cpu, "Checkpoint not found"),
        };

        Self {
            router: create_app(AppState::new(config, models)),
            upload_dir,
            _static_dir: static_dir,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    async fn get_json(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, body) = self.send(request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn upload(&self, uri: &str, parts: &[Part<'_>]) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        self.send(request).await
    }

    fn scratch_files(&self) -> usize {
        std::fs::read_dir(self.upload_dir.path()).unwrap().count()
    }
}

enum Part<'a> {
    File {
        name: &'a str,
        file_name: &'a str,
        data: &'a [u8],
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File {
                name,
                file_name,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}",
                        name, value
                    )
                    .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn fundus_png() -> Vec<u8> {
    let img = RgbImage::from_fn(96, 96, |x, y| Rgb([(x * 2) as u8, (y * 2) as u8, 40]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn json(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}

fn moderate_model() -> Arc<StubModel> {
    StubModel::new([0.05, 0.1, 0.6, 0.15, 0.1])
}

#[tokio::test]
async fn health_reports_loaded_model_and_device() {
    let app = TestApp::new(Some(moderate_model()));
    let (status, body) = app.get_json("/api/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model_loaded"], true);
    assert_eq!(body["device"], "cpu");
}

#[tokio::test]
async fn health_reports_missing_model() {
    let app = TestApp::new(None);
    let (status, body) = app.get_json("/api/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_loaded"], false);
}

#[tokio::test]
async fn predict_without_model_is_server_error() {
    let app = TestApp::new(None);
    let png = fundus_png();
    let (status, body) = app
        .upload(
            "/api/predict",
            &[Part::File {
                name: "file",
                file_name: "eye.png",
                data: &png,
            }],
        )
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json(&body)["error"], RetinaError::ModelNotLoaded.to_string());
    assert_eq!(json(&body)["error"], "Model not loaded. Please check model path.");
    assert_eq!(app.scratch_files(), 0);
}

#[tokio::test]
async fn missing_file_field_is_rejected() {
    let model = moderate_model();
    let app = TestApp::new(Some(model.clone()));
    let (status, body) = app
        .upload(
            "/api/predict",
            &[Part::Text {
                name: "comment",
                value: "left eye",
            }],
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "No file provided");
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn non_multipart_body_counts_as_missing_file() {
    let app = TestApp::new(Some(moderate_model()));
    let request = Request::builder()
        .method("POST")
        .uri("/api/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "No file provided");
}

#[tokio::test]
async fn empty_filename_is_rejected() {
    let app = TestApp::new(Some(moderate_model()));
    let (status, body) = app
        .upload(
            "/api/predict",
            &[Part::File {
                name: "file",
                file_name: "",
                data: b"",
            }],
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "No file selected");
}

#[tokio::test]
async fn disallowed_extension_never_reaches_the_model() {
    let model = moderate_model();
    let app = TestApp::new(Some(model.clone()));
    let png = fundus_png();
    let (status, body) = app
        .upload(
            "/api/predict",
            &[Part::File {
                name: "file",
                file_name: "animation.gif",
                data: &png,
            }],
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json(&body)["error"],
        "Invalid file type. Please upload PNG, JPG, or JPEG."
    );
    assert_eq!(model.calls(), 0);
    assert_eq!(app.scratch_files(), 0);
}

#[tokio::test]
async fn oversized_upload_is_rejected_with_json_413() {
    let model = moderate_model();
    let app = TestApp::new(Some(model.clone()));
    let payload = vec![0u8; 17 * 1024 * 1024];
    let (status, body) = app
        .upload(
            "/api/predict",
            &[Part::File {
                name: "file",
                file_name: "huge.png",
                data: &payload,
            }],
        )
        .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(
        json(&body)["error"],
        format!("File too large. Maximum upload size is {} bytes.", 16 * 1024 * 1024)
    );
    assert_eq!(model.calls(), 0);
    assert_eq!(app.scratch_files(), 0);
}

#[tokio::test]
async fn successful_prediction_returns_full_payload() {
    let model = moderate_model();
    let app = TestApp::new(Some(model.clone()));
    let png = fundus_png();
    let (status, body) = app
        .upload(
            "/api/predict",
            &[Part::File {
                name: "file",
                file_name: "../fundus scan.PNG",
                data: &png,
            }],
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let value = json(&body);
    assert_eq!(value["severity_value"], 2);
    assert_eq!(value["severity_class"], "Moderate");
    assert_eq!(value["confidence"], 60.0);
    assert_eq!(value["info"]["level"], "Moderate");
    assert_eq!(value["info"]["risk"], "Medium");
    assert_eq!(value["info"]["color"], "#f59e0b");
    assert!(value["image_data"]
        .as_str()
        .unwrap()
        .starts_with("data:image/jpeg;base64,"));

    let probabilities = value["probabilities"].as_object().unwrap();
    assert_eq!(probabilities.len(), CLASSES.len());
    let max = probabilities
        .values()
        .map(|v| v.as_f64().unwrap())
        .fold(f64::MIN, f64::max);
    assert_eq!(value["confidence"].as_f64().unwrap(), max);

    // keys are emitted in class-index order
    let text = String::from_utf8(body).unwrap();
    let start = text.find("\"probabilities\":{").unwrap();
    let positions: Vec<usize> = CLASSES
        .iter()
        .map(|label| start + text[start..].find(&format!("\"{}\":", label)).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));

    assert_eq!(model.calls(), 1);
    assert_eq!(app.scratch_files(), 0);
}

#[tokio::test]
async fn repeated_predictions_are_identical() {
    let app = TestApp::new(Some(StubModel::new([0.1, 0.2, 0.1, 0.55, 0.05])));
    let png = fundus_png();
    let part = [Part::File {
        name: "file",
        file_name: "eye.jpg",
        data: &png,
    }];

    let (_, first) = app.upload("/api/predict", &part).await;
    let (_, second) = app.upload("/api/predict", &part).await;

    let (first, second) = (json(&first), json(&second));
    assert_eq!(first["severity_value"], 3);
    assert_eq!(first["severity_value"], second["severity_value"]);
    assert_eq!(first["confidence"], second["confidence"]);
}

#[tokio::test]
async fn undecodable_image_is_a_prediction_error() {
    let model = moderate_model();
    let app = TestApp::new(Some(model.clone()));
    let (status, body) = app
        .upload(
            "/api/predict",
            &[Part::File {
                name: "file",
                file_name: "broken.png",
                data: b"this is not a png",
            }],
        )
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json(&body)["error"]
        .as_str()
        .unwrap()
        .starts_with("Prediction error:"));
    assert_eq!(model.calls(), 0);
    assert_eq!(app.scratch_files(), 0);
}

#[tokio::test]
async fn classes_lists_every_severity_record() {
    let app = TestApp::new(None);
    let (status, body) = app.get_json("/api/classes").await;

    assert_eq!(status, StatusCode::OK);
    let classes = body["classes"].as_array().unwrap();
    let info = body["info"].as_array().unwrap();
    assert_eq!(classes.len(), 5);
    assert_eq!(info.len(), 5);
    for (label, record) in classes.iter().zip(info) {
        assert_eq!(label, &record["level"]);
    }
    assert_eq!(info[1]["risk"], "Low-Medium");
    assert_eq!(info[4]["risk"], "Critical");
}

#[tokio::test]
async fn info_describes_service_configuration() {
    let app = TestApp::new(None);
    let (status, body) = app.get_json("/api/info").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["max_upload_bytes"], 16 * 1024 * 1024);
    assert_eq!(body["preprocess"]["image_size"], 224);
    assert_eq!(body["model"]["model_loaded"], false);
    assert_eq!(body["allowed_extensions"][0], "png");
}

#[tokio::test]
async fn static_front_end_is_served() {
    let app = TestApp::new(None);

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("retina front-end"));

    let request = Request::builder()
        .uri("/missing.js")
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn demo_page_honours_theme() {
    let app = TestApp::new(None);
    let request = Request::builder()
        .uri("/demo?theme=beautiful")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("theme-beautiful"));
    assert!(html.contains("Proliferative DR"));
    assert!(!html.contains("{{"));
}

#[tokio::test]
async fn demo_analysis_renders_markup_without_touching_disk() {
    let model = moderate_model();
    let app = TestApp::new(Some(model.clone()));
    let png = fundus_png();
    let (status, body) = app
        .upload(
            "/demo/analyze",
            &[
                Part::Text {
                    name: "theme",
                    value: "beautiful",
                },
                Part::File {
                    name: "image",
                    file_name: "eye.png",
                    data: &png,
                },
            ],
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("Analysis Complete"));
    assert!(html.contains("Moderate"));
    assert!(html.contains("data:image/png;base64,"));
    assert_eq!(model.calls(), 1);
    assert_eq!(app.scratch_files(), 0);
}

#[tokio::test]
async fn demo_analysis_reports_missing_image_and_model() {
    let app = TestApp::new(Some(moderate_model()));
    let (status, body) = app
        .upload(
            "/demo/analyze",
            &[Part::Text {
                name: "theme",
                value: "classic",
            }],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8(body)
        .unwrap()
        .contains("Please upload an image first."));

    let app = TestApp::new(None);
    let png = fundus_png();
    let (status, body) = app
        .upload(
            "/demo/analyze",
            &[Part::File {
                name: "image",
                file_name: "eye.png",
                data: &png,
            }],
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(String::from_utf8(body).unwrap().contains("Model not loaded"));
}
