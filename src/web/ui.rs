use crate::{
    diagnosis::{severity_info, PredictionResult, SEVERITY_TABLE},
    image::ImageLoader,
    utils::error::RetinaError,
    web::{extractors::UploadedFile, AppState},
};
use axum::{
    extract::{multipart::MultipartRejection, Multipart, Query, State},
    http::StatusCode,
    response::Html,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

const DEMO_TEMPLATE: &str = include_str!("../../templates/demo.html");

const DISCLAIMER: &str = "This tool is for educational and screening purposes only. \
    Always consult with a qualified healthcare professional for medical diagnosis and treatment.";

/// Presentation variant of the demo results panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Theme {
    #[default]
    Classic,
    Beautiful,
}

impl Theme {
    /// Unknown names fall back to the classic layout
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "beautiful" => Theme::Beautiful,
            _ => Theme::Classic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Classic => "classic",
            Theme::Beautiful => "beautiful",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DemoQuery {
    #[serde(default)]
    pub theme: Option<String>,
}

#[derive(Serialize)]
struct PlotPoint<'a> {
    class: &'a str,
    probability: f64,
}

/// Interactive demo page
pub async fn demo_page_handler(Query(query): Query<DemoQuery>) -> Html<String> {
    let theme = query.theme.as_deref().map(Theme::parse).unwrap_or_default();

    let mut levels = String::new();
    for (index, record) in SEVERITY_TABLE.iter().enumerate() {
        let _ = write!(
            levels,
            "<li><strong>Level {}:</strong> {} ({} risk)</li>",
            index,
            escape_html(record.level),
            record.risk
        );
    }

    Html(
        DEMO_TEMPLATE
            .replace("{{THEME}}", theme.as_str())
            .replace("{{SEVERITY_LEVELS}}", &levels),
    )
}

/// Reactive analysis callback: in-memory image in, results markup out
pub async fn demo_analyze_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> (StatusCode, Html<String>) {
    let pipeline = match state.pipeline() {
        Ok(pipeline) => pipeline,
        Err(_) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "❌ Model not loaded. Please check the model file.",
            )
        }
    };

    let (upload, values) = match multipart {
        Ok(mut multipart) => {
            let max_size = state.config.server_config.max_request_size;
            match UploadedFile::from_multipart(&mut multipart, "image", &["theme"], max_size).await {
                Ok(parsed) => parsed,
                Err(e) => return error_response(e.status_code(), &format!("⚠️ {}", e)),
            }
        }
        Err(_) => (None, Vec::new()),
    };

    let theme = values
        .iter()
        .find(|(name, _)| name == "theme")
        .map(|(_, value)| Theme::parse(value))
        .unwrap_or_default();

    let upload = match upload {
        Some(upload) if !upload.data.is_empty() => upload,
        _ => return error_response(StatusCode::BAD_REQUEST, "⚠️ Please upload an image first."),
    };

    if !upload.file_name.is_empty() && !state.config.is_allowed_file(&upload.file_name) {
        return error_response(
            StatusCode::BAD_REQUEST,
            &format!("❌ {}", RetinaError::InvalidFileType),
        );
    }

    let bytes = upload.data.clone();
    let outcome = tokio::task::spawn_blocking(move || pipeline.predict_bytes(&bytes))
        .await
        .map_err(|e| RetinaError::Internal(format!("Inference task failed: {}", e)))
        .and_then(|result| result);

    match outcome {
        Ok(result) => {
            let mime = ImageLoader::detect_format(&upload.data)
                .map(|format| format.to_mime_type())
                .unwrap_or("image/jpeg");
            let image_src = format!(
                "data:{};base64,{}",
                mime,
                base64::engine::general_purpose::STANDARD.encode(&upload.data)
            );
            tracing::info!(
                "Demo prediction: severity={} ({}), confidence={:.2}%, theme={}",
                result.severity_value,
                result.severity_class,
                result.confidence,
                theme.as_str()
            );
            (StatusCode::OK, Html(render_result(&result, theme, Some(&image_src))))
        }
        Err(e) => {
            tracing::error!("Demo prediction failed: {}", e);
            let message = match &e {
                RetinaError::Prediction(inner) => inner.clone(),
                other => other.to_string(),
            };
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("❌ Error during prediction: {}", message),
            )
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> (StatusCode, Html<String>) {
    (status, Html(render_error(message)))
}

/// Error fragment shown in place of results
pub fn render_error(message: &str) -> String {
    format!(
        r#"<div class="result result-error" role="alert"><p>{}</p></div>"#,
        escape_html(message)
    )
}

/// Results fragment for `theme`
pub fn render_result(result: &PredictionResult, theme: Theme, image_src: Option<&str>) -> String {
    let mut html = match theme {
        Theme::Classic => render_classic(result),
        Theme::Beautiful => render_beautiful(result),
    };

    html.push_str(&render_plot_data(result));

    if let Some(src) = image_src {
        let _ = write!(
            html,
            r#"<figure class="analyzed-image"><img src="{}" alt="Analyzed image"><figcaption>Analyzed Image</figcaption></figure>"#,
            escape_html(src)
        );
    }

    html
}

fn render_classic(result: &PredictionResult) -> String {
    let info = &result.info;
    let mut html = String::from(r#"<section class="result result-classic">"#);

    let _ = write!(
        html,
        "<h2>🔬 Analysis Results</h2>\
         <p><strong>Diagnosis:</strong> {}<br>\
         <strong>Confidence:</strong> {:.2}%<br>\
         <strong>Risk Level:</strong> {}</p>\
         <h3>📋 Description</h3><p>{}</p>\
         <h3>💡 Recommendation</h3><p>{}</p>\
         <h3>⚠️ Disclaimer</h3><p>{}</p>",
        escape_html(info.level),
        result.confidence,
        info.risk,
        escape_html(info.description),
        escape_html(info.recommendation),
        DISCLAIMER
    );

    html.push_str(r#"<div class="bar-plot"><h4>Probability Distribution</h4>"#);
    html.push_str(&render_bars(result, 2));
    html.push_str("</div></section>");
    html
}

fn render_beautiful(result: &PredictionResult) -> String {
    let info = &result.info;
    let mut html = String::new();

    let _ = write!(
        html,
        r#"<section class="result result-beautiful">
<div style="background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); padding: 2rem; border-radius: 1rem; color: white; margin: 1rem 0;">
  <h2 style="margin: 0 0 1rem 0; font-size: 2rem;">🔬 Analysis Complete</h2>
  <div style="background: rgba(255,255,255,0.1); padding: 1.5rem; border-radius: 0.75rem; margin: 1rem 0;">
    <div style="display: flex; justify-content: space-between; align-items: center; margin-bottom: 1rem;">
      <div>
        <p style="margin: 0; opacity: 0.9; font-size: 0.9rem;">Diagnosis</p>
        <h3 style="margin: 0.25rem 0 0 0; font-size: 1.75rem; color: {color};">{level}</h3>
      </div>
      <div style="text-align: right;">
        <p style="margin: 0; opacity: 0.9; font-size: 0.9rem;">Confidence</p>
        <h3 style="margin: 0.25rem 0 0 0; font-size: 1.75rem;">{confidence:.1}%</h3>
      </div>
    </div>
    <div style="background: rgba(0,0,0,0.2); height: 8px; border-radius: 100px; overflow: hidden; margin: 1rem 0;">
      <div style="background: {color}; height: 100%; width: {confidence}%; border-radius: 100px;"></div>
    </div>
    <p style="margin: 0; opacity: 0.9;">Risk Level: <strong>{risk}</strong></p>
  </div>
  <div style="background: rgba(255,255,255,0.1); padding: 1.5rem; border-radius: 0.75rem; margin: 1rem 0;">
    <h4 style="margin: 0 0 0.5rem 0;">📋 Description</h4>
    <p style="margin: 0; line-height: 1.6;">{description}</p>
  </div>
  <div style="background: rgba(255,255,255,0.1); padding: 1.5rem; border-radius: 0.75rem; margin: 1rem 0;">
    <h4 style="margin: 0 0 0.5rem 0;">💡 Recommendation</h4>
    <p style="margin: 0; line-height: 1.6;">{recommendation}</p>
  </div>
  <div style="background: rgba(255,255,255,0.05); padding: 1rem; border-radius: 0.5rem; margin: 1rem 0; border-left: 3px solid #fbbf24;">
    <p style="margin: 0; font-size: 0.875rem; opacity: 0.9;">⚠️ <strong>Disclaimer:</strong> {disclaimer}</p>
  </div>
</div>
<div style="margin-top: 1.5rem;">
  <h4 style="margin-bottom: 1rem;">📊 Probability Distribution</h4>
  <div class="bar-plot" style="background: white; padding: 1.5rem; border-radius: 0.75rem;">"#,
        color = info.color,
        level = escape_html(info.level),
        confidence = result.confidence,
        risk = info.risk,
        description = escape_html(info.description),
        recommendation = escape_html(info.recommendation),
        disclaimer = DISCLAIMER,
    );

    html.push_str(&render_bars(result, 1));
    html.push_str("</div></div></section>");
    html
}

/// One labelled bar per class, colored by that class's severity
fn render_bars(result: &PredictionResult, decimals: usize) -> String {
    let mut html = String::new();
    for (index, (label, pct)) in result.probabilities.iter().enumerate() {
        let color = severity_info(index).color;
        let _ = write!(
            html,
            r#"<div class="bar" data-class="{label}" style="margin-bottom: 1rem;">
  <div style="display: flex; justify-content: space-between; margin-bottom: 0.25rem;">
    <span style="color: #374151; font-weight: 500;">{label}</span>
    <span style="color: #6b7280; font-weight: 600;">{pct:.decimals$}%</span>
  </div>
  <div style="background: #e5e7eb; height: 8px; border-radius: 100px; overflow: hidden;">
    <div style="background: {color}; height: 100%; width: {width}%; border-radius: 100px;"></div>
  </div>
</div>"#,
            label = escape_html(label),
            pct = pct,
            decimals = decimals,
            color = color,
            width = pct.clamp(0.0, 100.0),
        );
    }
    html
}

/// Chart-ready JSON for the probability plot
fn render_plot_data(result: &PredictionResult) -> String {
    let points: Vec<PlotPoint<'_>> = result
        .probabilities
        .iter()
        .map(|(label, pct)| PlotPoint {
            class: label,
            probability: *pct,
        })
        .collect();

    let json = serde_json::to_string(&points).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"<script type="application/json" class="plot-data">{}</script>"#,
        json.replace("</", "<\\/")
    )
}

/// Minimal HTML text escaping
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
