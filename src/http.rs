use crate::controller::{PollController, WidgetView};
use crate::metrics::Metrics;
use crate::render::escape_html;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;

#[derive(Clone)]
pub struct HttpAppState {
    pub metrics: Arc<Metrics>,
    pub controller: PollController,
}

pub fn build_router(metrics: Arc<Metrics>, controller: PollController) -> Router {
    Router::new()
        .route("/", get(page_handler))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/api/view", get(view_handler))
        .route("/api/refresh", post(refresh_handler))
        .route("/api/auto-refresh", post(toggle_handler))
        .with_state(HttpAppState {
            metrics,
            controller,
        })
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_scrape_count();
    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {err}"),
        )
            .into_response(),
    }
}

async fn view_handler(State(state): State<HttpAppState>) -> Json<WidgetView> {
    Json(state.controller.view().await)
}

async fn refresh_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    // The fetch is detached from the request so a client hanging up cannot
    // leave the widget stuck in Loading. The body is the view right after
    // Loading was entered.
    let _ = state.controller.start_refresh().await;
    (StatusCode::ACCEPTED, Json(state.controller.view().await))
}

async fn toggle_handler(State(state): State<HttpAppState>) -> Json<WidgetView> {
    state.controller.toggle_auto_refresh().await;
    Json(state.controller.view().await)
}

async fn page_handler(State(state): State<HttpAppState>) -> Html<String> {
    Html(render_page(&state.controller.view().await))
}

fn render_page(view: &WidgetView) -> String {
    let profile = view.variant.profile();
    let error = view
        .error
        .as_deref()
        .map(|e| format!("<div class=\"error-message\">{}</div>", escape_html(e)))
        .unwrap_or_default();
    let loading = if view.loading { "block" } else { "none" };
    let status = view
        .status_line
        .as_deref()
        .map(escape_html)
        .unwrap_or_default();
    let body = view.markup_html.as_deref().unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{noun} monitor</title></head>
<body>
<div class="toolbar">
<button id="refresh-btn" onclick="post('/api/refresh')">Refresh</button>
<button id="auto-refresh-btn" onclick="post('/api/auto-refresh')"><i id="auto-refresh-icon" class="{icon}"></i> <span id="auto-refresh-text">{label}</span></button>
</div>
<div id="error-container">{error}</div>
<div id="loading" style="display: {loading}">Loading...</div>
<div id="last-updated">{status}</div>
<div id="{prefix}-container">{body}</div>
<script>
function post(path) {{ fetch(path, {{ method: 'POST' }}).then(function() {{ location.reload(); }}); }}
</script>
</body>
</html>
"#,
        noun = escape_html(profile.plural_noun),
        icon = view.toggle_icon,
        label = view.toggle_label,
        prefix = profile.css_prefix,
    )
}
