//! Purpose: Provide the HTTP/JSON server consumed by the browser viewer.
//! Exports: `ServeConfig`, `serve`, `validate_config`.
//! Role: Axum transport that marshals JSON requests onto `ViewerSession` operations.
//! Invariants: Every JSON response carries `success`; failures use the error envelope.
//! Invariants: Loopback-only unless explicitly allowed; the server reads arbitrary paths.
//! Notes: Dataset loads and episode encoding run on the blocking pool.

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trajview::api::{Error, ErrorKind, ViewerSession};

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub static_dir: Option<PathBuf>,
    pub cors_allowed_origins: Vec<String>,
    pub allow_non_loopback: bool,
    pub max_body_bytes: u64,
}

struct AppState {
    session: Arc<ViewerSession>,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    init_tracing();

    let max_body_bytes: usize = config
        .max_body_bytes
        .try_into()
        .map_err(|_| Error::new(ErrorKind::Usage).with_message("--max-body-bytes is too large"))?;
    let cors = cors_layer(&config.cors_allowed_origins)?;

    let state = Arc::new(AppState {
        session: Arc::new(ViewerSession::new()),
    });

    let mut app = Router::new()
        .route("/healthz", get(healthz))
        .route("/load_zarr", post(load_zarr))
        .route("/show_episode", post(show_episode))
        .route("/load_mesh", post(load_mesh))
        .route("/save_gizmo_pose", post(save_gizmo_pose));
    app = match &config.static_dir {
        Some(dir) => app
            .route_service("/", ServeFile::new(dir.join("index.html")))
            .route_service("/mesh", ServeFile::new(dir.join("mesh.html")))
            .nest_service("/static", ServeDir::new(dir.join("static"))),
        None => app
            .route("/", get(viewer_unavailable))
            .route("/mesh", get(viewer_unavailable)),
    };
    let mut app = app
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state);
    if let Some(cors) = cors {
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    info!(bind = %config.bind, "trajview listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

pub fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if !is_loopback(config.bind.ip()) && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }

    if config.max_body_bytes == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes must be greater than zero")
            .with_hint("Use a positive value like 1048576."));
    }

    if let Some(dir) = &config.static_dir {
        if !dir.is_dir() {
            return Err(Error::new(ErrorKind::PathNotFound)
                .with_message("--static-dir is not a directory")
                .with_path(dir)
                .with_hint("Point --static-dir at the folder holding index.html and mesh.html."));
        }
    }

    cors_layer(&config.cors_allowed_origins)?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> Result<Option<CorsLayer>, Error> {
    if origins.is_empty() {
        return Ok(None);
    }
    let values = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|_| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("invalid --cors-origin value: {origin}"))
                    .with_hint("Use an origin like http://localhost:5173.")
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(values))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE]),
    ))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

#[derive(Debug, Deserialize)]
struct LoadDatasetRequest {
    #[serde(default)]
    path: String,
}

#[derive(Debug, Deserialize)]
struct ShowEpisodeRequest {
    episode_id: i64,
}

#[derive(Debug, Deserialize)]
struct LoadMeshRequest {
    #[serde(default)]
    file_path: String,
}

#[derive(Debug, Deserialize)]
struct SavePoseRequest {
    #[serde(default)]
    pose: Vec<Value>,
    frame: Option<i64>,
    scale: Option<f64>,
}

#[derive(Debug, Serialize)]
struct EpisodeBody<'a> {
    success: bool,
    episode_id: usize,
    frames: usize,
    points_per_frame: usize,
    features: usize,
    episode_data: Vec<&'a [f32]>,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    success: bool,
    error: String,
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

async fn healthz() -> Response {
    json_response(json!({ "ok": true }))
}

async fn viewer_unavailable() -> Response {
    envelope_response(
        StatusCode::NOT_FOUND,
        Error::new(ErrorKind::PathNotFound)
            .with_message("viewer pages are not configured")
            .with_hint("Restart with --static-dir pointing at the viewer assets."),
    )
}

async fn load_zarr(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoadDatasetRequest>, JsonRejection>,
) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => return rejection_response(rejection),
    };
    if payload.path.is_empty() {
        return error_response(Error::new(ErrorKind::Usage).with_message("path is required"));
    }
    let session = state.session.clone();
    match run_blocking(move || session.load_dataset(&payload.path)).await {
        Ok(summary) => json_response(json!({
            "success": true,
            "episode_count": summary.episode_count(),
            "frames_per_episode": summary.frames_per_episode,
            "points_per_frame": summary.points_per_frame,
            "features": summary.features,
            "format": summary.format.as_str(),
            "message": format!(
                "Successfully loaded {} episodes ({} frames; {} points per frame)",
                summary.episode_count(),
                summary.total_frames(),
                summary.points_per_frame
            ),
        })),
        Err(err) => error_response(err),
    }
}

async fn show_episode(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ShowEpisodeRequest>, JsonRejection>,
) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => return rejection_response(rejection),
    };
    let session = state.session.clone();
    let encoded = run_blocking(move || {
        let cached = session.show_episode(payload.episode_id)?;
        let episode = cached.episode();
        let body = EpisodeBody {
            success: true,
            episode_id: cached.index(),
            frames: episode.frame_count(),
            points_per_frame: episode.points_per_frame(),
            features: episode.features(),
            episode_data: cached.rows(),
        };
        serde_json::to_vec(&body).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode episode")
                .with_source(err)
        })
    })
    .await;
    match encoded {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(Bytes::from(bytes)));
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            response
        }
        Err(err) => error_response(err),
    }
}

async fn load_mesh(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoadMeshRequest>, JsonRejection>,
) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => return rejection_response(rejection),
    };
    if payload.file_path.is_empty() {
        return error_response(Error::new(ErrorKind::Usage).with_message("file_path is required"));
    }
    let session = state.session.clone();
    match run_blocking(move || session.load_mesh(&payload.file_path)).await {
        Ok(asset) => {
            let mut response = Response::new(Body::from(Bytes::from(asset.bytes)));
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(asset.content_type),
            );
            response
        }
        Err(err) => error_response(err),
    }
}

async fn save_gizmo_pose(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SavePoseRequest>, JsonRejection>,
) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => return rejection_response(rejection),
    };
    let components = match pose_components(&payload.pose) {
        Ok(components) => components,
        Err(err) => return error_response(err),
    };
    let frame = payload.frame.unwrap_or(trajview::core::pose::MESH_FRAME);
    let session = state.session.clone();
    match run_blocking(move || session.save_pose(&components, frame, payload.scale)).await {
        Ok(saved) => json_response(json!({
            "success": true,
            "message": format!("Pose saved to {}", saved.sidecar.display()),
            "path": saved.sidecar.display().to_string(),
            "frame": saved.context.index(),
            "scale": saved.scale,
        })),
        Err(err) => error_response(err),
    }
}

fn pose_components(values: &[Value]) -> Result<Vec<f64>, Error> {
    values
        .iter()
        .map(|value| {
            value.as_f64().ok_or_else(|| {
                Error::new(ErrorKind::InvalidPose)
                    .with_message(format!("pose components must be numbers, got {value}"))
            })
        })
        .collect()
}

async fn run_blocking<T, F>(work: F) -> Result<T, Error>
where
    F: FnOnce() -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|err| {
        Error::new(ErrorKind::Internal).with_message(format!("request worker failed: {err}"))
    })?
}

fn rejection_response(rejection: JsonRejection) -> Response {
    envelope_response(
        StatusCode::BAD_REQUEST,
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid request body: {}", rejection.body_text())),
    )
}

fn json_response(payload: Value) -> Response {
    Json(payload).into_response()
}

/// Operation failures answer 200 so the viewer can read `error` from the body;
/// only transport-level rejections use a non-2xx status.
fn error_response(err: Error) -> Response {
    envelope_response(StatusCode::OK, err)
}

fn envelope_response(status: StatusCode, err: Error) -> Response {
    if matches!(err.kind(), ErrorKind::Io | ErrorKind::Internal) {
        warn!(error = %err, "request failed");
    }
    let body = ErrorEnvelope {
        success: false,
        error: err.message().unwrap_or("error").to_string(),
        kind: format!("{:?}", err.kind()),
        hint: err.hint().map(str::to_string),
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::{
        Error, ErrorKind, ServeConfig, error_response, pose_components, serve, validate_config,
    };
    use axum::http::StatusCode;
    use serde_json::json;

    fn config(bind: &str) -> ServeConfig {
        ServeConfig {
            bind: bind.parse().expect("bind"),
            static_dir: None,
            cors_allowed_origins: Vec::new(),
            allow_non_loopback: false,
            max_body_bytes: 1024 * 1024,
        }
    }

    #[tokio::test]
    async fn serve_rejects_non_loopback_bind() {
        let err = serve(config("0.0.0.0:0")).await.expect_err("expected usage error");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn non_loopback_with_opt_in_is_allowed() {
        let mut config = config("0.0.0.0:0");
        config.allow_non_loopback = true;
        validate_config(&config).expect("config ok");
    }

    #[test]
    fn body_limit_must_be_positive() {
        let mut config = config("127.0.0.1:0");
        config.max_body_bytes = 0;
        let err = validate_config(&config).expect_err("expected usage error");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn static_dir_must_exist() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut config = config("127.0.0.1:0");
        config.static_dir = Some(temp.path().join("missing"));
        let err = validate_config(&config).expect_err("missing dir");
        assert_eq!(err.kind(), ErrorKind::PathNotFound);

        config.static_dir = Some(temp.path().to_path_buf());
        validate_config(&config).expect("config ok");
    }

    #[test]
    fn cors_origins_must_be_header_values() {
        let mut config = config("127.0.0.1:0");
        config.cors_allowed_origins = vec!["http://localhost:5173".to_string()];
        validate_config(&config).expect("config ok");
        config.cors_allowed_origins = vec!["bad\norigin".to_string()];
        let err = validate_config(&config).expect_err("bad origin");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn pose_components_must_be_numbers() {
        let ok = pose_components(&[json!(1), json!(0.5)]).expect("numbers");
        assert_eq!(ok, vec![1.0, 0.5]);
        let err = pose_components(&[json!(1), json!("x")]).expect_err("string");
        assert_eq!(err.kind(), ErrorKind::InvalidPose);
    }

    #[tokio::test]
    async fn operation_failures_answer_ok_with_envelope() {
        let response = error_response(
            Error::new(ErrorKind::PathNotFound).with_message("path is invalid: /x.zarr"),
        );
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(
            value,
            json!({"success": false, "error": "path is invalid: /x.zarr", "kind": "PathNotFound"})
        );
    }
}
