//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Chat page |
//! | `GET`  | `/health` | Liveness check |
//! | `POST` | `/chat` | `{message, session_id?}` → `{response}` |
//! | `POST` | `/query` | Same as `/chat`, answers in `{original_message}` |
//! | `GET`  | `/stats` | Store summary line |
//! | `POST` | `/clear-history` | Forget the session's conversation turns |
//! | `GET`  | `/force-load` | Reload the default document |
//! | `GET`  | `/debug` | Working-directory listing and store stats |
//!
//! # Error Contract
//!
//! Chat endpoints always answer `200` with a JSON body the chat page can
//! render; a malformed or oversized request becomes an error *message*, not
//! a status code. `/force-load` is the exception: a failed load is a `500`.
//!
//! Request bodies are read up to `server.max_body_bytes`; anything longer is
//! answered with [`BODY_TOO_LARGE_REPLY`].
//!
//! The session id comes from the `X-Session-Id` header, then the
//! `session_id` body field, then `"default"`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the chat page can be
//! served from elsewhere.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use sportello_core::models::DocumentKind;

use crate::chat::ChatService;
use crate::config::Config;
use crate::loader;
use crate::session::{self, resolve_session_id, SESSION_HEADER};

const BUILTIN_INDEX: &str = include_str!("../static/index.html");

pub const HEALTH_MESSAGE: &str = "Sportello assistenza funzionante!";
pub const HISTORY_CLEARED: &str = "🧹 Cronologia della chat cancellata!";
pub const BODY_TOO_LARGE_REPLY: &str = "❌ Errore interno: richiesta troppo grande";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub chat: Arc<ChatService>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/chat", post(handle_chat))
        .route("/query", post(handle_query))
        .route("/stats", get(handle_stats))
        .route("/clear-history", post(handle_clear_history))
        .route("/force-load", get(handle_force_load))
        .route("/debug", get(handle_debug))
        .layer(cors)
        .with_state(state)
}

/// Open the store, autoload the default document into an empty store, and
/// serve until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let chat = Arc::new(ChatService::open(config).await?);

    if config.documents.autoload {
        match loader::autoload_if_empty(chat.store().as_ref(), config).await {
            Ok(Some(report)) => info!(
                source_id = %report.source_id,
                chunks = report.stored,
                "default document loaded at start-up"
            ),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "start-up document load failed"),
        }
    }

    session::spawn_sweeper(
        chat.sessions().clone(),
        Duration::from_secs(config.server.session_ttl_secs),
    );

    let app = build_router(AppState {
        config: Arc::new(config.clone()),
        chat,
    });

    let bind_addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "sportello listening");
    println!("Sportello listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}

// ============ Request parsing ============

#[derive(Debug, Default, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

/// An empty body is an empty request.
fn parse_request(body: &[u8]) -> Result<ChatRequest, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ChatRequest::default());
    }
    serde_json::from_slice(body)
}

/// Buffer the request body, giving up past `server.max_body_bytes`.
async fn read_body(state: &AppState, body: Body) -> Option<Vec<u8>> {
    let limit = state.config.server.max_body_bytes;
    match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => Some(bytes.to_vec()),
        Err(e) => {
            warn!(limit, error = %e, "request body rejected");
            None
        }
    }
}

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}

fn invalid_request_reply(err: &serde_json::Error) -> String {
    format!("❌ Errore interno: richiesta non valida ({})", err)
}

async fn reply_to(state: &AppState, headers: &HeaderMap, body: Body) -> String {
    let Some(body) = read_body(state, body).await else {
        return BODY_TOO_LARGE_REPLY.to_string();
    };
    match parse_request(&body) {
        Ok(req) => {
            let session = resolve_session_id(session_header(headers), req.session_id.as_deref());
            state.chat.handle(&session, &req.message).await
        }
        Err(e) => {
            warn!(error = %e, "malformed chat request");
            invalid_request_reply(&e)
        }
    }
}

// ============ GET / ============

async fn handle_index(State(state): State<AppState>) -> Html<String> {
    if let Some(dir) = &state.config.server.static_dir {
        match tokio::fs::read_to_string(dir.join("index.html")).await {
            Ok(page) => return Html(page),
            Err(e) => warn!(dir = %dir.display(), error = %e, "custom chat page unavailable, using built-in"),
        }
    }
    Html(BUILTIN_INDEX.to_string())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        message: HEALTH_MESSAGE,
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ POST /chat, POST /query ============

#[derive(Serialize)]
struct ChatResponse {
    response: String,
}

async fn handle_chat(State(state): State<AppState>, headers: HeaderMap, body: Body) -> Json<ChatResponse> {
    Json(ChatResponse {
        response: reply_to(&state, &headers, body).await,
    })
}

#[derive(Serialize)]
struct QueryResponse {
    original_message: String,
}

async fn handle_query(State(state): State<AppState>, headers: HeaderMap, body: Body) -> Json<QueryResponse> {
    Json(QueryResponse {
        original_message: reply_to(&state, &headers, body).await,
    })
}

// ============ GET /stats ============

#[derive(Serialize)]
struct StatsResponse {
    stats: String,
}

async fn handle_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = match state.chat.store().stats().await {
        Ok(s) => s.summary(),
        Err(e) => format!("❌ Errore: {}", e),
    };
    Json(StatsResponse { stats })
}

// ============ POST /clear-history ============

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn handle_clear_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Json<MessageResponse> {
    let body_session = read_body(&state, body)
        .await
        .and_then(|b| parse_request(&b).ok())
        .and_then(|r| r.session_id);
    let session = resolve_session_id(session_header(&headers), body_session.as_deref());
    state.chat.sessions().clear_history(&session);
    Json(MessageResponse {
        message: HISTORY_CLEARED.to_string(),
    })
}

// ============ GET /force-load ============

#[derive(Serialize)]
#[serde(untagged)]
enum ForceLoadResponse {
    Loaded {
        status: &'static str,
        message: String,
        chunks: usize,
        tipo: &'static str,
    },
    Missing {
        status: &'static str,
        message: String,
        available_files: Vec<String>,
        current_dir: String,
    },
    Failed {
        status: &'static str,
        message: String,
    },
}

async fn handle_force_load(State(state): State<AppState>) -> Response {
    let docs = &state.config.documents;
    let name = docs
        .default_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| docs.default_path.display().to_string());

    if !docs.default_path.exists() {
        return Json(ForceLoadResponse::Missing {
            status: "error",
            message: format!("'{}' non trovato nella directory.", name),
            available_files: list_files(&docs.scan_dir),
            current_dir: current_dir(),
        })
        .into_response();
    }

    match loader::load_path(
        state.chat.store().as_ref(),
        &docs.default_path,
        None,
        &state.config.chunking,
    )
    .await
    {
        Ok(report) => Json(ForceLoadResponse::Loaded {
            status: "success",
            message: format!("{} caricato con successo!", name),
            chunks: report.stored,
            tipo: report.kind.label(),
        })
        .into_response(),
        Err(e) => {
            warn!(path = %docs.default_path.display(), error = %e, "force-load failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ForceLoadResponse::Failed {
                    status: "error",
                    message: format!("Errore durante il caricamento: {:#}", e),
                }),
            )
                .into_response()
        }
    }
}

// ============ GET /debug ============

#[derive(Serialize)]
struct DebugResponse {
    #[serde(rename = "tutti_file")]
    all_files: Vec<String>,
    #[serde(rename = "txt_trovati")]
    text_files: Vec<String>,
    #[serde(rename = "csv_trovati")]
    csv_files: Vec<String>,
    #[serde(rename = "pdf_trovati")]
    pdf_files: Vec<String>,
    #[serde(rename = "statistiche_db")]
    store_stats: String,
    #[serde(rename = "directory_corrente")]
    current_dir: String,
    #[serde(rename = "documento_txt_esiste")]
    default_document_exists: bool,
}

async fn handle_debug(State(state): State<AppState>) -> Json<DebugResponse> {
    let docs = &state.config.documents;
    let all_files = list_files(&docs.scan_dir);
    let of_kind = |kind: DocumentKind| -> Vec<String> {
        all_files
            .iter()
            .filter(|f| DocumentKind::from_path(f) == Some(kind))
            .cloned()
            .collect()
    };
    let store_stats = match state.chat.store().stats().await {
        Ok(s) => s.summary(),
        Err(e) => format!("❌ Errore: {}", e),
    };

    Json(DebugResponse {
        text_files: of_kind(DocumentKind::Text),
        csv_files: of_kind(DocumentKind::Csv),
        pdf_files: of_kind(DocumentKind::Pdf),
        all_files,
        store_stats,
        current_dir: current_dir(),
        default_document_exists: docs.default_path.exists(),
    })
}

/// Regular file names in `dir`, sorted. Unreadable directories list as empty.
fn list_files(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}

fn current_dir() -> String {
    std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use sportello_core::llm::ScriptedModel;
    use sportello_core::store::memory::InMemoryStore;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app_in(dir: &TempDir, extra: &str) -> Router {
        let toml = format!(
            "[db]\npath = \"{db}\"\n[documents]\ndefault_path = \"{doc}\"\nscan_dir = \"{scan}\"\n{extra}",
            db = dir.path().join("t.sqlite").display(),
            doc = dir.path().join("documento.txt").display(),
            scan = dir.path().display(),
        );
        let config = parse_config(&toml).unwrap();
        let chat = ChatService::new(
            Arc::new(InMemoryStore::default()),
            Arc::new(ScriptedModel::new(vec![])),
            &config,
        );
        build_router(AppState {
            config: Arc::new(config),
            chat: Arc::new(chat),
        })
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let (status, json) = send(&app_in(&dir, ""), get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "OK");
        assert_eq!(json["message"], HEALTH_MESSAGE);
    }

    #[tokio::test]
    async fn test_chat_and_query_shapes() {
        let dir = TempDir::new().unwrap();
        let app = app_in(&dir, "");
        let (_, json) = send(&app, post_json("/chat", r#"{"message": ""}"#)).await;
        assert_eq!(json["response"], "Per favore, scrivi una domanda.");

        let (_, json) = send(&app, post_json("/query", r#"{"message": "ciao"}"#)).await;
        assert!(json["original_message"].as_str().unwrap().starts_with("Ciao"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_structured() {
        let dir = TempDir::new().unwrap();
        let (status, json) = send(&app_in(&dir, ""), post_json("/chat", "{not json")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["response"].as_str().unwrap().starts_with("❌ Errore interno"));
    }

    #[tokio::test]
    async fn test_session_header_scopes_ticket_flow() {
        let dir = TempDir::new().unwrap();
        let app = app_in(&dir, "");
        let with_session = |id: &str, msg: &str| {
            Request::builder()
                .method("POST")
                .uri("/chat")
                .header("x-session-id", id)
                .body(Body::from(format!(r#"{{"message": "{}"}}"#, msg)))
                .unwrap()
        };

        let (_, json) = send(&app, with_session("a", "apertura ticket")).await;
        assert!(json["response"].as_str().unwrap().contains("Come ti chiami"));
        let (_, json) = send(&app, with_session("a", "Mario Rossi")).await;
        assert!(json["response"].as_str().unwrap().contains("reparto"));
        let (_, json) = send(&app, with_session("b", "Mario Rossi")).await;
        assert_eq!(json["response"], sportello_core::prompt::NOTHING_FOUND);
    }

    #[tokio::test]
    async fn test_oversized_body_gets_structured_reply() {
        let dir = TempDir::new().unwrap();
        let app = app_in(&dir, "[server]\nmax_body_bytes = 64\n");
        let big = format!(r#"{{"message": "{}"}}"#, "x".repeat(500));

        let (status, json) = send(&app, post_json("/chat", &big)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["response"], BODY_TOO_LARGE_REPLY);

        let (status, json) = send(&app, post_json("/query", &big)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["original_message"], BODY_TOO_LARGE_REPLY);

        // a body within the limit is still answered normally
        let (_, json) = send(&app, post_json("/chat", r#"{"message": "ciao"}"#)).await;
        assert!(json["response"].as_str().unwrap().starts_with("Ciao"));
    }

    #[tokio::test]
    async fn test_force_load_stats_and_debug() {
        let dir = TempDir::new().unwrap();
        let app = app_in(&dir, "");

        let (status, json) = send(&app, get_req("/force-load")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "'documento.txt' non trovato nella directory.");
        assert!(json["available_files"].is_array());

        std::fs::write(
            dir.path().join("documento.txt"),
            "13 CUP 2.0\nIl CUP 2.0 è attivo 24/7. Telefono: 055-123456.",
        )
        .unwrap();
        std::fs::write(dir.path().join("elenco.csv"), "a,b\n").unwrap();

        let (_, json) = send(&app, get_req("/force-load")).await;
        assert_eq!(json["status"], "success");
        assert_eq!(json["message"], "documento.txt caricato con successo!");
        assert_eq!(json["chunks"], 1);
        assert_eq!(json["tipo"], "TXT");

        let (_, json) = send(&app, get_req("/stats")).await;
        assert_eq!(json["stats"], "📊 Database: 1 chunks da 1 file(s): documento.txt");

        let (_, json) = send(&app, get_req("/debug")).await;
        assert_eq!(json["txt_trovati"], serde_json::json!(["documento.txt"]));
        assert_eq!(json["csv_trovati"], serde_json::json!(["elenco.csv"]));
        assert_eq!(json["documento_txt_esiste"], true);
    }

    #[tokio::test]
    async fn test_clear_history() {
        let dir = TempDir::new().unwrap();
        let (_, json) = send(&app_in(&dir, ""), post_json("/clear-history", "")).await;
        assert_eq!(json["message"], HISTORY_CLEARED);
    }

    #[tokio::test]
    async fn test_index_page() {
        let dir = TempDir::new().unwrap();
        let resp = app_in(&dir, "").oneshot(get_req("/")).await.unwrap();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("/chat"));

        std::fs::write(dir.path().join("index.html"), "<p>pagina locale</p>").unwrap();
        let extra = format!("[server]\nstatic_dir = \"{}\"\n", dir.path().display());
        let resp = app_in(&dir, &extra).oneshot(get_req("/")).await.unwrap();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"<p>pagina locale</p>");
    }
}
