//! HTTP surface for the DataDeck data explorer.
//!
//! All handlers are thin: they translate the wire contract to calls into
//! `datadeck_core` and map [`DeckError`] values onto status codes with a
//! structured JSON error body.

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::path::Path as FsPath;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use datadeck_api::{
    ApiInfo, ChatRequest, ChatResponse, ColumnInfo, ErrorBody, HealthResponse,
    PublicDataRequest, PublicDataResponse, QueryRequest, QueryResponse, SummaryRequest,
    SummaryResponse, TableInfo, TablesResponse, UploadResponse,
};
use datadeck_core::chat::ChatEngine;
use datadeck_core::config::AppConfig;
use datadeck_core::error::DeckError;
use datadeck_core::llm::{backend_from_config, LlmBackend};
use datadeck_core::parsers::{self, ParserConfig};
use datadeck_core::plots::PlotStore;
use datadeck_core::query::QueryGateway;
use datadeck_core::registry::TableRegistry;
use datadeck_core::sources::{PublicDataClient, PublicSource};
use datadeck_core::summary::{SummaryEngine, SummaryMode};

#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    registry: Arc<TableRegistry>,
    gateway: Arc<QueryGateway>,
    plots: Arc<PlotStore>,
    sources: Option<Arc<PublicDataClient>>,
    summary: Arc<SummaryEngine>,
    chat: Arc<ChatEngine>,
}

impl AppState {
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let registry = Arc::new(TableRegistry::new(&config.db_path)?);
        let gateway = Arc::new(QueryGateway::new(&config.db_path));
        let plots = Arc::new(PlotStore::new(config.plots_dir())?);

        let llm: Option<Arc<dyn LlmBackend>> = match &config.llm {
            Some(llm_config) => {
                let backend = backend_from_config(llm_config)?;
                info!(provider = backend.name(), model = %llm_config.model, "LLM backend configured");
                Some(backend)
            }
            None => {
                info!("no LLM backend configured, deterministic paths only");
                None
            }
        };

        let sources = if config.public_sources_enabled {
            Some(Arc::new(PublicDataClient::new(
                config.covid_base_url.clone(),
                config.upstream_timeout_secs,
            )?))
        } else {
            None
        };

        let summary = Arc::new(SummaryEngine::new(
            registry.clone(),
            gateway.clone(),
            llm.clone(),
        ));
        let chat = Arc::new(ChatEngine::new(
            registry.clone(),
            gateway.clone(),
            plots.clone(),
            llm,
        ));

        Ok(Self {
            config: Arc::new(config),
            registry,
            gateway,
            plots,
            sources,
            summary,
            chat,
        })
    }
}

/// Error wrapper giving every handler the same JSON failure shape.
struct ApiError(DeckError);

impl From<DeckError> for ApiError {
    fn from(e: DeckError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DeckError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            DeckError::Parse(_)
            | DeckError::Query(_)
            | DeckError::InvalidParams(_)
            | DeckError::Csv(_) => StatusCode::BAD_REQUEST,
            DeckError::TableNotFound(_) => StatusCode::NOT_FOUND,
            DeckError::UpstreamUnavailable(_) | DeckError::UpstreamSchemaChanged(_) => {
                StatusCode::BAD_GATEWAY
            }
            DeckError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            DeckError::Persistence(_) | DeckError::Io(_) | DeckError::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        } else {
            warn!(error = %self.0, "request rejected");
        }
        let body = ErrorBody {
            success: false,
            error: self.0.to_string(),
            kind: self.0.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn column_info(meta: &datadeck_core::registry::TableMeta) -> Vec<ColumnInfo> {
    meta.columns
        .iter()
        .map(|c| ColumnInfo {
            name: c.name.clone(),
            data_type: c.data_type.clone(),
        })
        .collect()
}

async fn root() -> Json<ApiInfo> {
    Json(ApiInfo {
        name: "DataDeck".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: vec![
            "/health".to_string(),
            "/upload".to_string(),
            "/query".to_string(),
            "/summarize".to_string(),
            "/tables".to_string(),
            "/public-data".to_string(),
            "/chat".to_string(),
        ],
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Body-limit rejections inside the multipart stream surface as a 413
/// multipart error; everything else is a malformed body.
fn multipart_error(e: MultipartError, body_size: usize, limit: usize) -> DeckError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        DeckError::FileTooLarge {
            size: body_size,
            limit,
        }
    } else {
        DeckError::InvalidParams(format!("malformed multipart body: {e}"))
    }
}

async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let body_size: usize = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let limit = state.config.max_upload_bytes;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, body_size, limit))?
    {
        let Some(file_name) = field.file_name().map(|s| s.to_string()) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, body_size, limit))?;
        if data.is_empty() {
            return Err(DeckError::Parse("uploaded file is empty".to_string()).into());
        }

        let path = FsPath::new(&file_name);
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| DeckError::Parse(format!("'{file_name}' has no file extension")))?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("uploaded_table");

        info!(file = %file_name, bytes = data.len(), "processing upload");
        let parser_config = ParserConfig {
            max_file_bytes: state.config.max_upload_bytes,
            pdf_text_fallback: state.config.pdf_text_fallback,
        };
        let batch = parsers::parse(&data, extension, &parser_config)?;
        let meta = state.registry.register(stem, &file_name, &batch)?;

        let plot_data = state
            .plots
            .generate(&meta.name, &batch)
            .unwrap_or_else(|e| {
                warn!(error = %e, "plot generation failed for upload");
                Vec::new()
            });

        return Ok(Json(UploadResponse {
            success: true,
            table_name: meta.name.clone(),
            row_count: meta.row_count,
            column_count: meta.column_count,
            columns: column_info(&meta),
            message: format!(
                "Loaded {} rows into table '{}'",
                meta.row_count, meta.name
            ),
            plot_data,
        }));
    }
    Err(DeckError::InvalidParams("no file field in upload".to_string()).into())
}

async fn query(
    State(state): State<AppState>,
    Json(body): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let result = state.gateway.execute(&body.query)?;
    Ok(Json(result.into()))
}

async fn summarize(
    State(state): State<AppState>,
    Json(body): Json<SummaryRequest>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let mode: SummaryMode = body.summary_type.as_deref().unwrap_or("overview").parse()?;
    let outcome = state
        .summary
        .summarize(&body.table_name, mode, body.sample_size)
        .await?;
    Ok(Json(SummaryResponse {
        success: true,
        table_name: outcome.table,
        summary: outcome.summary,
        summary_type: outcome.mode,
        provider: outcome.provider,
        sampled_rows: outcome.sampled_rows,
    }))
}

async fn list_tables(State(state): State<AppState>) -> Result<Json<TablesResponse>, ApiError> {
    let tables: Vec<TableInfo> = state
        .registry
        .list()?
        .iter()
        .map(|meta| TableInfo {
            name: meta.name.clone(),
            source_file: meta.source_file.clone(),
            row_count: meta.row_count,
            column_count: meta.column_count,
            columns: column_info(meta),
            created_at: meta.created_at,
        })
        .collect();
    let count = tables.len();
    Ok(Json(TablesResponse { tables, count }))
}

async fn delete_table(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.registry.drop_table(&name)?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Table '{name}' deleted"),
    })))
}

async fn public_data(
    State(state): State<AppState>,
    Json(body): Json<PublicDataRequest>,
) -> Result<Json<PublicDataResponse>, ApiError> {
    let Some(client) = &state.sources else {
        return Err(DeckError::InvalidParams(
            "public data sources are disabled".to_string(),
        )
        .into());
    };
    let source: PublicSource = body.source.parse()?;
    let batch = client.fetch(source, body.limit).await?;

    let hint = body
        .table_name
        .as_deref()
        .unwrap_or_else(|| source.table_name());
    let meta = state.registry.register(hint, source.as_str(), &batch)?;
    Ok(Json(PublicDataResponse {
        success: true,
        source: source.as_str().to_string(),
        table_name: meta.name.clone(),
        row_count: meta.row_count,
        message: format!(
            "Loaded {} rows from '{}' into table '{}'",
            meta.row_count,
            source.as_str(),
            meta.name
        ),
    }))
}

async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let outcome = state.chat.respond(&body.message).await?;
    Ok(Json(ChatResponse {
        success: true,
        intent: outcome.intent,
        reply: outcome.reply,
        provider: outcome.provider,
    }))
}

async fn download_artifact(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<Response, ApiError> {
    let path = state.plots.resolve(&file)?;
    let mime = mime_guess::from_path(&path).first_or_text_plain();
    let bytes = tokio::fs::read(&path).await.map_err(DeckError::Io)?;
    Ok((
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            mime.essence_str().to_string(),
        )],
        bytes,
    )
        .into_response())
}

pub fn router(state: AppState) -> Router {
    let max_upload = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(max_upload + 64 * 1024)),
        )
        .route("/query", post(query))
        .route("/summarize", post(summarize))
        .route("/tables", get(list_tables))
        .route("/tables/:name", axum::routing::delete(delete_table))
        .route("/public-data", post(public_data))
        .route("/chat", post(chat))
        .route("/artifacts/:file", get(download_artifact))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = AppState::from_config(config)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "DataDeck server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
