// Rate My Cat - Web Server
// REST API with Axum; the visitor's ratings travel in the `catList` cookie

use axum::{
    extract::{Path, State},
    http::{
        header::{CONTENT_TYPE, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use rate_my_cat::{
    cookie_from_header, import_catalog, load_catalog_csv, seed_default_cats, Cat, CatError,
    CatRepository, CatService, Config, CookieWriter, SqliteCatRepository, COOKIE_NAME,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Shared application state
///
/// The mutex is held for a whole rating (lookup, save, cookie), so two
/// ratings never interleave.
#[derive(Clone)]
struct AppState {
    service: Arc<Mutex<CatService<SqliteCatRepository>>>,
}

impl AppState {
    fn service(&self) -> Result<MutexGuard<'_, CatService<SqliteCatRepository>>, AppError> {
        self.service.lock().map_err(|_| AppError::Internal("service lock poisoned".to_string()))
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug)]
enum AppError {
    #[error(transparent)]
    Cat(#[from] CatError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Cat(CatError::InvalidRating { .. }) => StatusCode::BAD_REQUEST,
            AppError::Cat(CatError::NotFound { .. }) => StatusCode::NOT_FOUND,
            AppError::Cat(CatError::Repository(_)) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            warn!("Request failed: {}", self);
        }

        (status, Json(ApiResponse::<()>::err(self.to_string()))).into_response()
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Serialize)]
struct OpinionResponse {
    stars: f64,
    comment: String,
}

/// Cat as seen by one visitor
#[derive(Serialize)]
struct CatResponse {
    id: u64,
    name: String,
    image: String,
    average_rate: Option<f64>,
    rating_count: usize,
    /// The visitor's cookie already holds a rating for this cat
    rated: bool,
    opinions: Vec<OpinionResponse>,
}

impl CatResponse {
    fn build(service: &CatService<SqliteCatRepository>, cat: &Cat, cookie: &str) -> Self {
        let view = service.view_for_visitor(cat, cookie);
        let opinions = view
            .opinions
            .iter()
            .map(|o| OpinionResponse {
                stars: o.stars(),
                comment: o.comment().to_string(),
            })
            .collect();

        Self {
            id: cat.id,
            name: cat.name.clone(),
            image: cat.image.clone(),
            average_rate: cat.average_rate(),
            rating_count: cat.rating_count(),
            rated: view.rated,
            opinions,
        }
    }
}

#[derive(Deserialize)]
struct RateRequest {
    stars: f64,
    #[serde(default)]
    comment: String,
}

/// Collects `Set-Cookie` headers for the response
#[derive(Default)]
struct SetCookieHeaders(HeaderMap);

impl CookieWriter for SetCookieHeaders {
    fn add_cookie(&mut self, name: &str, value: &str) {
        match HeaderValue::from_str(&format!("{}={}; Path=/", name, value)) {
            Ok(header) => {
                self.0.append(SET_COOKIE, header);
            }
            Err(e) => warn!("Dropping unrepresentable cookie {}: {}", name, e),
        }
    }
}

fn visitor_cookie(headers: &HeaderMap) -> String {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .find_map(|h| cookie_from_header(h, COOKIE_NAME))
        .unwrap_or_default()
        .to_string()
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/cats - All cats, flagged with whether this visitor rated them
async fn list_cats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let cookie = visitor_cookie(&headers);
    let service = state.service()?;

    let cats: Vec<CatResponse> = service
        .find_all_cats()?
        .iter()
        .map(|cat| CatResponse::build(&service, cat, &cookie))
        .collect();

    Ok(Json(ApiResponse::ok(cats)))
}

/// GET /api/cats/:id - One cat
async fn get_cat(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let cookie = visitor_cookie(&headers);
    let service = state.service()?;

    let cat = service.find_cat(id)?;
    Ok(Json(ApiResponse::ok(CatResponse::build(&service, &cat, &cookie))))
}

/// POST /api/cats/:id/rate - Rate a cat and update the visitor's cookie
async fn rate_cat(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Json(request): Json<RateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let old_cookie = visitor_cookie(&headers);
    let mut writer = SetCookieHeaders::default();
    let mut service = state.service()?;

    let (cat, new_cookie) =
        service.rate_and_remember(request.stars, &request.comment, id, &old_cookie, &mut writer)?;

    let body = CatResponse::build(&service, &cat, &new_cookie);
    Ok((StatusCode::OK, writer.0, Json(ApiResponse::ok(body))))
}

// ============================================================================
// Main Server
// ============================================================================

fn open_service(config: &Config) -> anyhow::Result<CatService<SqliteCatRepository>> {
    let mut repository = SqliteCatRepository::open(&config.database_path)?.with_actor("web");
    info!("Database opened: {}", config.database_path.display());

    if let Some(csv_path) = &config.catalog_csv {
        let rows = load_catalog_csv(csv_path)?;
        let inserted = import_catalog(&mut repository, &rows)?;
        info!("Imported {} cats from {}", inserted, csv_path.display());
    }

    if repository.find_all()?.is_empty() {
        let seeded = seed_default_cats(&mut repository)?;
        info!("Empty catalog, seeded {} default cats", seeded);
    }

    Ok(CatService::new(repository))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Rate My Cat {} - Web Server", rate_my_cat::VERSION);

    let config = Config::load()?;
    let state = AppState {
        service: Arc::new(Mutex::new(open_service(&config)?)),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/cats", get(list_cats))
        .route("/cats/:id", get(get_cat))
        .route("/cats/:id/rate", post(rate_cat))
        .with_state(state);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    let app = Router::new().nest("/api", api_routes).layer(cors);

    let address = config.address();
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
