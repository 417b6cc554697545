use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use signalboard_core::auth::supabase::SupabaseAuth;
use signalboard_core::auth::{AuthProvider, AuthRejected, Session};
use signalboard_core::dashboard::{self, Dashboard, StockDetail};
use signalboard_core::domain::market::by_score_desc;
use signalboard_core::domain::position::{NewPosition, PositionRecord};
use signalboard_core::domain::recommendation::HorizonMode;
use signalboard_core::engine::Strategy;
use signalboard_core::llm::gemini::GeminiClient;
use signalboard_core::llm::{error::advisory_message, prompt, Citation, CommentaryClient};
use signalboard_core::storage::{MarketStore, PgStore};

mod sessions;

use sessions::SessionRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = signalboard_core::config::Settings::from_env();
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();
    settings.warn_missing();

    let store: Option<Arc<dyn MarketStore>> = match settings.require_database_url() {
        Ok(db_url) => match PgStore::connect(db_url).await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %e, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let auth: Option<Arc<dyn AuthProvider>> = match SupabaseAuth::from_settings(&settings) {
        Ok(auth) => Some(Arc::new(auth)),
        Err(e) => {
            tracing::warn!(error = %e, "auth disabled");
            None
        }
    };

    let ai: Option<Arc<dyn CommentaryClient>> = match GeminiClient::from_settings(&settings) {
        Ok(client) => {
            tracing::info!(model = client.model(), "AI commentary enabled");
            Some(Arc::new(client))
        }
        Err(e) => {
            tracing::warn!(error = %e, "AI commentary disabled");
            None
        }
    };

    let state = AppState {
        store,
        auth: auth.clone(),
        ai,
        sessions: SessionRegistry::new(settings.idle_timeout, auth),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/dashboard", get(get_dashboard))
        .route("/stocks/:code", get(get_stock_detail))
        .route("/portfolio", get(list_portfolio).post(add_position))
        .route("/portfolio/:code", delete(remove_position))
        .route("/ai/overview", post(ai_overview))
        .route("/ai/stocks/:code", post(ai_stock_detail))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    store: Option<Arc<dyn MarketStore>>,
    auth: Option<Arc<dyn AuthProvider>>,
    ai: Option<Arc<dyn CommentaryClient>>,
    sessions: Arc<SessionRegistry>,
}

impl AppState {
    fn store(&self) -> Result<&dyn MarketStore, StatusCode> {
        self.store
            .as_deref()
            .ok_or(StatusCode::SERVICE_UNAVAILABLE)
    }

    async fn session(&self, headers: &HeaderMap) -> Result<Session, StatusCode> {
        let token = bearer_token(headers).ok_or(StatusCode::UNAUTHORIZED)?;
        self.sessions
            .authenticate(token, Utc::now())
            .await
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

fn internal(err: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&err);
    tracing::error!(error = %err, "request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, StatusCode> {
    let Some(auth) = &state.auth else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let session = auth
        .sign_in(req.email.trim(), &req.password)
        .await
        .map_err(|e| {
            if let Some(rejected) = e.downcast_ref::<AuthRejected>() {
                tracing::info!(status = rejected.status, "sign-in rejected");
                return StatusCode::UNAUTHORIZED;
            }
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "sign-in failed");
            StatusCode::BAD_GATEWAY
        })?;

    let user_id = session.user_id;
    let expires_at = session.expires_at;
    let token = state.sessions.insert(session);

    Ok(Json(LoginResponse {
        token,
        user_id,
        expires_at,
    }))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    let Some(session) = bearer_token(&headers).and_then(|t| state.sessions.remove(t)) else {
        return StatusCode::UNAUTHORIZED;
    };

    if let Some(auth) = &state.auth {
        if let Err(e) = auth.sign_out(&session).await {
            tracing::warn!(user_id = %session.user_id, error = %e, "upstream sign-out failed");
        }
    }
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
struct DashboardQuery {
    strategy: Option<String>,
}

async fn get_dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<Dashboard>, StatusCode> {
    let session = state.session(&headers).await?;
    let store = state.store()?;

    let strategy = match query.strategy.as_deref() {
        Some(s) => s.parse::<Strategy>().map_err(|_| StatusCode::BAD_REQUEST)?,
        None => Strategy::Banding,
    };

    let dashboard = dashboard::load_dashboard(store, session.user_id, strategy, Utc::now())
        .await
        .map_err(internal)?;
    Ok(Json(dashboard))
}

#[derive(Debug, Deserialize)]
struct DetailQuery {
    mode: Option<String>,
}

fn parse_mode(mode: Option<&str>) -> Result<Option<HorizonMode>, StatusCode> {
    mode.map(|m| m.parse::<HorizonMode>())
        .transpose()
        .map_err(|_| StatusCode::BAD_REQUEST)
}

async fn get_stock_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Query(query): Query<DetailQuery>,
) -> Result<Json<StockDetail>, StatusCode> {
    let session = state.session(&headers).await?;
    let store = state.store()?;
    let force_mode = parse_mode(query.mode.as_deref())?;

    let detail = dashboard::load_detail(store, session.user_id, &code, force_mode, Utc::now())
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(detail))
}

async fn list_portfolio(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<PositionRecord>>, StatusCode> {
    let session = state.session(&headers).await?;
    let store = state.store()?;
    let holdings = store
        .list_holdings(session.user_id)
        .await
        .map_err(internal)?;
    Ok(Json(holdings))
}

async fn add_position(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(position): Json<NewPosition>,
) -> Result<(StatusCode, Json<PositionRecord>), StatusCode> {
    let session = state.session(&headers).await?;
    let store = state.store()?;
    let position = position.validate().map_err(|e| {
        tracing::info!(error = %e, "rejected portfolio input");
        StatusCode::BAD_REQUEST
    })?;

    let record = store
        .add_position(session.user_id, position)
        .await
        .map_err(internal)?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn remove_position(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let session = state.session(&headers).await?;
    let store = state.store()?;
    let removed = store
        .remove_position(session.user_id, &code)
        .await
        .map_err(internal)?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

#[derive(Debug, Serialize)]
struct AiResponse {
    text: String,
    sources: Vec<Citation>,
    /// True when `text` is an advisory message instead of model output.
    degraded: bool,
}

async fn commentary_or_advisory(
    ai: Option<&Arc<dyn CommentaryClient>>,
    prompt: &str,
) -> AiResponse {
    let Some(client) = ai else {
        return advisory(&anyhow::anyhow!("AI client is not configured"));
    };

    match client.generate(prompt).await {
        Ok(c) => AiResponse {
            text: c.text,
            sources: c.sources,
            degraded: false,
        },
        Err(err) => {
            tracing::warn!(provider = ?client.provider(), error = %err, "AI commentary failed");
            advisory(&err)
        }
    }
}

fn advisory(err: &anyhow::Error) -> AiResponse {
    AiResponse {
        text: advisory_message(err),
        sources: Vec::new(),
        degraded: true,
    }
}

async fn ai_overview(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AiResponse>, StatusCode> {
    let session = state.session(&headers).await?;
    let store = state.store()?;

    let dashboard =
        dashboard::load_dashboard(store, session.user_id, Strategy::Banding, Utc::now())
            .await
            .map_err(internal)?;
    let mut records: Vec<_> = dashboard.rows.into_iter().map(|r| r.record).collect();
    records.sort_by(by_score_desc);

    let prompt = prompt::market_overview(&records);
    Ok(Json(commentary_or_advisory(state.ai.as_ref(), &prompt).await))
}

async fn ai_stock_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Result<Json<AiResponse>, StatusCode> {
    let session = state.session(&headers).await?;
    let store = state.store()?;

    let detail = dashboard::load_detail(store, session.user_id, &code, None, Utc::now())
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let prompt = prompt::stock_detail(
        &detail.record,
        &detail.recommendation,
        detail.position.as_ref(),
    );
    Ok(Json(commentary_or_advisory(state.ai.as_ref(), &prompt).await))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &signalboard_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
