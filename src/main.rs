mod bluefly;
mod category_db;
mod context;
mod http;
mod mapper;
mod metrics;
mod models;
mod pipeline;
mod security;
mod settings;
mod shopify;
mod store;
mod worker;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use context::SyncContext;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::ApiError;
use security::{topic_allowed, verify_webhook_hmac};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use store::webhook_log::WebhookEvent;
use tokio::sync::Notify;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "vendize.api", "fatal: {err}");
        std::process::exit(1);
    }
}

async fn run() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    match std::env::args().nth(1).as_deref() {
        Some("reprocess") => reprocess().await,
        Some("catalog") => catalog().await,
        Some("serve") | None => serve().await,
        Some(other) => Err(eyre::eyre!(
            "unknown mode `{other}` (expected `serve`, `reprocess`, or `catalog`)"
        )),
    }
}

/// One-shot batch mode: drain unread events, print a summary, exit.
async fn reprocess() -> eyre::Result<()> {
    let ctx = SyncContext::from_env()?;
    let summary = pipeline::run_batch(&ctx).await?;
    println!(
        "Pipeline complete: {} pushed, {} skipped, {} errored ({} duplicates collapsed)",
        summary.pushed, summary.skipped, summary.errored, summary.deduplicated
    );
    println!("Check the pipeline log directory for detailed job records.");
    Ok(())
}

/// Fetch the live marketplace catalog and print a short summary. Useful for
/// checking what the feed currently carries without touching the dashboard.
async fn catalog() -> eyre::Result<()> {
    let ctx = SyncContext::from_env()?;
    let result = ctx.bluefly.get_catalog().await;
    if !result.success {
        return Err(eyre::eyre!(
            "catalog fetch failed: {}",
            result.error.unwrap_or_else(|| "unknown".to_string())
        ));
    }

    match result.data {
        Some(serde_json::Value::Array(products)) => {
            println!("Catalog: {} products", products.len());
            for product in products.iter().take(20) {
                let sku = product["SellerSKU"].as_str().unwrap_or("?");
                let buyables = product["BuyableProducts"]
                    .as_array()
                    .map(|b| b.len())
                    .unwrap_or(0);
                println!("  {sku} ({buyables} buyable)");
            }
            if products.len() > 20 {
                println!("  ... and {} more", products.len() - 20);
            }
        }
        Some(other) => println!("{}", serde_json::to_string_pretty(&other)?),
        None => println!("Catalog response was empty."),
    }
    Ok(())
}

async fn serve() -> eyre::Result<()> {
    let webhook_secret = std::env::var("SHOPIFY_WEBHOOK_SECRET").unwrap_or_default();
    if webhook_secret.is_empty() {
        warn!(
            target = "vendize.api",
            "SHOPIFY_WEBHOOK_SECRET is not set; HMAC verification will reject everything"
        );
    }

    let ctx = Arc::new(SyncContext::from_env()?);
    let (worker_nudge, _worker) = worker::spawn(ctx.clone());

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|err| eyre::eyre!("prometheus recorder: {err}"))?;

    let state = AppState {
        ctx,
        webhook_secret,
        worker_nudge,
        prometheus_handle,
    };

    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let app = Router::new()
        .route("/webhooks/shopify", post(handle_webhook))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(body_limit_from_env()));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(5000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "vendize.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    ctx: Arc<SyncContext>,
    webhook_secret: String,
    worker_nudge: Arc<Notify>,
    prometheus_handle: PrometheusHandle,
}

/// Inbound webhook receiver.
///
/// - Method: `POST`
/// - Path: `/webhooks/shopify`
/// - Auth: `X-Shopify-Hmac-SHA256` over the raw body
///
/// Verifies the signature before touching the body, durably logs the event,
/// and acks with an empty 200. Pipeline processing happens in the worker —
/// its outcome is never reflected in this response.
async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    crate::metrics::inc_requests("/webhooks/shopify");

    let hmac_header = header_str(&headers, "X-Shopify-Hmac-SHA256");
    if let Err(err) = verify_webhook_hmac(&body, hmac_header, &state.webhook_secret) {
        warn!(target = "vendize.api", error = %err, "rejected webhook");
        return error_response(StatusCode::UNAUTHORIZED, "invalid_signature");
    }

    let topic = non_empty_or(header_str(&headers, "X-Shopify-Topic"), "unknown");
    let shop_domain = non_empty_or(header_str(&headers, "X-Shopify-Shop-Domain"), "unknown");
    let event_id = header_str(&headers, "X-Shopify-Event-Id");
    // Header can be absent on manual redeliveries; keep filenames unique.
    let event_id = if event_id.is_empty() {
        format!("gen-{}", uuid::Uuid::new_v4().simple())
    } else {
        event_id.to_string()
    };

    if !topic_allowed(topic) {
        warn!(
            target = "vendize.api",
            topic, shop_domain, "unexpected webhook topic"
        );
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "malformed_json"),
    };

    let record = WebhookEvent::new(&event_id, topic, shop_domain, payload);
    match state.ctx.webhook_log.append(record) {
        Ok(path) => {
            info!(
                target = "vendize.api",
                topic,
                file = %path.display(),
                "logged webhook event"
            );
            state.worker_nudge.notify_one();
            StatusCode::OK.into_response()
        }
        Err(err) => {
            error!(target = "vendize.api", error = %err, "cannot log webhook event");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "log_write_failed")
        }
    }
}

fn error_response(status: StatusCode, code: &str) -> Response {
    let payload = ApiError {
        error: code.to_string(),
        detail: None,
    };
    (status, Json(payload)).into_response()
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
/// - Auth: none
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "vendize-sync-rs",
    }))
}

async fn metrics_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> axum::http::Response<String> {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = header_str(&headers, "X-Metrics-Key");
        if presented != secret {
            return axum::http::Response::builder()
                .status(StatusCode::UNAUTHORIZED)
                .body("unauthorized".into())
                .unwrap_or_default();
        }
    }
    let body = state.prometheus_handle.render();
    axum::http::Response::builder()
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .unwrap_or_default()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() { fallback } else { value }
}

fn body_limit_from_env() -> usize {
    std::env::var("REQUEST_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(256 * 1024)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
