use anyhow::{Context, Result};
use rmcp::{
    ServiceExt,
    transport::{
        stdio,
        streamable_http_server::tower::{StreamableHttpServerConfig, StreamableHttpService},
    },
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

// Axum HTTP server for remote MCP
use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::{
    Router,
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
};
use tracing_subscriber::EnvFilter;

use songwright::catalog::Catalog;
use songwright::config::Config;
use songwright::transport::HttpTransport;
use songwright::{SongwrightServer, SongwrightService};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the MCP stream
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Arc::new(Config::load());
    let catalog = Arc::new(
        Catalog::load(&config.catalog.path)
            .with_context(|| format!("loading catalog {}", config.catalog.path.display()))?,
    );
    let transport = Arc::new(HttpTransport::new(config.http_timeout())?);

    let service = Arc::new(SongwrightService::new(
        Arc::clone(&config),
        catalog,
        transport,
    ));
    let server = SongwrightServer::new(service);

    // Choose transport: stdio (default) or http
    let transport = std::env::var("SONGWRIGHT_TRANSPORT").unwrap_or_else(|_| "stdio".to_string());
    match transport.as_str() {
        "http" | "streamable_http" => {
            let bind_var = std::env::var("SONGWRIGHT_HTTP_BIND")
                .unwrap_or_else(|_| "127.0.0.1:8787".to_string());
            let bind: SocketAddr = bind_var
                .parse()
                .with_context(|| format!("invalid SONGWRIGHT_HTTP_BIND '{bind_var}' (expected host:port)"))?;
            let path = std::env::var("SONGWRIGHT_HTTP_PATH").unwrap_or_else(|_| "/mcp".to_string());

            let bearer_token = std::env::var("SONGWRIGHT_BEARER_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty());

            let factory = server.clone();
            let session_manager: rmcp::transport::streamable_http_server::session::local::LocalSessionManager = Default::default();
            let http_service: StreamableHttpService<SongwrightServer, _> =
                StreamableHttpService::new(
                    move || Ok(factory.clone()),
                    Arc::new(session_manager),
                    StreamableHttpServerConfig {
                        stateful_mode: true,
                        sse_keep_alive: Some(Duration::from_secs(15)),
                    },
                );

            let mut router = Router::new().nest_service(path.as_str(), http_service);
            if let Some(expected) = bearer_token.clone() {
                router = router.layer(middleware::from_fn_with_state(
                    Arc::new(expected),
                    require_bearer,
                ));
            }
            let router = router.route("/health", axum::routing::get(|| async { "ok" }));

            let listener = tokio::net::TcpListener::bind(bind).await?;
            tracing::info!(
                %bind,
                path = %path,
                auth = %bearer_token.as_deref().map(|_| "bearer").unwrap_or("none"),
                "Starting Streamable HTTP MCP server"
            );

            axum::serve(listener, router).await?;
            Ok(())
        }
        _ => {
            tracing::info!("Starting MCP server on stdio transport");
            let running = server.serve(stdio()).await?;
            running.waiting().await?;
            tracing::info!("Server connection closed");
            Ok(())
        }
    }
}

fn query_token_matches(query: Option<&str>, expected: &str) -> bool {
    query.is_some_and(|q| {
        q.split('&').any(|pair| {
            pair.split_once('=')
                .is_some_and(|(k, v)| (k == "access_token" || k == "token") && v == expected)
        })
    })
}

async fn require_bearer(
    State(expected): State<Arc<String>>,
    req: Request<Body>,
    next: Next,
) -> impl IntoResponse {
    if req.uri().path().eq("/health") {
        return next.run(req).await;
    }
    let headers: &HeaderMap = req.headers();
    let authorized = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", expected.as_str()))
        // Clients that cannot set headers may pass access_token or token
        || query_token_matches(req.uri().query(), expected.as_str());
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }
    next.run(req).await
}
