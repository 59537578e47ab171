//! MDL API server
//!
//! Hosts the GraphQL endpoint for the model repository.
//! Handles:
//! - Authentication (bearer JWT) and rate limiting
//! - GraphQL queries, mutations and multipart artifact uploads
//! - Health probes
//! - Observability (logging, metrics, request ids)

mod graphql;
mod handlers;
mod middleware;

use anyhow::Context as _;
use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use mdl_common::{
    auth::{Authenticator, JwtManager},
    config::AppConfig,
    db::DbPool,
    metrics,
    services::ModelService,
    storage, Repository,
};
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::oneshot;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::graphql::MdlSchema;
use crate::middleware::rate_limit::{rate_limit_middleware, RateLimit};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub schema: MdlSchema,
    pub auth: Authenticator,
}

impl FromRef<AppState> for Authenticator {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load().context("failed to load configuration")?);

    init_tracing(&config);
    info!(
        version = mdl_common::VERSION,
        environment = %config.environment,
        "Starting MDL server"
    );

    // Initialize metrics
    init_metrics(&config)?;

    let db = connect_database(&config).await?;
    let store = storage::build(&config.storage).await;
    info!(bucket = %config.storage.bucket, "Object store ready");

    let jwt = Arc::new(JwtManager::new(
        &jwt_secret(&config)?,
        config.auth.jwt_expiration_secs,
    ));
    let repo = Repository::new(db.clone());
    let auth = Authenticator::new(jwt, repo.clone());
    let service = ModelService::new(repo, store, &config)?;

    let state = AppState {
        config: config.clone(),
        db,
        schema: graphql::build_schema(service),
        auth,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, app, shutdown_signal(), config.shutdown_timeout()).await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Serve until `signal` fires, then give in-flight requests `grace` to finish
async fn serve<F>(
    listener: tokio::net::TcpListener,
    app: Router,
    signal: F,
    grace: Duration,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (stop_tx, stop_rx) = oneshot::channel();
    let mut server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                signal.await;
                let _ = stop_tx.send(());
            })
            .into_future(),
    );

    tokio::select! {
        result = &mut server => return Ok(result??),
        _ = stop_rx => {}
    }

    match tokio::time::timeout(grace, &mut server).await {
        Ok(result) => Ok(result??),
        Err(_) => {
            warn!(
                grace_secs = grace.as_secs_f64(),
                "Graceful shutdown timed out; dropping open connections"
            );
            server.abort();
            Ok(())
        }
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn init_metrics(config: &AppConfig) -> anyhow::Result<()> {
    metrics::register_metrics();

    let port = config.observability.metrics_port;
    if port == 0 {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_upload_duration_seconds", metrics::METRICS_PREFIX)),
            metrics::UPLOAD_BUCKETS,
        )?
        .install()
        .context("failed to install Prometheus exporter")?;

    info!(port, "Prometheus exporter listening");
    Ok(())
}

async fn connect_database(config: &AppConfig) -> anyhow::Result<DbPool> {
    // a pooled in-memory SQLite would give every connection its own database
    if config.database.url.starts_with("sqlite::memory:") {
        warn!("Using in-memory SQLite; data is lost on restart");
        return Ok(DbPool::sqlite_memory().await?);
    }

    let db = DbPool::new(&config.database).await?;
    if config.database.auto_migrate {
        db.create_schema().await?;
    }
    Ok(db)
}

fn jwt_secret(config: &AppConfig) -> anyhow::Result<String> {
    match &config.auth.jwt_secret {
        Some(secret) if !secret.is_empty() => Ok(secret.clone()),
        _ if config.is_production() => {
            anyhow::bail!("auth.jwt_secret (JWT_SECRET) is required in production")
        }
        _ => {
            warn!("No JWT secret configured; issued tokens will not survive a restart");
            Ok(uuid::Uuid::new_v4().simple().to_string())
        }
    }
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let graphql_route = if state.config.is_production() {
        post(handlers::graphql::graphql)
    } else {
        get(handlers::graphql::graphiql).post(handlers::graphql::graphql)
    };

    let router = Router::new()
        .route("/graphql", graphql_route)
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready));

    let config = state.config.clone();
    with_middleware(router, &config).with_state(state)
}

/// Rate limiting, body limit, timeout, tracing, CORS and request ids
fn with_middleware<S>(mut router: Router<S>, config: &AppConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let limits = &config.rate_limit;
    if limits.enabled {
        let limit = RateLimit::new(limits.requests_per_second, limits.burst);
        router = router.layer(axum::middleware::from_fn_with_state(
            limit,
            rate_limit_middleware,
        ));
    }

    router
        .layer(RequestBodyLimitLayer::new(config.server.max_upload_bytes))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use mdl_common::db::models::Role;
    use mdl_common::storage::MemoryStore;
    use tower::ServiceExt;

    async fn app(config: AppConfig) -> (Router, Arc<JwtManager>, Repository) {
        let db = DbPool::sqlite_memory().await.unwrap();
        let repo = Repository::new(db.clone());
        let jwt = Arc::new(JwtManager::new("test-secret", 3600));
        let store = Arc::new(MemoryStore::new("mdl"));
        let service = ModelService::new(repo.clone(), store, &config).unwrap();

        let state = AppState {
            config: Arc::new(config),
            db,
            schema: graphql::build_schema(service),
            auth: Authenticator::new(jwt.clone(), repo.clone()),
        };
        (create_router(state), jwt, repo)
    }

    fn graphql_request(query: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::post("/graphql").header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = serde_json::json!({ "query": query }).to_string();
        builder.body(Body::from(body)).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let (router, _, _) = app(AppConfig::default()).await;

        let response = router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        let response = router
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["checks"]["database"]["status"], "up");
    }

    #[tokio::test]
    async fn test_bearer_token_resolves_identity() {
        let (router, jwt, repo) = app(AppConfig::default()).await;
        let user = repo.create_user("alice", None, Role::User).await.unwrap();
        let token = tokio_test::assert_ok!(jwt.generate_token(user.id, Role::User));

        let response = router
            .clone()
            .oneshot(graphql_request("{ me { name } }", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["data"]["me"]["name"], "alice");

        let response = router
            .oneshot(graphql_request("{ me { name } }", None))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["data"]["me"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_disabled_user_is_rejected() {
        let (router, jwt, repo) = app(AppConfig::default()).await;
        let user = repo.create_user("mallory", None, Role::User).await.unwrap();
        tokio_test::assert_ok!(repo.set_user_disabled(user.id, true).await);
        let token = jwt.generate_token(user.id, Role::User).unwrap();

        let response = router
            .oneshot(graphql_request("{ me { name } }", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_graphiql_hidden_in_production() {
        let (router, _, _) = app(AppConfig::default()).await;
        let response = router
            .oneshot(Request::get("/graphql").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let config = AppConfig {
            environment: "production".to_string(),
            ..AppConfig::default()
        };
        let (router, _, _) = app(config).await;
        let response = router
            .oneshot(Request::get("/graphql").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn test_jwt_secret_required_in_production() {
        let mut config = AppConfig {
            environment: "production".to_string(),
            ..AppConfig::default()
        };
        tokio_test::assert_err!(jwt_secret(&config));

        config.auth.jwt_secret = Some("s3cret".to_string());
        assert_eq!(jwt_secret(&config).unwrap(), "s3cret");

        config.environment = "development".to_string();
        config.auth.jwt_secret = None;
        assert_eq!(jwt_secret(&config).unwrap().len(), 32);
    }

    fn multipart_upload(operations: &str, token: &str) -> Request<Body> {
        let boundary = "mdl-test-boundary";
        let body = format!(
            "--{b}\r\n\
             Content-Disposition: form-data; name=\"operations\"\r\n\r\n\
             {operations}\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"map\"\r\n\r\n\
             {{\"0\": [\"variables.file\"]}}\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"0\"; filename=\"cgcnn.pth.tar\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n\
             weights\r\n\
             --{b}--\r\n",
            b = boundary,
        );

        Request::post("/graphql")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_multipart_upload_model() {
        let (router, jwt, repo) = app(AppConfig::default()).await;
        let user = repo.create_user("alice", None, Role::User).await.unwrap();
        let token = jwt.generate_token(user.id, Role::User).unwrap();

        let operations = serde_json::json!({
            "query": r#"mutation ($file: Upload!) {
                uploadModel(
                    artifact: $file,
                    keywords: "oqmd",
                    property: { name: "Band  Gap" },
                    method: { name: "CGCNN", description: "crystal graph network" },
                    regMetric: { mae: 0.25 }
                ) {
                    keywords property method
                    owner { name }
                    artifact { path filename }
                    metrics { ... on RegressionMetric { mae } }
                }
            }"#,
            "variables": { "file": null },
        })
        .to_string();

        let response = router
            .clone()
            .oneshot(multipart_upload(&operations, &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert!(body.get("errors").is_none(), "{body}");
        let model = &body["data"]["uploadModel"];
        assert_eq!(model["keywords"], "oqmd");
        assert_eq!(model["property"], "band gap");
        assert_eq!(model["method"], "cgcnn");
        assert_eq!(model["owner"]["name"], "alice");
        assert_eq!(model["metrics"]["mae"], 0.25);
        assert_eq!(model["artifact"]["filename"], "cgcnn.pth.tar");
        let path = model["artifact"]["path"].as_str().unwrap();
        assert!(
            path.starts_with("unknown.modelset/band gap/unknown.descriptor/cgcnn/"),
            "{path}"
        );

        // lookup created on the fly keeps its description
        let response = router
            .oneshot(graphql_request(
                r#"{ method(where: { name: "cgcnn" }) { description modelCounts } }"#,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(
            json_body(response).await["data"]["method"],
            serde_json::json!({ "description": "crystal graph network", "modelCounts": 1 })
        );
    }

    #[tokio::test]
    async fn test_multipart_upload_requires_sign_in() {
        let (router, _, _) = app(AppConfig::default()).await;
        let operations = serde_json::json!({
            "query": r#"mutation ($file: Upload!) { uploadModel(artifact: $file, keywords: "x") { id } }"#,
            "variables": { "file": null },
        })
        .to_string();

        let mut request = multipart_upload(&operations, "");
        request.headers_mut().remove(header::AUTHORIZATION);
        let response = router.oneshot(request).await.unwrap();

        let body = json_body(response).await;
        assert_eq!(body["errors"][0]["extensions"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_slow_request_times_out() {
        let mut config = AppConfig::default();
        config.server.request_timeout_secs = 1;
        config.rate_limit.enabled = false;

        let router = with_middleware(
            Router::new().route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    "late"
                }),
            ),
            &config,
        );

        let response = router
            .oneshot(Request::get("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn test_shutdown_is_bounded_by_grace_period() {
        let entered = Arc::new(tokio::sync::Notify::new());
        let handler_entered = entered.clone();
        let app = Router::new().route(
            "/slow",
            get(move || {
                let entered = handler_entered.clone();
                async move {
                    entered.notify_one();
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    "late"
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(
            listener,
            app,
            async move {
                let _ = stop_rx.await;
            },
            Duration::from_millis(200),
        ));

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        tokio::io::AsyncWriteExt::write_all(
            &mut client,
            b"GET /slow HTTP/1.1\r\nHost: localhost\r\n\r\n",
        )
        .await
        .unwrap();
        entered.notified().await;

        stop_tx.send(()).unwrap();
        let finished = tokio::time::timeout(Duration::from_secs(5), server).await;
        let result = tokio_test::assert_ok!(finished).unwrap();
        tokio_test::assert_ok!(result);
    }
}
