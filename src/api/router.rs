//! HTTP routing with per-client rate limiting.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request, Response, StatusCode},
    middleware::{self, Next},
    response::IntoResponse,
    routing::{get, post},
};
use governor::{Quota, RateLimiter};
use tower::ServiceBuilder;
use tower_http::{
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::app::AppState;
use crate::domain::{ErrorDetail, ErrorResponse, RateLimitResponse};

use super::handlers::{
    create_asset_handler, delete_asset_handler, get_asset_handler, health_check_handler,
    list_activities_handler, listing_handler, liveness_handler, metrics_handler, mint_handler,
    price_handler, purchase_handler, readiness_handler, transfer_handler,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests per second for asset endpoints
    pub general_rps: u32,
    /// Burst size for asset endpoints
    pub general_burst: u32,
    /// Requests per second for health endpoints
    pub health_rps: u32,
    /// Burst size for health endpoints
    pub health_burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            general_rps: 10,
            general_burst: 20,
            health_rps: 100,
            health_burst: 100,
        }
    }
}

type KeyedLimiter = RateLimiter<
    IpAddr,
    governor::state::keyed::DashMapStateStore<IpAddr>,
    governor::clock::DefaultClock,
>;

/// Shared rate limiter state, keyed by client IP.
pub struct RateLimitState {
    assets_limiter: KeyedLimiter,
    health_limiter: KeyedLimiter,
    config: RateLimitConfig,
}

fn quota(rps: u32, burst: u32) -> Quota {
    let rps = NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst).unwrap_or(rps);
    Quota::per_second(rps).allow_burst(burst)
}

impl RateLimitState {
    /// Zero rates are raised to one request per second.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            assets_limiter: RateLimiter::dashmap(quota(config.general_rps, config.general_burst)),
            health_limiter: RateLimiter::dashmap(quota(config.health_rps, config.health_burst)),
            config,
        }
    }
}

/// Client IP from `X-Forwarded-For`, `X-Real-IP`, or the connection itself.
/// Unknown clients share the `0.0.0.0` bucket.
fn client_ip_from_request<B>(request: &Request<B>) -> IpAddr {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());
    if let Some(ip) = forwarded {
        return ip;
    }

    let real_ip = request
        .headers()
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok());
    if let Some(ip) = real_ip {
        return ip;
    }

    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip();
    }
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

/// Whole seconds to wait, rounded up so clients never retry early.
fn retry_after_secs(wait_time: Duration) -> u64 {
    wait_time.as_secs() + u64::from(wait_time.subsec_nanos() > 0)
}

async fn rate_limit_assets_middleware(
    State(rate_limit): State<Arc<RateLimitState>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let client_ip = client_ip_from_request(&request);
    let limit = HeaderValue::from(rate_limit.config.general_rps);

    match rate_limit.assets_limiter.check_key(&client_ip) {
        Ok(_) => {
            let mut response = next.run(request).await;
            response.headers_mut().insert("X-RateLimit-Limit", limit);
            response
        }
        Err(not_until) => {
            let retry_after = retry_after_secs(not_until.wait_time_from(
                governor::clock::Clock::now(&governor::clock::DefaultClock::default()),
            ));
            let body = RateLimitResponse {
                error: ErrorDetail {
                    r#type: "rate_limited".to_string(),
                    message: "Rate limit exceeded. Please slow down your requests.".to_string(),
                },
                retry_after,
            };

            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", limit);
            headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
            headers.insert("Retry-After", HeaderValue::from(retry_after));
            response
        }
    }
}

async fn rate_limit_health_middleware(
    State(rate_limit): State<Arc<RateLimitState>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let client_ip = client_ip_from_request(&request);
    match rate_limit.health_limiter.check_key(&client_ip) {
        Ok(_) => next.run(request).await,
        Err(not_until) => {
            let retry_after = retry_after_secs(not_until.wait_time_from(
                governor::clock::Clock::now(&governor::clock::DefaultClock::default()),
            ));
            let body = ErrorResponse {
                error: ErrorDetail {
                    r#type: "rate_limited".to_string(),
                    message: "Rate limit exceeded".to_string(),
                },
            };

            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
            response
                .headers_mut()
                .insert("Retry-After", HeaderValue::from(retry_after));
            response
        }
    }
}

fn asset_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_asset_handler))
        .route("/{hash}", get(get_asset_handler).delete(delete_asset_handler))
        .route("/{hash}/activities", get(list_activities_handler))
        .route("/{hash}/mint", post(mint_handler))
        .route("/{hash}/purchase", post(purchase_handler))
        .route("/{hash}/transfer", post(transfer_handler))
        .route("/{hash}/listing", post(listing_handler))
        .route("/{hash}/price", post(price_handler))
}

fn health_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(health_check_handler))
        .route("/live", get(liveness_handler))
        .route("/ready", get(readiness_handler))
}

fn assemble(
    app_state: Arc<AppState>,
    assets: Router<Arc<AppState>>,
    health: Router<Arc<AppState>>,
) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ));

    Router::new()
        .nest("/assets", assets)
        .nest("/health", health)
        .route("/metrics", get(metrics_handler))
        .layer(middleware)
        .with_state(app_state)
}

/// Create router without rate limiting
pub fn create_router(app_state: Arc<AppState>) -> Router {
    assemble(app_state, asset_routes(), health_routes())
}

/// Create router with per-IP rate limiting on asset and health routes
pub fn create_router_with_rate_limit(app_state: Arc<AppState>, config: RateLimitConfig) -> Router {
    let rate_limit_state = Arc::new(RateLimitState::new(config));

    let assets = asset_routes().layer(middleware::from_fn_with_state(
        Arc::clone(&rate_limit_state),
        rate_limit_assets_middleware,
    ));
    let health = health_routes().layer(middleware::from_fn_with_state(
        rate_limit_state,
        rate_limit_health_middleware,
    ));

    assemble(app_state, assets, health)
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        middleware,
        response::IntoResponse,
        routing::get,
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    use super::*;

    fn test_state() -> Arc<AppState> {
        use crate::app::{LifecycleService, PollerConfig, StatusPoller, WorkerPool};
        use crate::test_utils::{MockBlockchainClient, MockDatabaseClient, MockStatusService};

        let db = Arc::new(MockDatabaseClient::new());
        let pool = WorkerPool::new(4).unwrap();
        let poller = Arc::new(StatusPoller::new(PollerConfig::default(), pool.clone()).unwrap());
        let service = LifecycleService::new(
            db.clone(),
            db,
            Arc::new(MockBlockchainClient::new()),
            Arc::new(MockStatusService::new()),
            poller,
            pool,
        );
        Arc::new(AppState::new(Arc::new(service)))
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    mod rate_limit_config_tests {
        use super::*;

        #[test]
        fn test_rate_limit_config_default() {
            let config = RateLimitConfig::default();
            assert_eq!(config.general_rps, 10);
            assert_eq!(config.general_burst, 20);
            assert_eq!(config.health_rps, 100);
            assert_eq!(config.health_burst, 100);
        }

        #[test]
        fn test_zero_rates_do_not_panic() {
            let _state = RateLimitState::new(RateLimitConfig {
                general_rps: 0,
                general_burst: 0,
                health_rps: 0,
                health_burst: 0,
            });
        }

        #[test]
        fn test_retry_after_rounds_up() {
            assert_eq!(retry_after_secs(Duration::from_millis(0)), 0);
            assert_eq!(retry_after_secs(Duration::from_millis(200)), 1);
            assert_eq!(retry_after_secs(Duration::from_secs(2)), 2);
        }
    }

    mod middleware_tests {
        use super::*;
        use http_body_util::BodyExt;

        async fn dummy_handler() -> impl IntoResponse {
            StatusCode::OK
        }

        fn limited_app(config: RateLimitConfig) -> Router {
            let state = Arc::new(RateLimitState::new(config));
            Router::new()
                .route("/", get(dummy_handler))
                .layer(middleware::from_fn_with_state(
                    state,
                    rate_limit_assets_middleware,
                ))
        }

        #[tokio::test]
        async fn test_rate_limit_blocks_and_sets_headers() {
            let app = limited_app(RateLimitConfig {
                general_rps: 1,
                general_burst: 1,
                ..Default::default()
            });

            let first = app.clone().oneshot(get_request("/")).await.unwrap();
            assert_eq!(first.status(), StatusCode::OK);
            assert_eq!(first.headers().get("X-RateLimit-Limit").unwrap(), "1");

            let response = app.oneshot(get_request("/")).await.unwrap();
            assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
            assert_eq!(
                response.headers().get("X-RateLimit-Remaining").unwrap(),
                "0"
            );
            assert!(response.headers().contains_key("Retry-After"));

            let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
            let body_str = String::from_utf8_lossy(&body_bytes);
            assert!(body_str.contains("rate_limited"));
            assert!(body_str.contains("retry_after"));
        }

        #[tokio::test]
        async fn test_rate_limit_is_per_ip() {
            let app = limited_app(RateLimitConfig {
                general_rps: 1,
                general_burst: 1,
                ..Default::default()
            });

            let from = |ip: &str| {
                Request::builder()
                    .uri("/")
                    .header("X-Forwarded-For", ip)
                    .body(Body::empty())
                    .unwrap()
            };

            app.clone().oneshot(from("192.168.1.1")).await.unwrap();
            let blocked = app.clone().oneshot(from("192.168.1.1")).await.unwrap();
            assert_eq!(blocked.status(), StatusCode::TOO_MANY_REQUESTS);

            let other = app.oneshot(from("10.0.0.1")).await.unwrap();
            assert_eq!(other.status(), StatusCode::OK);
        }

        #[tokio::test]
        async fn test_health_rate_limit_eventually_blocks() {
            let state = Arc::new(RateLimitState::new(RateLimitConfig {
                health_rps: 1,
                health_burst: 1,
                ..Default::default()
            }));
            let app = Router::new()
                .route("/", get(dummy_handler))
                .layer(middleware::from_fn_with_state(
                    state,
                    rate_limit_health_middleware,
                ));

            let response = app.clone().oneshot(get_request("/")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let response = app.oneshot(get_request("/")).await.unwrap();
            assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
            assert!(response.headers().contains_key("Retry-After"));
        }

        #[test]
        fn test_client_ip_resolution_order() {
            let request = Request::builder()
                .header("X-Forwarded-For", "203.0.113.7, 10.0.0.1")
                .header("X-Real-IP", "198.51.100.2")
                .body(())
                .unwrap();
            assert_eq!(
                client_ip_from_request(&request),
                "203.0.113.7".parse::<IpAddr>().unwrap()
            );

            let request = Request::builder()
                .header("X-Real-IP", "198.51.100.2")
                .body(())
                .unwrap();
            assert_eq!(
                client_ip_from_request(&request),
                "198.51.100.2".parse::<IpAddr>().unwrap()
            );

            let mut request = Request::builder().body(()).unwrap();
            request
                .extensions_mut()
                .insert(ConnectInfo("127.0.0.5:4000".parse::<SocketAddr>().unwrap()));
            assert_eq!(
                client_ip_from_request(&request),
                "127.0.0.5".parse::<IpAddr>().unwrap()
            );

            let request = Request::builder().body(()).unwrap();
            assert_eq!(
                client_ip_from_request(&request),
                IpAddr::V4(Ipv4Addr::UNSPECIFIED)
            );
        }
    }

    mod router_tests {
        use super::*;

        #[tokio::test]
        async fn test_router_health_endpoints() {
            let router = create_router(test_state());

            for uri in ["/health", "/health/live", "/health/ready"] {
                let res = router.clone().oneshot(get_request(uri)).await.unwrap();
                assert_eq!(res.status(), StatusCode::OK, "{}", uri);
            }
        }

        #[tokio::test]
        async fn test_router_unknown_asset_is_404() {
            let router = create_router(test_state());

            let res = router
                .oneshot(get_request("/assets/00000000deadbeef"))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn test_router_metrics_without_recorder_is_404() {
            let router = create_router(test_state());

            let res = router.oneshot(get_request("/metrics")).await.unwrap();
            assert_eq!(res.status(), StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn test_router_with_rate_limit_applies_limits() {
            let config = RateLimitConfig {
                general_rps: 1,
                general_burst: 1,
                health_rps: 100,
                health_burst: 100,
            };
            let router = create_router_with_rate_limit(test_state(), config);

            let res = router
                .clone()
                .oneshot(get_request("/assets/00000000deadbeef"))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::NOT_FOUND);

            let res = router
                .clone()
                .oneshot(get_request("/assets/00000000deadbeef"))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);

            // Health routes use their own bucket.
            let res = router.oneshot(get_request("/health/live")).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }
    }
}
