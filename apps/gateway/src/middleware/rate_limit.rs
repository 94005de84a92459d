//! Rate limiting middleware.

use std::collections::HashMap;
use std::future::{Ready, ready};
use std::rc::Rc;
use std::sync::Arc;

use actix_web::{
    Error, HttpMessage, HttpRequest,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::{
        Method,
        header::{HeaderName, HeaderValue},
    },
};
use futures::future::LocalBoxFuture;

use quorum_core::domain::RateToken;
use quorum_core::{RateLimitError, RateLimiter};

use super::error::AppError;
use crate::observability::RequestId;

/// Identity used when no forwarded address is present.
pub const LOOPBACK: &str = "127.0.0.1";

/// Client address: first `X-Forwarded-For` entry, else loopback.
pub fn client_ip(req: &HttpRequest) -> String {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(LOOPBACK)
        .to_string()
}

/// What to do when the counting store cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Forward the request unmetered.
    Open,
    /// Reject with 503.
    #[default]
    Closed,
}

/// Budget for one method on a resource.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    /// Token namespace, e.g. `votes:create`.
    pub scope: &'static str,
    /// Requests allowed per window.
    pub limit: u64,
}

/// Rate limiting middleware factory.
///
/// Methods without a policy pass straight through.
#[derive(Clone)]
pub struct RateLimitGuard {
    limiter: RateLimiter,
    policies: Arc<HashMap<Method, RoutePolicy>>,
    on_store_failure: FailurePolicy,
}

impl RateLimitGuard {
    pub fn new(limiter: RateLimiter) -> Self {
        Self {
            limiter,
            policies: Arc::new(HashMap::new()),
            on_store_failure: FailurePolicy::default(),
        }
    }

    /// Limit `method` to `limit` requests per window under `scope`.
    pub fn limit(mut self, method: Method, scope: &'static str, limit: u64) -> Self {
        Arc::make_mut(&mut self.policies).insert(method, RoutePolicy { scope, limit });
        self
    }

    pub fn on_store_failure(mut self, policy: FailurePolicy) -> Self {
        self.on_store_failure = policy;
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitGuardService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitGuardService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            policies: self.policies.clone(),
            on_store_failure: self.on_store_failure,
        }))
    }
}

pub struct RateLimitGuardService<S> {
    service: Rc<S>,
    limiter: RateLimiter,
    policies: Arc<HashMap<Method, RoutePolicy>>,
    on_store_failure: FailurePolicy,
}

impl<S, B> Service<ServiceRequest> for RateLimitGuardService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        let Some(policy) = self.policies.get(req.method()).cloned() else {
            return Box::pin(async move { Ok(service.call(req).await?.map_into_left_body()) });
        };

        let limiter = self.limiter.clone();
        let on_store_failure = self.on_store_failure;
        let ip = client_ip(req.request());

        // The check completes before the inner service is touched.
        Box::pin(async move {
            let outcome = match RateToken::scoped(policy.scope, &ip) {
                Ok(token) => limiter.check_token(policy.limit, &token).await,
                Err(e) => Err(e),
            };

            let status = match outcome {
                Ok(status) => Some(status),
                Err(e) if e.is_store_unavailable() && on_store_failure == FailurePolicy::Open => {
                    tracing::error!(scope = policy.scope, error = %e, "Rate limiter error, failing open");
                    None
                }
                Err(e) => {
                    if let RateLimitError::Exceeded { count, limit } = &e {
                        tracing::warn!(
                            scope = policy.scope,
                            client = %ip,
                            count,
                            limit,
                            "Rate limit exceeded"
                        );
                    }
                    let request_id = req.extensions().get::<RequestId>().cloned();
                    let res = AppError::from_rate_limit(e, limiter.interval())
                        .render(request_id.as_ref().map(RequestId::as_str));
                    return Ok(req.into_response(res).map_into_right_body());
                }
            };

            let mut res = service.call(req).await?;

            if let Some(status) = status {
                let headers = res.headers_mut();
                headers.insert(
                    HeaderName::from_static("x-ratelimit-limit"),
                    HeaderValue::from(status.limit),
                );
                headers.insert(
                    HeaderName::from_static("x-ratelimit-remaining"),
                    HeaderValue::from(status.remaining),
                );
            }

            Ok(res.map_into_left_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{App, HttpResponse, test, web};
    use quorum_core::ports::RateLimitStore;
    use quorum_infra::{InMemoryRateStore, UnavailableStore};
    use std::time::Duration;

    fn memory_limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(InMemoryRateStore::new()), Duration::from_secs(60))
    }

    async fn created() -> HttpResponse {
        HttpResponse::Created().finish()
    }

    fn post(uri: &str, ip: &str) -> test::TestRequest {
        test::TestRequest::post()
            .uri(uri)
            .insert_header(("x-forwarded-for", ip.to_string()))
    }

    #[::core::prelude::v1::test]
    fn test_client_ip_takes_first_forwarded_entry() {
        let req = test::TestRequest::default()
            .insert_header(("x-forwarded-for", " 198.51.100.7 , 10.0.0.1"))
            .to_http_request();
        assert_eq!(client_ip(&req), "198.51.100.7");
    }

    #[::core::prelude::v1::test]
    fn test_client_ip_falls_back_to_loopback() {
        let req = test::TestRequest::default().to_http_request();
        assert_eq!(client_ip(&req), LOOPBACK);

        let req = test::TestRequest::default()
            .insert_header(("x-forwarded-for", " , 10.0.0.1"))
            .to_http_request();
        assert_eq!(client_ip(&req), LOOPBACK);
    }

    #[actix_web::test]
    async fn test_rejects_once_budget_is_spent() {
        let guard = RateLimitGuard::new(memory_limiter()).limit(Method::POST, "votes:create", 2);
        let app = test::init_service(
            App::new().service(web::resource("/votes").wrap(guard).to(created)),
        )
        .await;

        for remaining in ["1", "0"] {
            let res = test::call_service(&app, post("/votes", "203.0.113.4").to_request()).await;
            assert_eq!(res.status(), StatusCode::CREATED);
            assert_eq!(res.headers().get("x-ratelimit-remaining").unwrap(), remaining);
        }

        let res = test::call_service(&app, post("/votes", "203.0.113.4").to_request()).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers().get("retry-after").unwrap(), "60");

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["status"], 429);
        assert!(body.get("request_id").is_none());

        // Another client has its own budget.
        let res = test::call_service(&app, post("/votes", "198.51.100.9").to_request()).await;
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    #[actix_web::test]
    async fn test_rejection_body_carries_request_id() {
        let guard = RateLimitGuard::new(memory_limiter()).limit(Method::POST, "users:sync", 1);
        let app = test::init_service(
            App::new()
                .wrap(crate::observability::RequestIdMiddleware)
                .service(web::resource("/users/sync").wrap(guard).to(created)),
        )
        .await;

        let res = test::call_service(&app, post("/users/sync", LOOPBACK).to_request()).await;
        assert_eq!(res.status(), StatusCode::CREATED);

        let req = post("/users/sync", LOOPBACK)
            .insert_header(("x-request-id", "lb-99"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers().get("x-request-id").unwrap(), "lb-99");

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["request_id"], "lb-99");
    }

    #[actix_web::test]
    async fn test_unlisted_methods_are_not_counted() {
        let guard = RateLimitGuard::new(memory_limiter()).limit(Method::POST, "comments:create", 1);
        let app = test::init_service(
            App::new().service(web::resource("/comments").wrap(guard).to(created)),
        )
        .await;

        for _ in 0..3 {
            let req = test::TestRequest::get().uri("/comments").to_request();
            let res = test::call_service(&app, req).await;
            assert_eq!(res.status(), StatusCode::CREATED);
            assert!(res.headers().get("x-ratelimit-limit").is_none());
        }

        let res = test::call_service(&app, post("/comments", LOOPBACK).to_request()).await;
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    #[actix_web::test]
    async fn test_scopes_keep_separate_buckets() {
        let limiter = memory_limiter();
        let app = test::init_service(
            App::new()
                .service(
                    web::resource("/votes")
                        .wrap(RateLimitGuard::new(limiter.clone()).limit(Method::POST, "votes:create", 1))
                        .to(created),
                )
                .service(
                    web::resource("/questions")
                        .wrap(RateLimitGuard::new(limiter).limit(Method::POST, "questions:create", 1))
                        .to(created),
                ),
        )
        .await;

        let res = test::call_service(&app, post("/votes", "203.0.113.4").to_request()).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let res = test::call_service(&app, post("/questions", "203.0.113.4").to_request()).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let res = test::call_service(&app, post("/votes", "203.0.113.4").to_request()).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[actix_web::test]
    async fn test_store_failure_policies() {
        let store: Arc<dyn RateLimitStore> = Arc::new(UnavailableStore::new("offline"));
        let limiter = RateLimiter::with_store(store);

        let app = test::init_service(
            App::new()
                .service(
                    web::resource("/closed")
                        .wrap(RateLimitGuard::new(limiter.clone()).limit(Method::POST, "closed", 5))
                        .to(created),
                )
                .service(
                    web::resource("/open")
                        .wrap(
                            RateLimitGuard::new(limiter)
                                .limit(Method::POST, "open", 5)
                                .on_store_failure(FailurePolicy::Open),
                        )
                        .to(created),
                ),
        )
        .await;

        let res = test::call_service(&app, post("/closed", LOOPBACK).to_request()).await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

        let res = test::call_service(&app, post("/open", LOOPBACK).to_request()).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        assert!(res.headers().get("x-ratelimit-remaining").is_none());
    }
}
