//! HTTP handlers and route configuration.

mod health;
mod proxy;

use actix_web::{http::Method, web};
use quorum_core::RateLimiter;

use crate::middleware::rate_limit::{FailurePolicy, RateLimitGuard};

/// Configure all application routes.
///
/// Write-heavy polling routes get a per-method budget per client per window;
/// everything else, admin routes included, is forwarded unmetered.
pub fn configure_routes(
    cfg: &mut web::ServiceConfig,
    limiter: &RateLimiter,
    on_store_failure: FailurePolicy,
) {
    let guard = || RateLimitGuard::new(limiter.clone()).on_store_failure(on_store_failure);

    cfg.service(
        web::scope("/api")
            // Public routes
            .route("/health", web::get().to(health::health_check))
            // Rate limited routes
            .service(
                web::resource("/votes")
                    .wrap(guard().limit(Method::POST, "votes:create", 20))
                    .to(proxy::forward),
            )
            .service(
                web::resource("/questions")
                    .wrap(
                        guard()
                            .limit(Method::GET, "questions:list", 60)
                            .limit(Method::POST, "questions:create", 10),
                    )
                    .to(proxy::forward),
            )
            .service(
                web::resource("/questions/{id}")
                    .wrap(guard().limit(Method::DELETE, "questions:delete", 5))
                    .to(proxy::forward),
            )
            .service(
                web::resource("/comments")
                    .wrap(
                        guard()
                            .limit(Method::GET, "comments:list", 60)
                            .limit(Method::POST, "comments:create", 10),
                    )
                    .to(proxy::forward),
            )
            .service(
                web::resource("/comments/{id}")
                    .wrap(guard().limit(Method::DELETE, "comments:delete", 10))
                    .to(proxy::forward),
            )
            .service(
                web::resource("/users/sync")
                    .wrap(guard().limit(Method::POST, "users:sync", 20))
                    .to(proxy::forward),
            )
            .default_service(web::to(proxy::forward)),
    )
    .default_service(web::to(proxy::forward));
}
