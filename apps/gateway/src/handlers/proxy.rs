//! Forwarding handler - relays admitted requests to the polling API.

use actix_web::{
    HttpRequest, HttpResponse,
    http::{StatusCode, header::HeaderValue},
    web,
};

use crate::middleware::error::{AppError, AppResult};
use crate::observability::{REQUEST_ID_HEADER, RequestId};
use crate::state::AppState;

/// Headers that describe a single connection and must not be relayed.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Forward the request as-is and relay the upstream response.
///
/// Any path without its own route lands here too.
pub async fn forward(
    req: HttpRequest,
    body: web::Bytes,
    request_id: RequestId,
    state: web::Data<AppState>,
) -> HttpResponse {
    match relay(&req, body, &request_id, &state).await {
        Ok(response) => response,
        Err(e) => e.render(Some(request_id.as_str())),
    }
}

async fn relay(
    req: &HttpRequest,
    body: web::Bytes,
    request_id: &RequestId,
    state: &AppState,
) -> AppResult<HttpResponse> {
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = state.upstream.url_for(path_and_query);

    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut upstream_req = state.upstream.client.request(method, &url);
    for (name, value) in req.headers() {
        if is_hop_by_hop(name.as_str()) || name.as_str().eq_ignore_ascii_case(REQUEST_ID_HEADER) {
            continue;
        }
        upstream_req = upstream_req.header(name.as_str(), value.as_bytes());
    }
    upstream_req = upstream_req.header(REQUEST_ID_HEADER, request_id.as_str());

    if !body.is_empty() {
        upstream_req = upstream_req.body(body);
    }

    tracing::debug!(method = %req.method(), url = %url, "Forwarding request upstream");

    let upstream_res = upstream_req
        .send()
        .await
        .map_err(|e| AppError::BadGateway(e.to_string()))?;

    let status = StatusCode::from_u16(upstream_res.status().as_u16())
        .map_err(|e| AppError::BadGateway(e.to_string()))?;

    let mut response = HttpResponse::build(status);
    for (name, value) in upstream_res.headers() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let Ok(value) = HeaderValue::from_bytes(value.as_bytes()) {
            response.append_header((name.as_str(), value));
        }
    }

    let bytes = upstream_res
        .bytes()
        .await
        .map_err(|e| AppError::BadGateway(e.to_string()))?;

    Ok(response.body(bytes))
}
