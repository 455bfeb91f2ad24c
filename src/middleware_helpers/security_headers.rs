use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

/// Sent on every response, docs UI included
const BASELINE: [(&str, &str); 3] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
];

/// Only on JSON API responses; the docs UI loads its own scripts and styles
const API_ONLY: [(&str, &str); 1] = [(
    "content-security-policy",
    "default-src 'none'; frame-ancestors 'none'",
)];

fn is_docs_path(path: &str) -> bool {
    path.starts_with("/swagger-ui") || path.starts_with("/api-docs")
}

/// Adds browser hardening headers to responses
pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let docs = is_docs_path(req.uri().path());
    let mut res = next.run(req).await;
    let headers = res.headers_mut();

    let extra: &[(&str, &str)] = if docs { &[] } else { &API_ONLY };
    for (name, value) in BASELINE.iter().chain(extra) {
        headers.insert(HeaderName::from_static(*name), HeaderValue::from_static(*value));
    }

    // Responses carrying session data must not sit in shared caches
    if !docs && !headers.contains_key(header::CACHE_CONTROL) {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    }

    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::get, Router};
    use tower::ServiceExt;

    async fn ok() -> &'static str {
        "ok"
    }

    fn app() -> Router {
        Router::new()
            .route("/api/products", get(ok))
            .route("/swagger-ui/index.html", get(ok))
            .layer(axum::middleware::from_fn(security_headers_middleware))
    }

    async fn headers_for(uri: &str) -> axum::http::HeaderMap {
        app()
            .oneshot(
                axum::http::Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
            .headers()
            .clone()
    }

    #[tokio::test]
    async fn api_responses_are_hardened() {
        let headers = headers_for("/api/products").await;
        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
        assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
        assert_eq!(headers.get("cache-control").unwrap(), "no-store");
        assert!(headers.contains_key("content-security-policy"));
    }

    #[tokio::test]
    async fn docs_ui_skips_content_security_policy() {
        let headers = headers_for("/swagger-ui/index.html").await;
        assert!(!headers.contains_key("content-security-policy"));
        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    }
}
