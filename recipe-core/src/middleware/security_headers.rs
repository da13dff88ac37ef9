use axum::{extract::Request, http::header, middleware::Next, response::IntoResponse};

/// Hardening headers applied to every response. The landing pages are the
/// only HTML the service serves, so one strict policy covers all routes.
pub async fn security_headers_middleware(req: Request, next: Next) -> impl IntoResponse {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        header::HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::X_FRAME_OPTIONS,
        header::HeaderValue::from_static("SAMEORIGIN"),
    );
    headers.insert(
        header::STRICT_TRANSPORT_SECURITY,
        header::HeaderValue::from_static("max-age=15552000; includeSubDomains"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        header::HeaderValue::from_static("no-referrer"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        header::HeaderValue::from_static(
            "default-src 'self'; style-src 'self' 'unsafe-inline'; \
             frame-ancestors 'self'; object-src 'none'",
        ),
    );
    headers.insert(
        "x-dns-prefetch-control",
        header::HeaderValue::from_static("off"),
    );

    response
}
