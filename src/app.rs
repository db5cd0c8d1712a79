use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth, config::AppConfig, expenses, state::AppState};

pub fn build_app(state: AppState) -> anyhow::Result<Router> {
    let cors = cors_layer(&state.config)?;
    Ok(Router::new()
        .route("/", get(|| async { "API is running..." }))
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(expenses::router()),
        )
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        ))
}

/// The frontend sends the session cookie, so the origin must be explicit.
fn cors_layer(config: &AppConfig) -> anyhow::Result<CorsLayer> {
    let origin: HeaderValue = config
        .cors_origin
        .parse()
        .context("CORS_ORIGIN is not a valid header value")?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]))
}

pub async fn serve(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid listen address")?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fake_state;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    fn post_json(uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(c) = cookie {
            builder = builder.header(header::COOKIE, c);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn request(method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(c) = cookie {
            builder = builder.header(header::COOKIE, c);
        }
        match body {
            Some(b) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(res: Response) -> Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn set_cookie(res: &Response) -> String {
        res.headers()
            .get(header::SET_COOKIE)
            .expect("set-cookie header")
            .to_str()
            .unwrap()
            .to_string()
    }

    /// Register and log in, returning the `token=...` pair for the Cookie header.
    async fn login_as(app: &Router, email: &str) -> String {
        let res = send(
            app,
            post_json(
                "/api/auth/register",
                json!({ "firstName": "Test", "lastName": "User", "email": email, "password": "secret1" }),
                None,
            ),
        )
        .await;
        assert_eq!(res.status(), StatusCode::CREATED);

        let res = send(
            app,
            post_json(
                "/api/auth/login",
                json!({ "email": email, "password": "secret1" }),
                None,
            ),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let cookie = set_cookie(&res);
        cookie.split(';').next().unwrap().to_string()
    }

    fn app() -> Router {
        let (state, _) = fake_state();
        build_app(state).unwrap()
    }

    #[tokio::test]
    async fn liveness() {
        let res = send(&app(), request("GET", "/", None, None)).await;
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"API is running...");
    }

    #[tokio::test]
    async fn register_twice_is_rejected() {
        let app = app();
        let body = json!({ "firstName": "A", "lastName": "B", "email": "a@b.io", "password": "secret1" });
        let res = send(&app, post_json("/api/auth/register", body.clone(), None)).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(json_body(res).await["message"], "User registered successfully");

        let res = send(&app, post_json("/api/auth/register", body, None)).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["message"], "User already exists");
    }

    #[tokio::test]
    async fn register_validation_lists_fields() {
        let res = send(
            &app(),
            post_json("/api/auth/register", json!({ "email": "bad", "password": "123" }), None),
        )
        .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = json_body(res).await;
        let fields: Vec<&str> = body["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, vec!["firstName", "lastName", "email", "password"]);
    }

    #[tokio::test]
    async fn malformed_json_is_a_validation_error() {
        let req = Request::builder()
            .method("POST")
            .uri("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let res = send(&app(), req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["errors"][0]["field"], "body");
    }

    #[tokio::test]
    async fn login_sets_http_only_cookie_and_bad_login_is_generic() {
        let app = app();
        let cookie = login_as(&app, "c@d.io").await;
        assert!(cookie.starts_with("token="));

        let wrong = send(
            &app,
            post_json("/api/auth/login", json!({ "email": "c@d.io", "password": "wrong!" }), None),
        )
        .await;
        let unknown = send(
            &app,
            post_json("/api/auth/login", json!({ "email": "x@d.io", "password": "secret1" }), None),
        )
        .await;
        assert_eq!(wrong.status(), StatusCode::BAD_REQUEST);
        assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
        assert!(wrong.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(json_body(wrong).await, json_body(unknown).await);
    }

    #[tokio::test]
    async fn protected_routes_need_a_valid_cookie() {
        let app = app();
        let res = send(&app, request("GET", "/api/expenses", None, None)).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            json_body(res).await["message"],
            "Unauthorized - No token provided"
        );

        let res = send(&app, request("GET", "/api/expenses", Some("token=forged.jwt.value"), None)).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(res).await["message"], "Unauthorized - Invalid token");
    }

    #[tokio::test]
    async fn expense_lifecycle_over_http() {
        let app = app();
        let cookie = login_as(&app, "e@f.io").await;

        let res = send(
            &app,
            post_json(
                "/api/expenses",
                json!({ "amount": 12.5, "category": "food", "date": "2024-06-01", "description": "tacos" }),
                Some(&cookie),
            ),
        )
        .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let created = json_body(res).await;
        assert_eq!(created["amount"], 12.5);
        assert_eq!(created["date"], "2024-06-01");
        let id = created["id"].as_str().unwrap().to_string();

        let res = send(&app, request("GET", "/api/expenses?category=food", Some(&cookie), None)).await;
        assert_eq!(res.status(), StatusCode::OK);
        let listed = json_body(res).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0], created);

        let res = send(
            &app,
            request(
                "PUT",
                &format!("/api/expenses/{id}"),
                Some(&cookie),
                Some(json!({ "category": "dining" })),
            ),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let updated = json_body(res).await;
        assert_eq!(updated["category"], "dining");
        assert_eq!(updated["description"], "tacos");

        let res = send(&app, request("DELETE", &format!("/api/expenses/{id}"), Some(&cookie), None)).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json_body(res).await["message"], "Expense deleted successfully");

        let res = send(&app, request("DELETE", &format!("/api/expenses/{id}"), Some(&cookie), None)).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn other_users_get_forbidden() {
        let app = app();
        let owner = login_as(&app, "owner@x.io").await;
        let other = login_as(&app, "other@x.io").await;

        let res = send(
            &app,
            post_json(
                "/api/expenses",
                json!({ "amount": 3, "category": "misc", "date": "2024-06-01" }),
                Some(&owner),
            ),
        )
        .await;
        let id = json_body(res).await["id"].as_str().unwrap().to_string();

        let res = send(
            &app,
            request("PUT", &format!("/api/expenses/{id}"), Some(&other), Some(json!({ "amount": 1 }))),
        )
        .await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = send(&app, request("DELETE", &format!("/api/expenses/{id}"), Some(&other), None)).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = send(&app, request("GET", "/api/expenses", Some(&other), None)).await;
        assert_eq!(json_body(res).await, json!([]));
    }

    #[tokio::test]
    async fn logout_clears_cookie_but_does_not_revoke_token() {
        let app = app();
        let cookie = login_as(&app, "g@h.io").await;

        let res = send(&app, post_json("/api/auth/logout", json!({}), Some(&cookie))).await;
        assert_eq!(res.status(), StatusCode::OK);
        let cleared = set_cookie(&res);
        assert!(cleared.starts_with("token=;"));
        assert!(cleared.contains("Max-Age=0"));

        // The browser now sends the cleared value.
        let res = send(&app, request("GET", "/api/expenses", Some("token="), None)).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        // A copy taken before logout keeps working until it expires.
        let res = send(&app, request("GET", "/api/expenses", Some(&cookie), None)).await;
        assert_eq!(res.status(), StatusCode::OK);
    }
}
