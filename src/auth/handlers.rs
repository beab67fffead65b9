use std::sync::Arc;

use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection},
        State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware,
    routing::{get, post},
    Form, Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{AccessToken, LoginForm, RegisterRequest, RegisteredUser},
        errors::{AuthError, AuthResult},
        extractors::{require_current_user, CurrentUser},
        repo_types::User,
        services::AuthService,
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/token", post(login))
}

pub fn me_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_me))
        .route_layer(middleware::from_fn_with_state(state, require_current_user))
}

#[instrument(skip_all)]
pub async fn register(
    State(auth): State<Arc<AuthService>>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> AuthResult<(StatusCode, HeaderMap, Json<RegisteredUser>)> {
    let Json(payload) = body.map_err(|e| {
        warn!(error = %e, "malformed register body");
        AuthError::Validation(e.body_text())
    })?;
    let user = auth.register(&payload.email, &payload.password).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/api/v1/users/{}", user.id)) {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(user)))
}

#[instrument(skip_all)]
pub async fn login(
    State(auth): State<Arc<AuthService>>,
    body: Result<Form<LoginForm>, FormRejection>,
) -> AuthResult<Json<AccessToken>> {
    let Form(form) = body.map_err(|e| {
        warn!(error = %e, "malformed login form");
        AuthError::Validation(e.body_text())
    })?;
    let token = auth.login(&form.username, &form.password).await?;
    Ok(Json(token))
}

pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        memory::InMemoryCredentialStore,
        repo::{CredentialStore, StoreError},
    };
    use axum::{body::Body, http::Request};
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<InMemoryCredentialStore>) {
        let store = Arc::new(InMemoryCredentialStore::new());
        let state = AppState::fake(store.clone());
        (crate::auth::router(state.clone()).with_state(state), store)
    }

    async fn body_json(res: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn register_req(email: &str, password: &str) -> Request<Body> {
        Request::post("/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({ "email": email, "password": password }).to_string(),
            ))
            .unwrap()
    }

    fn token_req(username: &str, password: &str) -> Request<Body> {
        Request::post("/token")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!(
                "grant_type=password&username={}&password={}",
                username.replace('@', "%40"),
                password
            )))
            .unwrap()
    }

    fn me_req(token: Option<&str>) -> Request<Body> {
        let mut req = Request::get("/users/me");
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        req.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn register_login_me_scenario() {
        let (app, store) = app();

        let res = app.clone().oneshot(register_req("a@x.com", "secret1")).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let stored = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(
            res.headers()[header::LOCATION],
            format!("/api/v1/users/{}", stored.id).as_str()
        );
        let body = body_json(res).await;
        assert_eq!(body["email"], "a@x.com");
        assert!(body["created_at"].is_string());
        assert!(body.get("password").is_none());
        assert!(body.get("password_hash").is_none());
        assert!(body.get("id").is_none());

        let res = app.clone().oneshot(token_req("a@x.com", "secret1")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["user_id"], stored.id.to_string());
        assert_eq!(body["email"], "a@x.com");
        assert_eq!(body["token_type"], "bearer");
        let token = body["access_token"].as_str().unwrap().to_string();

        let res = app.clone().oneshot(me_req(Some(&token))).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["id"], stored.id.to_string());
        assert_eq!(body["email"], "a@x.com");
        assert!(body["updated_at"].is_null());
        assert!(body.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn duplicate_register_is_conflict() {
        let (app, _) = app();
        let res = app.clone().oneshot(register_req("a@x.com", "secret1")).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let res = app.oneshot(register_req("a@x.com", "secret1")).await.unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn short_password_is_bad_request() {
        let (app, _) = app();
        let res = app.oneshot(register_req("a@x.com", "123")).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn register_without_password_is_json_bad_request() {
        let (app, store) = app();
        let req = Request::post("/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"email":"a@x.com"}"#))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "application/json");
        let body = body_json(res).await;
        assert_eq!(body["code"], 400);
        assert!(body["error"].as_str().unwrap().contains("password"));
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn register_with_wrong_content_type_is_bad_request() {
        let (app, _) = app();
        let req = Request::post("/register")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("email=a@x.com"))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["code"], 400);
    }

    #[tokio::test]
    async fn token_without_password_is_json_bad_request() {
        let (app, _) = app();
        let req = Request::post("/token")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("username=a%40x.com"))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "application/json");
        let body = body_json(res).await;
        assert_eq!(body["code"], 400);
        assert!(body["error"].as_str().unwrap().contains("password"));
    }

    #[tokio::test]
    async fn bad_credentials_are_unauthorized() {
        let (app, _) = app();
        app.clone().oneshot(register_req("a@x.com", "secret1")).await.unwrap();

        let wrong = app.clone().oneshot(token_req("a@x.com", "nope123")).await.unwrap();
        let unknown = app.oneshot(token_req("b@x.com", "secret1")).await.unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(wrong).await, body_json(unknown).await);
    }

    #[tokio::test]
    async fn me_without_token_challenges_bearer() {
        let (app, _) = app();
        let res = app.clone().oneshot(me_req(None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(res.headers()[header::WWW_AUTHENTICATE], "Bearer");

        let res = app.oneshot(me_req(Some("garbage"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(res.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }

    struct DownStore;

    #[async_trait::async_trait]
    impl CredentialStore for DownStore {
        async fn create(
            &self,
            _: &str,
            _: &str,
            _: time::OffsetDateTime,
        ) -> Result<User, StoreError> {
            Err(StoreError::Unavailable(anyhow::anyhow!("connection refused")))
        }
        async fn find_by_email(&self, _: &str) -> Result<Option<User>, StoreError> {
            Err(StoreError::Unavailable(anyhow::anyhow!("connection refused")))
        }
    }

    #[tokio::test]
    async fn me_during_store_outage_is_server_error() {
        let state = AppState::fake(Arc::new(DownStore));
        let token = state.auth.keys().issue("a@x.com").unwrap();
        let app = crate::auth::router(state.clone()).with_state(state);

        let res = app.oneshot(me_req(Some(&token))).await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(res.headers().get(header::WWW_AUTHENTICATE).is_none());
        let body = body_json(res).await;
        assert!(!body["error"].as_str().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn me_rejects_token_for_deleted_user() {
        let (app, store) = app();
        app.clone().oneshot(register_req("a@x.com", "secret1")).await.unwrap();
        let res = app.clone().oneshot(token_req("a@x.com", "secret1")).await.unwrap();
        let token = body_json(res).await["access_token"]
            .as_str()
            .unwrap()
            .to_string();

        store.remove("a@x.com").unwrap();
        let res = app.oneshot(me_req(Some(&token))).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
