use axum::{
    extract::{Path, State},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::info;

use crate::{auth::require_auth, AppState, ApiError};

pub fn bots_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/bots", get(list_bots))
        .route("/api/bots/:id/start", post(start_bot))
        .route("/api/bots/:id/stop", post(stop_bot))
        .route("/api/bots/:id/status", get(bot_status))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

async fn list_bots(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "running": state.controller.running_accounts().await }))
}

async fn start_bot(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let credentials = state
        .store
        .get_account(&account_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("unknown account {account_id}")))?;

    info!(account = %account_id, network = %credentials.network, "Start requested");
    let report = state.controller.start(&account_id, &credentials).await?;
    Ok(Json(json!({ "ok": true, "start": report })))
}

async fn stop_bot(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    info!(account = %account_id, "Stop requested");
    let report = state.controller.stop(&account_id).await?;
    Ok(Json(json!({ "ok": true, "stop": report })))
}

async fn bot_status(State(state): State<AppState>, Path(account_id): Path<String>) -> Json<Value> {
    let status = state.controller.status(&account_id).await;
    Json(json!({ "account_id": account_id, "status": status }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use common::{Credentials, ExchangeClient, Network, TradingMode};
    use engine::{BotConfigFile, BotController, Connector};
    use paper::PaperExchange;
    use store::MemoryStore;

    use crate::{app, AppState};

    const TOKEN: &str = "test-token";

    async fn state(balance: f64) -> AppState {
        let exchange = Arc::new(PaperExchange::new(balance, 0.0));
        let store = Arc::new(MemoryStore::new());
        store
            .add_account("acct-1", Credentials::new("k", "s", Network::Testnet))
            .await;

        let connector: Connector =
            Arc::new(move |_: &Credentials| Ok(exchange.clone() as Arc<dyn ExchangeClient>));
        let mut config = BotConfigFile::default();
        config.bot.poll_interval_secs = 3_600;
        config.bot.stop_grace_secs = 2;

        AppState {
            controller: Arc::new(BotController::new(config, store.clone(), connector)),
            store,
            trading_mode: TradingMode::Paper,
            api_token: TOKEN.into(),
        }
    }

    fn request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn bot_routes_require_bearer_token() {
        let app = app(state(1_000.0).await);

        let missing = app
            .clone()
            .oneshot(request("GET", "/api/bots", None))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = app
            .clone()
            .oneshot(request("GET", "/api/bots", Some("nope")))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let health = app.oneshot(request("GET", "/healthz", None)).await.unwrap();
        assert_eq!(health.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn start_status_stop_round() {
        let state = state(1_000.0).await;
        let app = app(state.clone());

        let started = app
            .clone()
            .oneshot(request("POST", "/api/bots/acct-1/start", Some(TOKEN)))
            .await
            .unwrap();
        assert_eq!(started.status(), StatusCode::OK);
        let body = json_body(started).await;
        assert_eq!(body["start"]["balance"], 1_000.0);

        let status = app
            .clone()
            .oneshot(request("GET", "/api/bots/acct-1/status", Some(TOKEN)))
            .await
            .unwrap();
        let body = json_body(status).await;
        assert_eq!(body["status"]["running"], true);
        assert_eq!(body["status"]["state"], "running");

        let again = app
            .clone()
            .oneshot(request("POST", "/api/bots/acct-1/start", Some(TOKEN)))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::CONFLICT);

        let stopped = app
            .oneshot(request("POST", "/api/bots/acct-1/stop", Some(TOKEN)))
            .await
            .unwrap();
        assert_eq!(stopped.status(), StatusCode::OK);
        assert_eq!(json_body(stopped).await["stop"]["was_running"], true);
        assert!(state.controller.running_accounts().await.is_empty());
    }

    #[tokio::test]
    async fn start_failures_carry_kind_and_message() {
        let app = app(state(5.0).await);

        let low = app
            .clone()
            .oneshot(request("POST", "/api/bots/acct-1/start", Some(TOKEN)))
            .await
            .unwrap();
        assert_eq!(low.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(low).await;
        assert_eq!(body["kind"], "policy");
        assert!(body["error"].as_str().unwrap().contains("balance below minimum"));

        let unknown = app
            .oneshot(request("POST", "/api/bots/ghost/start", Some(TOKEN)))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }
}
