use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    Json, Router,
    extract::{FromRef, Path, State},
    http::{self, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post},
};
use platform_api::ApiResult;
use platform_db::DbPool;
use products_crm::{
    Deal, NewDeal, PipelineEngine, RevenueForecast, StageAction, StageHistoryEntry, StageInfo,
    WinLossReport, pipeline_stages,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{AuthConfig, AuthenticatedCaller, authenticate},
    graphql::SchemaType,
};

#[derive(Clone)]
pub struct AppState {
    pub engine: PipelineEngine,
    pub schema: SchemaType,
    pub auth: Arc<AuthConfig>,
    pub cors_allowed_origins: Arc<Vec<String>>,
    /// `None` when running on the in-memory store.
    pub pool: Option<DbPool>,
}

impl FromRef<AppState> for Arc<AuthConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

#[derive(Clone, Debug)]
pub struct ServeConfig {
    addr: SocketAddr,
}

impl ServeConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::from((host, port)),
        }
    }
}

pub async fn serve(config: ServeConfig, state: AppState) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    info!(%config.addr, "pipeline server listening");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    let layer = CorsLayer::new()
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PATCH]);
    // Credentials cannot be combined with a wildcard origin.
    if allowed.is_empty() {
        layer.allow_origin(AllowOrigin::any())
    } else {
        layer
            .allow_credentials(true)
            .allow_origin(AllowOrigin::list(allowed))
    }
}

pub fn build_router(state: AppState) -> Router {
    let request_id = MakeRequestUuid;
    let header_name = HeaderName::from_static("x-request-id");
    let cors = cors_layer(&state.cors_allowed_origins);
    Router::new()
        .route("/health", get(health_handler))
        .route("/pipeline/stages", get(stages_handler))
        .route("/deals", post(open_deal_handler).get(list_deals_handler))
        .route("/deals/analysis", get(analysis_handler))
        .route("/deals/forecast", get(forecast_handler))
        .route("/deals/{id}", get(get_deal_handler))
        .route("/deals/{id}/stage", patch(move_stage_handler))
        .route("/deals/{id}/history", get(history_handler))
        .route("/graphql", post(graphql_handler))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(header_name.clone(), request_id))
                .layer(PropagateRequestIdLayer::new(header_name))
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Body of `PATCH /deals/{id}/stage`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StageRequest {
    action: String,
    #[serde(default)]
    lost_reason: Option<String>,
}

async fn open_deal_handler(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Json(input): Json<NewDeal>,
) -> ApiResult<(StatusCode, Json<Deal>)> {
    let deal = state.engine.open_deal(caller, input).await?;
    Ok((StatusCode::CREATED, Json(deal)))
}

async fn list_deals_handler(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> ApiResult<Json<Vec<Deal>>> {
    Ok(Json(state.engine.list_deals(caller).await?))
}

async fn get_deal_handler(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Deal>> {
    Ok(Json(state.engine.get_deal(caller, id).await?))
}

async fn move_stage_handler(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(id): Path<Uuid>,
    Json(body): Json<StageRequest>,
) -> ApiResult<Json<Deal>> {
    let action = StageAction::parse(&body.action, body.lost_reason)?;
    Ok(Json(state.engine.apply_action(caller, id, action).await?))
}

async fn history_handler(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<StageHistoryEntry>>> {
    Ok(Json(state.engine.stage_history(caller, id).await?))
}

async fn analysis_handler(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> ApiResult<Json<WinLossReport>> {
    Ok(Json(state.engine.win_loss_analysis(caller).await?))
}

async fn forecast_handler(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> ApiResult<Json<RevenueForecast>> {
    Ok(Json(state.engine.revenue_forecast(caller).await?))
}

async fn stages_handler() -> Json<Vec<StageInfo>> {
    Json(pipeline_stages())
}

async fn graphql_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: GraphQLRequest,
) -> GraphQLResponse {
    let mut req = request.into_inner();
    // Anonymous requests still reach public fields like `pipelineStages`.
    if let Some(caller) = authenticate(&state.auth, &headers) {
        req = req.data(caller);
    }
    state.schema.execute(req).await.into()
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (db_ok, store) = match &state.pool {
        Some(pool) => {
            let ok = match pool.ping().await {
                Ok(()) => true,
                Err(err) => {
                    warn!(error = %err, "database ping failed");
                    false
                }
            };
            (ok, "database")
        }
        None => (true, "memory"),
    };
    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            ok: db_ok,
            db_ok,
            store,
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    ok: bool,
    db_ok: bool,
    store: &'static str,
    version: &'static str,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for CTRL+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    ctrl_c.await;

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    };
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, header};
    use http_body_util::BodyExt;
    use products_crm::MemoryDealStore;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::issue_token;
    use crate::graphql::build_schema;

    fn test_state() -> AppState {
        let engine = PipelineEngine::new(Arc::new(MemoryDealStore::new()));
        AppState {
            schema: build_schema(engine.clone()),
            engine,
            auth: Arc::new(AuthConfig {
                jwt_secret: "router-tests-secret-of-sufficient-length".into(),
                session_ttl_minutes: 30,
            }),
            cors_allowed_origins: Arc::new(vec!["http://localhost:5173".into()]),
            pool: None,
        }
    }

    fn bearer(state: &AppState, user: Uuid) -> String {
        format!("Bearer {}", issue_token(user, &state.auth).unwrap())
    }

    async fn send(
        router: &Router,
        method: Method,
        uri: &str,
        auth: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn open(router: &Router, auth: &str, stage: &str, value_cents: i64) -> String {
        let (status, body) = send(
            router,
            Method::POST,
            "/deals",
            Some(auth),
            Some(json!({
                "title": "Warehouse rollout",
                "valueCents": value_cents,
                "currency": "usd",
                "stage": stage
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "body: {body}");
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_reports_memory_store() {
        let router = build_router(test_state());
        let (status, body) = send(&router, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["store"], "memory");
    }

    #[tokio::test]
    async fn deal_routes_require_a_session() {
        let router = build_router(test_state());
        let (status, body) = send(&router, Method::GET, "/deals/forecast", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");

        let (status, _) = send(
            &router,
            Method::PATCH,
            &format!("/deals/{}/stage", Uuid::new_v4()),
            Some("Bearer not-a-token"),
            Some(json!({ "action": "next" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn stage_endpoint_walks_a_deal_to_won() {
        let state = test_state();
        let auth = bearer(&state, Uuid::new_v4());
        let router = build_router(state);
        let id = open(&router, &auth, "QUALIFIED", 40_000).await;
        let uri = format!("/deals/{id}/stage");

        let (status, body) = send(
            &router,
            Method::PATCH,
            &uri,
            Some(&auth),
            Some(json!({ "action": "next" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stage"], "PROPOSAL");
        assert_eq!(body["currency"], "USD");

        let (status, body) = send(
            &router,
            Method::PATCH,
            &uri,
            Some(&auth),
            Some(json!({ "action": "won" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "WON");
        assert!(body["closedAt"].is_string());

        let (status, body) = send(
            &router,
            Method::PATCH,
            &uri,
            Some(&auth),
            Some(json!({ "action": "lost" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_STATE");

        let (status, body) = send(
            &router,
            Method::GET,
            &format!("/deals/{id}/history"),
            Some(&auth),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn lost_without_reason_records_default() {
        let state = test_state();
        let auth = bearer(&state, Uuid::new_v4());
        let router = build_router(state);
        let id = open(&router, &auth, "LEAD", 1_000).await;

        let (status, body) = send(
            &router,
            Method::PATCH,
            &format!("/deals/{id}/stage"),
            Some(&auth),
            Some(json!({ "action": "lost", "lostReason": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "LOST");
        assert_eq!(body["lostReason"], "No reason provided");
    }

    #[tokio::test]
    async fn unknown_action_is_a_bad_request() {
        let state = test_state();
        let auth = bearer(&state, Uuid::new_v4());
        let router = build_router(state);
        let id = open(&router, &auth, "LEAD", 1_000).await;

        let (status, body) = send(
            &router,
            Method::PATCH,
            &format!("/deals/{id}/stage"),
            Some(&auth),
            Some(json!({ "action": "reopen" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_STATE");
    }

    #[tokio::test]
    async fn missing_and_foreign_deals_are_rejected() {
        let state = test_state();
        let owner = bearer(&state, Uuid::new_v4());
        let stranger = bearer(&state, Uuid::new_v4());
        let router = build_router(state);
        let id = open(&router, &owner, "LEAD", 1_000).await;

        let (status, body) = send(
            &router,
            Method::GET,
            &format!("/deals/{}", Uuid::new_v4()),
            Some(&owner),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");

        let (status, _) = send(
            &router,
            Method::PATCH,
            &format!("/deals/{id}/stage"),
            Some(&stranger),
            Some(json!({ "action": "won" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn analysis_and_forecast_reflect_closed_and_open_deals() {
        let state = test_state();
        let auth = bearer(&state, Uuid::new_v4());
        let router = build_router(state);

        let won = open(&router, &auth, "NEGOTIATION", 30_000).await;
        let lost = open(&router, &auth, "LEAD", 10_000).await;
        open(&router, &auth, "PROPOSAL", 20_000).await;
        open(&router, &auth, "LEAD", 5_000).await;

        for (id, action) in [(&won, "won"), (&lost, "lost")] {
            let (status, _) = send(
                &router,
                Method::PATCH,
                &format!("/deals/{id}/stage"),
                Some(&auth),
                Some(json!({ "action": action })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, analysis) =
            send(&router, Method::GET, "/deals/analysis", Some(&auth), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(analysis["wonCount"], 1);
        assert_eq!(analysis["lostCount"], 1);
        assert_eq!(analysis["wonValueCents"], 30_000);
        assert_eq!(analysis["winRate"], 0.5);

        let (status, forecast) =
            send(&router, Method::GET, "/deals/forecast", Some(&auth), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(forecast["openDealCount"], 2);
        assert_eq!(forecast["pipelineTotalCents"], 25_000);
        // 20_000 * 50% + 5_000 * 10%
        assert_eq!(forecast["weightedTotalCents"], 10_500);
    }

    #[tokio::test]
    async fn graphql_reads_bearer_session() {
        let state = test_state();
        let auth = bearer(&state, Uuid::new_v4());
        let router = build_router(state);
        open(&router, &auth, "LEAD", 2_500).await;

        let (status, body) = send(
            &router,
            Method::POST,
            "/graphql",
            Some(&auth),
            Some(json!({ "query": "{ deals { title stage } }" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["deals"][0]["stage"], "LEAD");
    }
}
