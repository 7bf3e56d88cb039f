//! Route handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use strata_core::{OwnerId, ProfileId, SessionId};
use strata_kg::{NewEntity, NewRelationship};
use strata_runtime::TurnRequest;

use crate::error::ApiError;
use crate::state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/turn", post(run_turn))
        .route("/profiles/{id}/activate", post(activate_profile))
        .route("/profiles/{id}/classification", get(get_classification))
        .route("/consumption/check", post(check_consumption))
        .route(
            "/kg/{profile}/entities",
            get(list_entities).post(create_entity),
        )
        .route("/kg/{profile}/entities/{id}", axum::routing::delete(delete_entity))
        .route(
            "/kg/{profile}/relationships",
            get(list_relationships).post(create_relationship),
        )
        .route(
            "/kg/{profile}/relationships/{id}",
            axum::routing::delete(delete_relationship),
        )
        .route("/kg/{profile}/search", post(search_kg))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// The authenticated owner id, placed by the fronting auth layer.
fn owner_from(headers: &HeaderMap) -> Result<OwnerId, ApiError> {
    let raw = headers
        .get("x-owner-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::new(strata_core::ErrorKind::Auth, "missing x-owner-id"))?;
    OwnerId::parse(raw).map_err(|_| ApiError::validation("x-owner-id is not a UUID"))
}

#[derive(Debug, Deserialize)]
struct TurnBody {
    session_id: Option<SessionId>,
    profile_id: ProfileId,
    message: String,
    #[serde(default)]
    attachments: Vec<String>,
}

/// `POST /turn`: SSE stream of conversation events.
async fn run_turn(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<TurnBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>, ApiError> {
    let owner_id = owner_from(&headers)?;

    let handle = state
        .orchestrator
        .start_turn(TurnRequest {
            owner_id,
            session_id: body.session_id,
            profile_id: body.profile_id,
            message: body.message,
            attachments: body.attachments,
            multimodal_parts: Vec::new(),
            cancel: CancellationToken::new(),
        })
        .await
        .map_err(ApiError::from)?;

    let stream = ReceiverStream::new(handle.events.into_inner()).map(|event| {
        let sse = Event::default().event(event.event_type());
        Ok(match sse.json_data(&event) {
            Ok(sse) => sse,
            Err(_) => Event::default().event("error").data("serialization failure"),
        })
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Serialize)]
struct ActivationResponse {
    profile_id: ProfileId,
    classification_mode: String,
    classification_cache_hit: bool,
    kind: String,
}

/// `POST /profiles/{id}/activate`: synchronous activation.
async fn activate_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<ProfileId>,
) -> Result<Json<ActivationResponse>, ApiError> {
    let owner_id = owner_from(&headers)?;
    let context = state
        .switcher
        .activate(owner_id, id, true)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(ActivationResponse {
        profile_id: context.profile.id,
        classification_mode: context.profile.classification_mode.to_string(),
        classification_cache_hit: context.classification_cache_hit,
        kind: context.profile.kind.to_string(),
    }))
}

/// `GET /profiles/{id}/classification`: cached classification, which
/// may be empty when no pass has run.
async fn get_classification(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<ProfileId>,
) -> Result<Json<Value>, ApiError> {
    let owner_id = owner_from(&headers)?;
    let profile = state
        .registry
        .get_profile(owner_id, id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::not_found(format!("profile {id}")))?;
    let cached = profile
        .cached_classification
        .map(|c| serde_json::to_value(c).unwrap_or(Value::Null))
        .unwrap_or(Value::Null);
    Ok(Json(cached))
}

/// `POST /consumption/check`: remaining budgets.
async fn check_consumption(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let owner_id = owner_from(&headers)?;
    let consumption = state.consumption.clone();
    let summary = tokio::task::spawn_blocking(move || consumption.summary(owner_id))
        .await
        .map_err(|e| ApiError::new(strata_core::ErrorKind::Internal, e.to_string()))?
        .map_err(ApiError::from)?;

    Ok(Json(serde_json::json!({
        "period": summary.current_period,
        "remaining_this_hour": summary.remaining_this_hour,
        "remaining_today": summary.remaining_today,
        "input_tokens_used": summary.total_input_tokens,
        "input_tokens_limit": summary.input_tokens_limit,
        "output_tokens_used": summary.total_output_tokens,
        "output_tokens_limit": summary.output_tokens_limit,
        "estimated_cost_micro_usd": summary.estimated_cost_micro_usd,
    })))
}

/// `GET /kg/{profile}/entities`
async fn list_entities(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(profile): Path<ProfileId>,
) -> Result<Json<Value>, ApiError> {
    let owner_id = owner_from(&headers)?;
    let kg = state.kg.clone();
    let entities =
        tokio::task::spawn_blocking(move || kg.list_entities(owner_id, profile, None, 200))
            .await
            .map_err(|e| ApiError::new(strata_core::ErrorKind::Internal, e.to_string()))?
            .map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "entities": entities })))
}

/// `POST /kg/{profile}/entities`
async fn create_entity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(profile): Path<ProfileId>,
    Json(entity): Json<NewEntity>,
) -> Result<Json<Value>, ApiError> {
    let owner_id = owner_from(&headers)?;
    let kg = state.kg.clone();
    let created = tokio::task::spawn_blocking(move || kg.add_entity(owner_id, profile, &entity))
        .await
        .map_err(|e| ApiError::new(strata_core::ErrorKind::Internal, e.to_string()))?
        .map_err(ApiError::from)?;
    Ok(Json(serde_json::to_value(created).unwrap_or(Value::Null)))
}

/// `DELETE /kg/{profile}/entities/{id}`
async fn delete_entity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((profile, id)): Path<(ProfileId, i64)>,
) -> Result<Json<Value>, ApiError> {
    let owner_id = owner_from(&headers)?;
    let kg = state.kg.clone();
    let deleted = tokio::task::spawn_blocking(move || kg.delete_entity(owner_id, profile, id))
        .await
        .map_err(|e| ApiError::new(strata_core::ErrorKind::Internal, e.to_string()))?
        .map_err(ApiError::from)?;
    if !deleted {
        return Err(ApiError::not_found(format!("entity {id}")));
    }
    Ok(Json(serde_json::json!({"deleted": true})))
}

/// `GET /kg/{profile}/relationships`
async fn list_relationships(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(profile): Path<ProfileId>,
) -> Result<Json<Value>, ApiError> {
    let owner_id = owner_from(&headers)?;
    let kg = state.kg.clone();
    let relationships =
        tokio::task::spawn_blocking(move || kg.list_relationships(owner_id, profile, None))
            .await
            .map_err(|e| ApiError::new(strata_core::ErrorKind::Internal, e.to_string()))?
            .map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "relationships": relationships })))
}

/// `POST /kg/{profile}/relationships`
async fn create_relationship(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(profile): Path<ProfileId>,
    Json(rel): Json<NewRelationship>,
) -> Result<Json<Value>, ApiError> {
    let owner_id = owner_from(&headers)?;
    let kg = state.kg.clone();
    let created =
        tokio::task::spawn_blocking(move || kg.add_relationship(owner_id, profile, &rel))
            .await
            .map_err(|e| ApiError::new(strata_core::ErrorKind::Internal, e.to_string()))?
            .map_err(ApiError::from)?;
    Ok(Json(serde_json::to_value(created).unwrap_or(Value::Null)))
}

/// `DELETE /kg/{profile}/relationships/{id}`
async fn delete_relationship(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((profile, id)): Path<(ProfileId, i64)>,
) -> Result<Json<Value>, ApiError> {
    let owner_id = owner_from(&headers)?;
    let kg = state.kg.clone();
    let deleted =
        tokio::task::spawn_blocking(move || kg.delete_relationship(owner_id, profile, id))
            .await
            .map_err(|e| ApiError::new(strata_core::ErrorKind::Internal, e.to_string()))?
            .map_err(ApiError::from)?;
    if !deleted {
        return Err(ApiError::not_found(format!("relationship {id}")));
    }
    Ok(Json(serde_json::json!({"deleted": true})))
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    query: String,
    #[serde(default = "default_search_max_nodes")]
    max_nodes: usize,
}

fn default_search_max_nodes() -> usize {
    50
}

/// `POST /kg/{profile}/search`: subgraph context text for a query.
async fn search_kg(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(profile): Path<ProfileId>,
    Json(body): Json<SearchBody>,
) -> Result<Json<Value>, ApiError> {
    let owner_id = owner_from(&headers)?;
    let kg = state.kg.clone();
    let text = tokio::task::spawn_blocking(move || {
        let mut seeds = Vec::new();
        for word in body.query.split_whitespace() {
            let term = word.trim_matches(|c: char| !c.is_alphanumeric());
            if term.len() < 3 {
                continue;
            }
            seeds.extend(
                kg.search_entities(owner_id, profile, term, 5)?
                    .into_iter()
                    .map(|e| e.id),
            );
        }
        seeds.sort_unstable();
        seeds.dedup();
        kg.planner_context(owner_id, profile, &seeds, Some(&seeds), body.max_nodes)
    })
    .await
    .map_err(|e| ApiError::new(strata_core::ErrorKind::Internal, e.to_string()))?
    .map_err(ApiError::from)?;

    Ok(Json(serde_json::json!({ "context": text })))
}
