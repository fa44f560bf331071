// src/handlers/account.rs

use axum::{extract::State, Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::CurrentUser;
use crate::error::AppResult;
use crate::models::{EntityKind, OwnerState, WipeResult};
use crate::sync::MAX_PULL_LIMIT;

use super::AppState;

/// GET /v1/sync/state
pub async fn sync_state(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> AppResult<Json<OwnerState>> {
    Ok(Json(state.epochs.state(&user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct WipeRequest {
    #[serde(default)]
    pub confirm: String,
}

/// POST /v1/account/wipe
///
/// 不可逆：要求字面确认口令，见 `EpochController::wipe`。
pub async fn wipe_account(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Json(req): Json<WipeRequest>,
) -> AppResult<Json<WipeResult>> {
    let result = state.epochs.wipe(&user_id, &req.confirm).await?;
    Ok(Json(result))
}

/// GET /v1/sync/info — 服务端能力描述
pub async fn server_info() -> Json<Value> {
    let entities: Value = EntityKind::ALL
        .iter()
        .map(|kind| {
            (
                kind.route().to_string(),
                json!({"maxLimit": MAX_PULL_LIMIT, "push": true, "pull": true}),
            )
        })
        .collect::<serde_json::Map<String, Value>>()
        .into();

    Json(json!({
        "apiVersion": "1.1",
        "serverTime": Utc::now().to_rfc3339(),
        "entities": entities,
        "hints": {
            "recommendedBatch": 500,
            "backoffMsOn429": 1500,
        },
    }))
}
