use serde_json::Value;
use std::time::Duration;
use tauri::Emitter;

use crate::data_helpers::{
    configured_page_size, facet_matches, paginate, sort_newest_first, text_matches, FILTER_ALL,
};
use crate::{db, loyalty, value_i64, value_str};

/// Artificial delay on redemption so the storefront's progress state is
/// visible; the underlying write is instant.
const REDEMPTION_LATENCY_MS: u64 = 2_000;

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

#[tauri::command]
pub async fn loyalty_get_profile(
    db: tauri::State<'_, db::DbState>,
    profile_id: String,
) -> Result<Value, String> {
    loyalty::get_profile(&db, &profile_id)
}

#[tauri::command]
pub async fn loyalty_get_profiles(db: tauri::State<'_, db::DbState>) -> Result<Value, String> {
    Ok(Value::Array(loyalty::list_profiles(&db)?))
}

#[tauri::command]
pub async fn loyalty_create_profile(
    db: tauri::State<'_, db::DbState>,
    payload: Value,
) -> Result<Value, String> {
    loyalty::create_profile(&db, &payload)
}

/// Manual point adjustment from the back office (positive or negative).
#[tauri::command]
pub async fn loyalty_adjust_points(
    app: tauri::AppHandle,
    db: tauri::State<'_, db::DbState>,
    profile_id: String,
    delta: i64,
) -> Result<Value, String> {
    let profile = loyalty::award_points(&db, &profile_id, delta)?;
    let _ = app.emit("loyalty_updated", profile.clone());
    Ok(profile)
}

// ---------------------------------------------------------------------------
// Rewards catalog
// ---------------------------------------------------------------------------

#[tauri::command]
pub async fn rewards_get_all(
    db: tauri::State<'_, db::DbState>,
    arg0: Option<Value>,
) -> Result<Value, String> {
    let include_unavailable = arg0
        .as_ref()
        .and_then(|v| v.get("includeUnavailable"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Ok(Value::Array(loyalty::list_rewards(&db, include_unavailable)?))
}

#[tauri::command]
pub async fn reward_create(
    db: tauri::State<'_, db::DbState>,
    payload: Value,
) -> Result<Value, String> {
    loyalty::create_reward(&db, &payload)
}

#[tauri::command]
pub async fn reward_update(
    db: tauri::State<'_, db::DbState>,
    reward_id: String,
    payload: Value,
) -> Result<Value, String> {
    loyalty::update_reward(&db, &reward_id, &payload)
}

#[tauri::command]
pub async fn reward_delete(
    db: tauri::State<'_, db::DbState>,
    reward_id: String,
) -> Result<Value, String> {
    loyalty::delete_reward(&db, &reward_id)
}

// ---------------------------------------------------------------------------
// Redemptions
// ---------------------------------------------------------------------------

/// Storefront redemption request. Points are deducted up front and the
/// record lands `pending` for staff fulfilment.
#[tauri::command]
pub async fn redemption_redeem(
    app: tauri::AppHandle,
    db: tauri::State<'_, db::DbState>,
    profile_id: String,
    reward_id: String,
) -> Result<Value, String> {
    tokio::time::sleep(Duration::from_millis(REDEMPTION_LATENCY_MS)).await;

    let redemption = loyalty::redeem_reward(&db, &profile_id, &reward_id)?;
    let _ = app.emit("redemption_created", redemption.clone());
    Ok(redemption)
}

/// Admin redemption listing with a status facet, text search over the
/// customer and reward names, and pagination.
#[tauri::command]
pub async fn redemption_get_all(
    db: tauri::State<'_, db::DbState>,
    arg0: Option<Value>,
) -> Result<Value, String> {
    let payload = arg0.unwrap_or(Value::Null);
    let status = value_str(&payload, &["status"]).unwrap_or_else(|| FILTER_ALL.to_string());
    let search = value_str(&payload, &["search", "query"]).unwrap_or_default();
    let page = value_i64(&payload, &["page"]).unwrap_or(1);

    let mut rows: Vec<Value> = loyalty::list_redemptions(&db)?
        .into_iter()
        .filter(|r| {
            let r_status = r.get("status").and_then(Value::as_str).unwrap_or("");
            let customer = r.get("customerName").and_then(Value::as_str).unwrap_or("");
            let reward = r.get("rewardName").and_then(Value::as_str).unwrap_or("");
            facet_matches(r_status, &status) && text_matches(&[customer, reward], &search)
        })
        .collect();

    sort_newest_first(&mut rows, "createdAt");
    let paged = paginate(rows, page, configured_page_size(&db));
    serde_json::to_value(paged).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn redemption_update_status(
    app: tauri::AppHandle,
    db: tauri::State<'_, db::DbState>,
    redemption_id: String,
    status: String,
) -> Result<Value, String> {
    let result = loyalty::update_redemption_status(&db, &redemption_id, &status)?;
    let _ = app.emit("redemption_status_updated", result.clone());
    Ok(result)
}
