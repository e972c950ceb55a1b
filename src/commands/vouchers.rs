use serde_json::Value;
use tauri::Emitter;

use crate::{db, vouchers};

#[tauri::command]
pub async fn voucher_get_all(
    db: tauri::State<'_, db::DbState>,
    arg0: Option<Value>,
) -> Result<Value, String> {
    let include_inactive = arg0
        .as_ref()
        .and_then(|v| v.get("includeInactive"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Ok(Value::Array(vouchers::list_vouchers(&db, include_inactive)?))
}

#[tauri::command]
pub async fn voucher_create(
    db: tauri::State<'_, db::DbState>,
    payload: Value,
) -> Result<Value, String> {
    vouchers::create_voucher(&db, &payload)
}

#[tauri::command]
pub async fn voucher_update(
    db: tauri::State<'_, db::DbState>,
    voucher_id: String,
    payload: Value,
) -> Result<Value, String> {
    vouchers::update_voucher(&db, &voucher_id, &payload)
}

#[tauri::command]
pub async fn voucher_delete(
    db: tauri::State<'_, db::DbState>,
    voucher_id: String,
) -> Result<Value, String> {
    vouchers::delete_voucher(&db, &voucher_id)
}

/// One shake: draws a voucher preview and burns an attempt.
#[tauri::command]
pub async fn shake_draw(
    db: tauri::State<'_, db::DbState>,
    profile_id: String,
) -> Result<Value, String> {
    vouchers::shake_draw(&db, &profile_id)
}

/// Claim the drawn voucher as the profile's active voucher.
#[tauri::command]
pub async fn shake_claim(
    app: tauri::AppHandle,
    db: tauri::State<'_, db::DbState>,
    profile_id: String,
    voucher_id: String,
) -> Result<Value, String> {
    let result = vouchers::claim_voucher(&db, &profile_id, &voucher_id)?;
    let _ = app.emit("voucher_claimed", result.clone());
    Ok(result)
}

#[tauri::command]
pub async fn shake_reset_attempts(
    db: tauri::State<'_, db::DbState>,
    profile_id: String,
) -> Result<Value, String> {
    vouchers::reset_shake_attempts(&db, &profile_id)
}
