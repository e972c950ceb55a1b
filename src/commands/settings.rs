use serde_json::Value;

use crate::{db, value_str};

/// All local settings grouped by category.
#[tauri::command]
pub async fn settings_get_all(db: tauri::State<'_, db::DbState>) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    Ok(db::get_all_settings(&conn))
}

#[tauri::command]
pub async fn settings_get(
    db: tauri::State<'_, db::DbState>,
    category: String,
    key: String,
) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    Ok(serde_json::json!({
        "category": category,
        "key": key,
        "value": db::get_setting(&conn, &category, &key),
    }))
}

/// Upsert one setting. Payload: `{ category, key, value }`.
#[tauri::command]
pub async fn settings_set(
    db: tauri::State<'_, db::DbState>,
    payload: Value,
) -> Result<Value, String> {
    let category = value_str(&payload, &["category"]).ok_or("Missing setting category")?;
    let key = value_str(&payload, &["key"]).ok_or("Missing setting key")?;
    let value = payload
        .get("value")
        .and_then(Value::as_str)
        .ok_or("Missing setting value")?;

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    db::set_setting(&conn, &category, &key, value)?;
    Ok(serde_json::json!({ "success": true }))
}
