use serde_json::Value;
use tauri::Emitter;
use tracing::info;

use crate::data_helpers::{
    configured_page_size, facet_matches, paginate, sort_newest_first, text_matches, FILTER_ALL,
};
use crate::{db, orders, value_i64, value_str};

/// Checkout: create an order from a cart snapshot.
#[tauri::command]
pub async fn order_checkout(
    app: tauri::AppHandle,
    db: tauri::State<'_, db::DbState>,
    payload: Value,
) -> Result<Value, String> {
    let order = orders::checkout(&db, &payload)?;
    let _ = app.emit("order_created", order.clone());
    Ok(order)
}

/// Admin order listing with status/channel facets, text search over the
/// order id and customer name, and pagination.
///
/// Payload: `{ status, channel, search, page }`, all optional.
#[tauri::command]
pub async fn order_get_all(
    db: tauri::State<'_, db::DbState>,
    arg0: Option<Value>,
) -> Result<Value, String> {
    let payload = arg0.unwrap_or(Value::Null);
    let status = value_str(&payload, &["status"]).unwrap_or_else(|| FILTER_ALL.to_string());
    let channel = value_str(&payload, &["channel"]).unwrap_or_else(|| FILTER_ALL.to_string());
    let search = value_str(&payload, &["search", "query"]).unwrap_or_default();
    let page = value_i64(&payload, &["page"]).unwrap_or(1);

    let mut rows: Vec<Value> = orders::list_orders(&db)?
        .into_iter()
        .filter(|order| {
            let order_status = order.get("status").and_then(Value::as_str).unwrap_or("");
            let order_channel = order.get("channel").and_then(Value::as_str).unwrap_or("");
            let id = order.get("id").and_then(Value::as_str).unwrap_or("");
            let name = order
                .get("customerName")
                .and_then(Value::as_str)
                .unwrap_or("");
            facet_matches(order_status, &status)
                && facet_matches(order_channel, &channel)
                && text_matches(&[id, name], &search)
        })
        .collect();

    sort_newest_first(&mut rows, "createdAt");
    let paged = paginate(rows, page, configured_page_size(&db));
    serde_json::to_value(paged).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn order_get_by_id(
    db: tauri::State<'_, db::DbState>,
    order_id: String,
) -> Result<Value, String> {
    orders::get_order(&db, &order_id)
}

/// Storefront order history for one member profile, newest first, paged.
#[tauri::command]
pub async fn order_get_history(
    db: tauri::State<'_, db::DbState>,
    profile_id: String,
    arg0: Option<Value>,
) -> Result<Value, String> {
    let payload = arg0.unwrap_or(Value::Null);
    let page = value_i64(&payload, &["page"]).unwrap_or(1);

    let mut rows: Vec<Value> = orders::list_orders(&db)?
        .into_iter()
        .filter(|order| {
            order.get("profileId").and_then(Value::as_str) == Some(profile_id.as_str())
        })
        .collect();

    sort_newest_first(&mut rows, "createdAt");
    let paged = paginate(rows, page, configured_page_size(&db));
    serde_json::to_value(paged).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn order_update_status(
    app: tauri::AppHandle,
    db: tauri::State<'_, db::DbState>,
    order_id: String,
    status: String,
) -> Result<Value, String> {
    let result = orders::update_status(&db, &order_id, &status)?;
    let _ = app.emit("order_status_updated", result.clone());
    Ok(result)
}

#[tauri::command]
pub async fn order_delete(
    app: tauri::AppHandle,
    db: tauri::State<'_, db::DbState>,
    order_id: String,
) -> Result<Value, String> {
    let result = orders::delete_order(&db, &order_id)?;
    let _ = app.emit("order_deleted", result.clone());
    Ok(result)
}

/// Open the pre-filled WhatsApp confirmation for an order in the system
/// browser. The shop number comes from `local_settings(shop/whatsapp)`.
#[tauri::command]
pub async fn order_send_whatsapp(
    db: tauri::State<'_, db::DbState>,
    order_id: String,
) -> Result<Value, String> {
    let order = orders::get_order(&db, &order_id)?;
    let shop_phone = {
        let conn = db.conn.lock().map_err(|e| e.to_string())?;
        db::get_setting(&conn, "shop", "whatsapp")
            .ok_or("Shop WhatsApp number is not configured")?
    };

    let link = orders::build_whatsapp_link(&order, &shop_phone)?;
    webbrowser::open(&link).map_err(|e| format!("Failed to open browser: {e}"))?;

    info!(order_id = %order_id, "WhatsApp confirmation opened");
    Ok(serde_json::json!({ "success": true, "url": link }))
}
