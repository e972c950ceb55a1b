use serde_json::Value;
use tauri::Emitter;

use crate::data_helpers::{
    configured_page_size, facet_matches, paginate, sort_newest_first, text_matches, FILTER_ALL,
};
use crate::{db, menu, value_i64, value_str};

/// Storefront and admin menu listing.
///
/// Optional payload: `{ includeDrafts, category, search, page }`. The
/// storefront omits `includeDrafts` and only sees published items;
/// category and search combine with AND. Omitting `page` returns the
/// full filtered list (the storefront renders category rails unpaged).
#[tauri::command]
pub async fn menu_get_all(
    db: tauri::State<'_, db::DbState>,
    arg0: Option<Value>,
) -> Result<Value, String> {
    let payload = arg0.unwrap_or(Value::Null);
    let include_drafts = payload
        .get("includeDrafts")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let category = value_str(&payload, &["category"]).unwrap_or_else(|| FILTER_ALL.to_string());
    let search = value_str(&payload, &["search", "query"]).unwrap_or_default();

    let mut items: Vec<Value> = menu::list_items(&db, include_drafts)?
        .into_iter()
        .filter(|item| {
            let item_category = item.get("category").and_then(Value::as_str).unwrap_or("");
            let name = item.get("name").and_then(Value::as_str).unwrap_or("");
            let description = item
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("");
            facet_matches(item_category, &category) && text_matches(&[name, description], &search)
        })
        .collect();

    match value_i64(&payload, &["page"]) {
        Some(page) => {
            sort_newest_first(&mut items, "createdAt");
            let paged = paginate(items, page, configured_page_size(&db));
            serde_json::to_value(paged).map_err(|e| e.to_string())
        }
        None => Ok(Value::Array(items)),
    }
}

#[tauri::command]
pub async fn menu_get_by_id(
    db: tauri::State<'_, db::DbState>,
    item_id: String,
) -> Result<Value, String> {
    menu::get_item(&db, &item_id)
}

#[tauri::command]
pub async fn menu_create(
    app: tauri::AppHandle,
    db: tauri::State<'_, db::DbState>,
    payload: Value,
) -> Result<Value, String> {
    let item = menu::create_item(&db, &payload)?;
    let _ = app.emit("menu_updated", item.clone());
    Ok(item)
}

#[tauri::command]
pub async fn menu_update(
    app: tauri::AppHandle,
    db: tauri::State<'_, db::DbState>,
    item_id: String,
    payload: Value,
) -> Result<Value, String> {
    let item = menu::update_item(&db, &item_id, &payload)?;
    let _ = app.emit("menu_updated", item.clone());
    Ok(item)
}

#[tauri::command]
pub async fn menu_delete(
    app: tauri::AppHandle,
    db: tauri::State<'_, db::DbState>,
    item_id: String,
) -> Result<Value, String> {
    let result = menu::delete_item(&db, &item_id)?;
    let _ = app.emit("menu_updated", result.clone());
    Ok(result)
}
