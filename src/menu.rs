//! Menu catalog for BrewDesk.
//!
//! Admin-owned CRUD over `menu_items`. Categories are a closed set;
//! drafts are hidden from the storefront but visible in the back-office.

use chrono::Utc;
use rusqlite::params;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DbState;

/// Closed category set for the menu.
pub const CATEGORIES: &[&str] = &["signature-coffee", "non-coffee", "snacks"];

fn validate_category(category: &str) -> Result<&str, String> {
    let trimmed = category.trim();
    if CATEGORIES.contains(&trimmed) {
        Ok(trimmed)
    } else {
        Err(format!(
            "Unknown category {trimmed:?} (expected one of {CATEGORIES:?})"
        ))
    }
}

fn item_row_to_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    Ok(serde_json::json!({
        "id": row.get::<_, String>(0)?,
        "name": row.get::<_, String>(1)?,
        "description": row.get::<_, String>(2)?,
        "price": row.get::<_, i64>(3)?,
        "category": row.get::<_, String>(4)?,
        "isPopular": row.get::<_, i64>(5)? != 0,
        "isDraft": row.get::<_, i64>(6)? != 0,
        "imageRef": row.get::<_, String>(7)?,
        "createdAt": row.get::<_, String>(8)?,
        "updatedAt": row.get::<_, String>(9)?,
    }))
}

const ITEM_COLUMNS: &str =
    "id, name, description, price, category, is_popular, is_draft, image_ref, created_at, updated_at";

/// List menu items. The storefront passes `include_drafts = false`.
pub fn list_items(db: &DbState, include_drafts: bool) -> Result<Vec<Value>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let sql = if include_drafts {
        format!("SELECT {ITEM_COLUMNS} FROM menu_items ORDER BY name")
    } else {
        format!("SELECT {ITEM_COLUMNS} FROM menu_items WHERE is_draft = 0 ORDER BY name")
    };
    let mut stmt = conn.prepare(&sql).map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map([], |row| item_row_to_json(row))
        .map_err(|e| e.to_string())?;

    let mut items = Vec::new();
    for row in rows {
        match row {
            Ok(item) => items.push(item),
            Err(e) => warn!("skipping malformed menu row: {e}"),
        }
    }
    Ok(items)
}

/// Fetch a single item by id.
pub fn get_item(db: &DbState, item_id: &str) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    conn.query_row(
        &format!("SELECT {ITEM_COLUMNS} FROM menu_items WHERE id = ?1"),
        params![item_id],
        |row| item_row_to_json(row),
    )
    .map_err(|_| format!("Menu item not found: {item_id}"))
}

/// Admin add-action. Price is a currency minor-unit integer.
pub fn create_item(db: &DbState, payload: &Value) -> Result<Value, String> {
    let name = str_field(payload, "name").ok_or("Missing name")?;
    let category = str_field(payload, "category").ok_or("Missing category")?;
    let category = validate_category(&category)?.to_string();
    let price = payload
        .get("price")
        .and_then(Value::as_i64)
        .ok_or("Missing price")?;
    if price < 0 {
        return Err("Price cannot be negative".into());
    }
    let description = str_field(payload, "description").unwrap_or_default();
    let image_ref = str_field(payload, "imageRef")
        .or_else(|| str_field(payload, "image_ref"))
        .unwrap_or_default();
    let is_popular = payload
        .get("isPopular")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let is_draft = payload
        .get("isDraft")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    conn.execute(
        "INSERT INTO menu_items (id, name, description, price, category, is_popular, is_draft, image_ref, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            id,
            name,
            description,
            price,
            category,
            is_popular as i64,
            is_draft as i64,
            image_ref,
            now
        ],
    )
    .map_err(|e| format!("insert menu item: {e}"))?;

    info!(item_id = %id, name = %name, category = %category, "Menu item created");
    Ok(serde_json::json!({ "success": true, "itemId": id }))
}

/// Admin edit-action. Only the provided fields change.
pub fn update_item(db: &DbState, item_id: &str, payload: &Value) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let now = Utc::now().to_rfc3339();

    let exists: Option<String> = conn
        .query_row(
            "SELECT id FROM menu_items WHERE id = ?1",
            params![item_id],
            |row| row.get(0),
        )
        .ok();
    if exists.is_none() {
        return Err(format!("Menu item not found: {item_id}"));
    }

    if let Some(name) = str_field(payload, "name") {
        conn.execute(
            "UPDATE menu_items SET name = ?1, updated_at = ?2 WHERE id = ?3",
            params![name, now, item_id],
        )
        .map_err(|e| format!("update item name: {e}"))?;
    }
    if let Some(description) = clearable_field(payload, "description") {
        conn.execute(
            "UPDATE menu_items SET description = ?1, updated_at = ?2 WHERE id = ?3",
            params![description, now, item_id],
        )
        .map_err(|e| format!("update item description: {e}"))?;
    }
    if let Some(price) = payload.get("price").and_then(Value::as_i64) {
        if price < 0 {
            return Err("Price cannot be negative".into());
        }
        conn.execute(
            "UPDATE menu_items SET price = ?1, updated_at = ?2 WHERE id = ?3",
            params![price, now, item_id],
        )
        .map_err(|e| format!("update item price: {e}"))?;
    }
    if let Some(category) = str_field(payload, "category") {
        let category = validate_category(&category)?.to_string();
        conn.execute(
            "UPDATE menu_items SET category = ?1, updated_at = ?2 WHERE id = ?3",
            params![category, now, item_id],
        )
        .map_err(|e| format!("update item category: {e}"))?;
    }
    if let Some(image_ref) =
        clearable_field(payload, "imageRef").or_else(|| clearable_field(payload, "image_ref"))
    {
        conn.execute(
            "UPDATE menu_items SET image_ref = ?1, updated_at = ?2 WHERE id = ?3",
            params![image_ref, now, item_id],
        )
        .map_err(|e| format!("update item image: {e}"))?;
    }
    if let Some(popular) = payload.get("isPopular").and_then(Value::as_bool) {
        conn.execute(
            "UPDATE menu_items SET is_popular = ?1, updated_at = ?2 WHERE id = ?3",
            params![popular as i64, now, item_id],
        )
        .map_err(|e| format!("update item popular flag: {e}"))?;
    }
    if let Some(draft) = payload.get("isDraft").and_then(Value::as_bool) {
        conn.execute(
            "UPDATE menu_items SET is_draft = ?1, updated_at = ?2 WHERE id = ?3",
            params![draft as i64, now, item_id],
        )
        .map_err(|e| format!("update item draft flag: {e}"))?;
    }

    Ok(serde_json::json!({ "success": true, "itemId": item_id }))
}

/// Admin delete-action. Order rows keep their item snapshots, so history
/// is unaffected.
pub fn delete_item(db: &DbState, item_id: &str) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let deleted = conn
        .execute("DELETE FROM menu_items WHERE id = ?1", params![item_id])
        .map_err(|e| format!("delete menu item: {e}"))?;
    if deleted == 0 {
        return Err(format!("Menu item not found: {item_id}"));
    }
    info!(item_id = %item_id, "Menu item deleted");
    Ok(serde_json::json!({ "success": true, "itemId": item_id }))
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

// Unlike str_field, an empty string is meaningful here: it clears the
// stored value. Only an absent key leaves the field untouched.
fn clearable_field(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
}

// ===========================================================================
// Tests
// ===========================================================================
