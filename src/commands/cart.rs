use serde_json::Value;

use crate::cart::{self, CartItem};
use crate::vouchers::VoucherDiscount;
use crate::{db, loyalty, value_str};

fn parse_cart(payload: &Value) -> Result<Vec<CartItem>, String> {
    serde_json::from_value(payload.get("items").cloned().unwrap_or(Value::Array(vec![])))
        .map_err(|e| format!("Invalid cart items: {e}"))
}

/// Totals for the current cart, including the projected loyalty bonus.
///
/// Payload: `{ items, voucherDiscount?, profileId? }`. The voucher field
/// is the raw descriptor string (`"20%"` or `"FREE"`).
fn cart_summary(db: &db::DbState, payload: &Value) -> Result<Value, String> {
    let items = parse_cart(payload)?;
    let voucher = match value_str(payload, &["voucherDiscount", "voucher_discount"]) {
        Some(descriptor) => Some(
            VoucherDiscount::parse(&descriptor)
                .ok_or_else(|| format!("Invalid voucher discount: {descriptor:?}"))?,
        ),
        None => None,
    };

    let has_profile = match value_str(payload, &["profileId", "profile_id"]) {
        Some(pid) => loyalty::get_profile(db, &pid).is_ok(),
        None => false,
    };

    let subtotal = cart::subtotal(&items);
    let discount = cart::discount(subtotal, voucher);
    let total = cart::total(subtotal, voucher);

    Ok(serde_json::json!({
        "items": items,
        "subtotal": subtotal,
        "discount": discount,
        "total": total,
        "loyaltyBonus": cart::loyalty_bonus(total, has_profile),
    }))
}

/// Add one unit of a menu item to the cart and return the new cart with
/// recomputed totals. The name/price snapshot comes from the catalog.
#[tauri::command]
pub async fn cart_add_item(
    db: tauri::State<'_, db::DbState>,
    payload: Value,
) -> Result<Value, String> {
    let item_id =
        value_str(&payload, &["menuItemId", "menu_item_id", "itemId"]).ok_or("Missing item id")?;
    let item = crate::menu::get_item(&db, &item_id)?;
    let name = item.get("name").and_then(Value::as_str).unwrap_or("");
    let price = item.get("price").and_then(Value::as_i64).unwrap_or(0);

    let cart_items = parse_cart(&payload)?;
    let next = cart::add_to_cart(&cart_items, &item_id, name, price);

    let mut result = payload.clone();
    result["items"] = serde_json::to_value(&next).map_err(|e| e.to_string())?;
    cart_summary(&db, &result)
}

/// Remove one unit of a menu item from the cart and return the new cart
/// with recomputed totals.
#[tauri::command]
pub async fn cart_remove_item(
    db: tauri::State<'_, db::DbState>,
    payload: Value,
) -> Result<Value, String> {
    let item_id =
        value_str(&payload, &["menuItemId", "menu_item_id", "itemId"]).ok_or("Missing item id")?;

    let cart_items = parse_cart(&payload)?;
    let next = cart::remove_from_cart(&cart_items, &item_id);

    let mut result = payload.clone();
    result["items"] = serde_json::to_value(&next).map_err(|e| e.to_string())?;
    cart_summary(&db, &result)
}

/// Recompute totals without changing the cart (voucher applied/removed).
#[tauri::command]
pub async fn cart_get_summary(
    db: tauri::State<'_, db::DbState>,
    payload: Value,
) -> Result<Value, String> {
    cart_summary(&db, &payload)
}
