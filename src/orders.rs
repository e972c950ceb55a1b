//! Order lifecycle for BrewDesk.
//!
//! Orders move `pending → process → completed`, with operator-initiated
//! cancellation from `pending` or `process`. Both `completed` and
//! `cancelled` are terminal. Pending orders carry a deadline fixed at
//! creation; a once-per-second background tick cancels overdue ones
//! exactly once. Hard delete is only legal from `cancelled`.
//!
//! Item lists are denormalized snapshots: totals are computed at checkout
//! and never change when the menu catalog is edited later.

use chrono::{Duration, Utc};
use rusqlite::params;
use serde_json::Value;
use tauri::{AppHandle, Emitter, Manager};
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::cart::{self, CartItem};
use crate::db::{self, DbState};
use crate::loyalty;
use crate::vouchers::VoucherDiscount;

/// Authoritative auto-cancel timeout for pending orders. The source app
/// shipped two conflicting values (5 and 15 minutes) from duplicated
/// countdown logic; 5 minutes is the one kept, tunable via
/// `local_settings(orders/pending_timeout_secs)`.
pub const DEFAULT_PENDING_TIMEOUT_SECS: i64 = 300;

// ---------------------------------------------------------------------------
// Status state machine
// ---------------------------------------------------------------------------

/// Order status. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Process,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Process => "process",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse a stored or user-supplied status. Accepts the "processing"
    /// spelling some callers use for `process`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "process" | "processing" => Ok(Self::Process),
            "completed" => Ok(Self::Completed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(format!("Unknown order status: {other:?}")),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Legal edges: pending→process, pending→cancelled, process→completed,
    /// process→cancelled. Everything else is rejected.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Process)
                | (Self::Pending, Self::Cancelled)
                | (Self::Process, Self::Completed)
                | (Self::Process, Self::Cancelled)
        )
    }
}

// ---------------------------------------------------------------------------
// Checkout
// ---------------------------------------------------------------------------

/// Timestamp-derived order identifier, e.g. `ORD-20240101142530-3f9a`.
fn generate_order_id() -> String {
    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    let suffix = &Uuid::new_v4().simple().to_string()[..4];
    format!("ORD-{stamp}-{suffix}")
}

/// Create an order from a cart.
///
/// Computes subtotal, voucher discount, and grand total (snapshot
/// semantics), fixes the pending deadline, consumes the profile's active
/// voucher when one was applied, and awards the loyalty bonus for
/// qualifying registered checkouts.
pub fn checkout(db: &DbState, payload: &Value) -> Result<Value, String> {
    let items: Vec<CartItem> = serde_json::from_value(
        payload.get("items").cloned().unwrap_or(Value::Array(vec![])),
    )
    .map_err(|e| format!("Invalid cart items: {e}"))?;
    if items.is_empty() {
        return Err("Cart is empty".to_string());
    }
    if items.iter().any(|l| l.quantity == 0 || l.price < 0) {
        return Err("Cart contains an invalid line".to_string());
    }

    let profile_id = str_field(payload, "profileId").or_else(|| str_field(payload, "profile_id"));
    let customer_name =
        str_field(payload, "customerName").or_else(|| str_field(payload, "customer_name"));
    let customer_phone =
        str_field(payload, "customerPhone").or_else(|| str_field(payload, "customer_phone"));
    let channel = str_field(payload, "channel").unwrap_or_else(|| "online".to_string());
    if channel != "online" && channel != "offline" {
        return Err(format!("Unknown order channel: {channel:?}"));
    }

    // Voucher: explicit snapshot in the payload (cashier flow) or the
    // profile's claimed voucher when the storefront asks to apply it.
    let apply_profile_voucher = payload
        .get("applyVoucher")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let explicit_voucher = payload.get("voucher").filter(|v| v.is_object()).cloned();
    let profile_voucher = if explicit_voucher.is_none() && apply_profile_voucher {
        match &profile_id {
            Some(pid) => active_voucher_snapshot(db, pid)?,
            None => None,
        }
    } else {
        None
    };
    // Only the profile's own voucher gets consumed; an explicit cashier
    // voucher must leave the claimed one untouched.
    let consumed_profile_voucher = profile_voucher.is_some();
    let voucher_snapshot = explicit_voucher.or(profile_voucher);

    let (voucher_title, voucher_descriptor, parsed_discount) = match &voucher_snapshot {
        Some(snap) => {
            let title = snap.get("title").and_then(Value::as_str).unwrap_or("").to_string();
            let descriptor = snap
                .get("discount")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            let parsed = VoucherDiscount::parse(&descriptor)
                .ok_or_else(|| format!("Invalid voucher discount: {descriptor:?}"))?;
            (Some(title), Some(descriptor), Some(parsed))
        }
        None => (None, None, None),
    };

    let subtotal = cart::subtotal(&items);
    let discount = cart::discount(subtotal, parsed_discount);
    let total = cart::total(subtotal, parsed_discount);

    let order_id = generate_order_id();
    let now = Utc::now();
    let created_at = now.to_rfc3339();

    let timeout_secs = {
        let conn = db.conn.lock().map_err(|e| e.to_string())?;
        db::get_setting_i64(
            &conn,
            "orders",
            "pending_timeout_secs",
            DEFAULT_PENDING_TIMEOUT_SECS,
        )
    };
    let expires_at = (now + Duration::seconds(timeout_secs)).to_rfc3339();

    let items_json = serde_json::to_string(&items).map_err(|e| format!("serialize items: {e}"))?;

    {
        let conn = db.conn.lock().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO orders (
                id, profile_id, customer_name, customer_phone, items,
                subtotal, discount, total, status, channel,
                voucher_title, voucher_discount, expires_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9, ?10, ?11, ?12, ?13, ?13)",
            params![
                order_id,
                profile_id,
                customer_name,
                customer_phone,
                items_json,
                subtotal,
                discount,
                total,
                channel,
                voucher_title,
                voucher_descriptor,
                expires_at,
                created_at,
            ],
        )
        .map_err(|e| format!("insert order: {e}"))?;

        // Applied voucher is consumed: clear it off the profile.
        if consumed_profile_voucher {
            if let Some(pid) = &profile_id {
                let _ = conn.execute(
                    "UPDATE loyalty_profiles SET active_voucher = NULL, updated_at = ?1 WHERE id = ?2",
                    params![created_at, pid],
                );
            }
        }
    }

    // Loyalty bonus after the write lock is released; walk-ins get nothing.
    let bonus = cart::loyalty_bonus(total, profile_id.is_some());
    if bonus > 0 {
        if let Some(pid) = &profile_id {
            if let Err(e) = loyalty::award_points(db, pid, bonus) {
                warn!(order_id = %order_id, profile_id = %pid, error = %e, "Loyalty bonus award failed");
            }
        }
    }

    info!(
        order_id = %order_id,
        channel = %channel,
        subtotal = subtotal,
        discount = discount,
        total = total,
        bonus_points = bonus,
        "Order created"
    );

    get_order(db, &order_id)
}

/// Read the profile's claimed voucher snapshot, if any. Malformed stored
/// JSON degrades to "no voucher".
fn active_voucher_snapshot(db: &DbState, profile_id: &str) -> Result<Option<Value>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let raw: Option<String> = conn
        .query_row(
            "SELECT active_voucher FROM loyalty_profiles WHERE id = ?1",
            params![profile_id],
            |row| row.get(0),
        )
        .map_err(|_| format!("Profile not found: {profile_id}"))?;
    Ok(raw.and_then(|s| serde_json::from_str::<Value>(&s).ok()))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

const ORDER_COLUMNS: &str = "id, profile_id, customer_name, customer_phone, items, subtotal, \
     discount, total, status, channel, voucher_title, voucher_discount, expires_at, created_at, updated_at";

fn order_row_to_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    let items_raw: String = row.get(4)?;
    // Malformed snapshots degrade to an empty list, never an error.
    let items: Value = serde_json::from_str(&items_raw).unwrap_or(Value::Array(vec![]));
    Ok(serde_json::json!({
        "id": row.get::<_, String>(0)?,
        "profileId": row.get::<_, Option<String>>(1)?,
        "customerName": row.get::<_, Option<String>>(2)?,
        "customerPhone": row.get::<_, Option<String>>(3)?,
        "items": items,
        "subtotal": row.get::<_, i64>(5)?,
        "discount": row.get::<_, i64>(6)?,
        "total": row.get::<_, i64>(7)?,
        "status": row.get::<_, String>(8)?,
        "channel": row.get::<_, String>(9)?,
        "voucherTitle": row.get::<_, Option<String>>(10)?,
        "voucherDiscount": row.get::<_, Option<String>>(11)?,
        "expiresAt": row.get::<_, Option<String>>(12)?,
        "createdAt": row.get::<_, String>(13)?,
        "updatedAt": row.get::<_, String>(14)?,
    }))
}

/// All orders, newest first.
pub fn list_orders(db: &DbState) -> Result<Vec<Value>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC"
        ))
        .map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map([], |row| order_row_to_json(row))
        .map_err(|e| e.to_string())?;

    let mut orders = Vec::new();
    for row in rows {
        match row {
            Ok(o) => orders.push(o),
            Err(e) => warn!("skipping malformed order row: {e}"),
        }
    }
    Ok(orders)
}

/// One order by id.
pub fn get_order(db: &DbState, order_id: &str) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    conn.query_row(
        &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
        params![order_id],
        |row| order_row_to_json(row),
    )
    .map_err(|_| format!("Order not found: {order_id}"))
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Admin-triggered status change, validated against the transition matrix.
pub fn update_status(db: &DbState, order_id: &str, new_status: &str) -> Result<Value, String> {
    let next = OrderStatus::parse(new_status)?;

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let current_raw: String = conn
        .query_row(
            "SELECT status FROM orders WHERE id = ?1",
            params![order_id],
            |row| row.get(0),
        )
        .map_err(|_| format!("Order not found: {order_id}"))?;
    let current = OrderStatus::parse(&current_raw)?;

    if current.is_terminal() {
        return Err(format!(
            "Order {order_id} is {} and can no longer change",
            current.as_str()
        ));
    }
    if !current.can_transition_to(next) {
        return Err(format!(
            "Illegal transition {} -> {} for order {order_id}",
            current.as_str(),
            next.as_str()
        ));
    }

    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![next.as_str(), now, order_id],
    )
    .map_err(|e| format!("update order status: {e}"))?;

    info!(order_id = %order_id, from = current.as_str(), to = next.as_str(), "Order status updated");

    Ok(serde_json::json!({
        "success": true,
        "orderId": order_id,
        "previousStatus": current.as_str(),
        "status": next.as_str(),
    }))
}

/// Hard delete. Irreversible, so only cancelled orders qualify; the
/// frontend gates this behind a confirmation dialog showing the order id.
pub fn delete_order(db: &DbState, order_id: &str) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let status_raw: String = conn
        .query_row(
            "SELECT status FROM orders WHERE id = ?1",
            params![order_id],
            |row| row.get(0),
        )
        .map_err(|_| format!("Order not found: {order_id}"))?;

    if OrderStatus::parse(&status_raw)? != OrderStatus::Cancelled {
        return Err(format!(
            "Only cancelled orders can be deleted (order {order_id} is {status_raw})"
        ));
    }

    conn.execute("DELETE FROM orders WHERE id = ?1", params![order_id])
        .map_err(|e| format!("delete order: {e}"))?;

    info!(order_id = %order_id, "Order deleted");
    Ok(serde_json::json!({ "success": true, "orderId": order_id }))
}

// ---------------------------------------------------------------------------
// Automatic expiry
// ---------------------------------------------------------------------------

/// Cancel every pending order whose deadline has elapsed at `now_rfc3339`.
///
/// Idempotent: the status filter means an already-cancelled order can
/// never be picked up again, and terminal states never transition back.
pub fn expire_overdue(db: &DbState, now_rfc3339: &str) -> Result<Vec<String>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let mut stmt = conn
        .prepare(
            "SELECT id FROM orders
             WHERE status = 'pending' AND expires_at IS NOT NULL AND expires_at <= ?1",
        )
        .map_err(|e| e.to_string())?;
    let overdue: Vec<String> = stmt
        .query_map(params![now_rfc3339], |row| row.get::<_, String>(0))
        .map_err(|e| e.to_string())?
        .filter_map(|r| r.ok())
        .collect();

    if overdue.is_empty() {
        return Ok(overdue);
    }

    for order_id in &overdue {
        conn.execute(
            "UPDATE orders SET status = 'cancelled', updated_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            params![now_rfc3339, order_id],
        )
        .map_err(|e| format!("auto-cancel order {order_id}: {e}"))?;
        info!(order_id = %order_id, "Pending order auto-cancelled (deadline elapsed)");
    }

    Ok(overdue)
}

/// Start the once-per-second expiry tick.
///
/// Emits `order_expired` and `order_status_updated` for every order the
/// tick cancels, so both storefront countdowns and the admin list refresh.
pub fn start_expiry_loop(app: AppHandle, interval_secs: u64) {
    tauri::async_runtime::spawn(async move {
        info!("Order expiry loop started (interval: {interval_secs}s)");

        loop {
            tokio::time::sleep(std::time::Duration::from_secs(interval_secs)).await;

            let db = app.state::<DbState>();
            let now = Utc::now().to_rfc3339();
            match expire_overdue(&db, &now) {
                Ok(expired) => {
                    for order_id in expired {
                        let payload = serde_json::json!({
                            "orderId": order_id,
                            "status": "cancelled",
                            "reason": "pending_timeout",
                        });
                        let _ = app.emit("order_expired", payload.clone());
                        let _ = app.emit("order_status_updated", payload);
                    }
                }
                Err(e) => warn!("expiry tick failed: {e}"),
            }
        }
    });
}

// ---------------------------------------------------------------------------
// WhatsApp hand-off
// ---------------------------------------------------------------------------

/// Build the pre-filled `wa.me` confirmation link for an order.
///
/// One-way, fire-and-forget hand-off; nothing is read back.
pub fn build_whatsapp_link(order: &Value, shop_phone: &str) -> Result<String, String> {
    let phone: String = shop_phone.chars().filter(char::is_ascii_digit).collect();
    if phone.is_empty() {
        return Err("Shop WhatsApp number is not configured".to_string());
    }

    let order_id = order.get("id").and_then(Value::as_str).unwrap_or("-");
    let customer = order
        .get("customerName")
        .and_then(Value::as_str)
        .unwrap_or("Walk-in customer");

    let mut text = format!("Order {order_id}\nName: {customer}\n");
    if let Some(customer_phone) = order.get("customerPhone").and_then(Value::as_str) {
        text.push_str(&format!("Phone: {customer_phone}\n"));
    }
    text.push('\n');
    if let Some(items) = order.get("items").and_then(Value::as_array) {
        for item in items {
            let qty = item.get("quantity").and_then(Value::as_i64).unwrap_or(1);
            let name = item.get("name").and_then(Value::as_str).unwrap_or("Item");
            let price = item.get("price").and_then(Value::as_i64).unwrap_or(0);
            text.push_str(&format!("{qty}x {name} — {}\n", price * qty));
        }
    }
    let subtotal = order.get("subtotal").and_then(Value::as_i64).unwrap_or(0);
    let discount = order.get("discount").and_then(Value::as_i64).unwrap_or(0);
    let total = order.get("total").and_then(Value::as_i64).unwrap_or(0);
    text.push_str(&format!(
        "\nSubtotal: {subtotal}\nDiscount: {discount}\nTotal: {total}"
    ));

    let url = Url::parse_with_params(&format!("https://wa.me/{phone}"), &[("text", text.as_str())])
        .map_err(|e| format!("build WhatsApp link: {e}"))?;
    Ok(url.to_string())
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use rusqlite::Connection;

    fn test_db() -> DbState {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;",
        )
        .expect("pragma setup");
        db::run_migrations_for_test(&conn);
        DbState {
            conn: std::sync::Mutex::new(conn),
            db_path: std::path::PathBuf::from(":memory:"),
        }
    }

    fn seed_profile(db: &DbState, id: &str, points: i64) {
        let conn = db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO loyalty_profiles (id, name, email, points, created_at, updated_at)
             VALUES (?1, 'Budi', 'budi@example.com', ?2, datetime('now'), datetime('now'))",
            params![id, points],
        )
        .expect("insert profile");
    }

    fn espresso_checkout(profile_id: Option<&str>) -> Value {
        serde_json::json!({
            "items": [
                { "menuItemId": "espresso", "name": "Espresso", "price": 18_000, "quantity": 2 }
            ],
            "profileId": profile_id,
            "customerName": "Budi",
            "customerPhone": "0812-3456-789",
            "channel": "online",
        })
    }

    #[test]
    fn test_transition_matrix() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Process));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Process.can_transition_to(Completed));
        assert!(Process.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Process.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Process));
    }

    #[test]
    fn test_status_parse_aliases() {
        assert_eq!(OrderStatus::parse("processing").unwrap(), OrderStatus::Process);
        assert_eq!(OrderStatus::parse("canceled").unwrap(), OrderStatus::Cancelled);
        assert!(OrderStatus::parse("shipped").is_err());
    }

    #[test]
    fn test_checkout_totals_snapshot() {
        let db = test_db();
        let order = checkout(&db, &espresso_checkout(None)).unwrap();
        assert_eq!(order["subtotal"], 36_000);
        assert_eq!(order["discount"], 0);
        assert_eq!(order["total"], 36_000);
        assert_eq!(order["status"], "pending");
        assert!(order["id"].as_str().unwrap().starts_with("ORD-"));
    }

    #[test]
    fn test_checkout_with_percent_voucher() {
        let db = test_db();
        let mut payload = espresso_checkout(None);
        payload["voucher"] = serde_json::json!({ "title": "Weekend 20", "discount": "20%" });
        let order = checkout(&db, &payload).unwrap();
        assert_eq!(order["subtotal"], 36_000);
        assert_eq!(order["discount"], 7_200);
        assert_eq!(order["total"], 28_800);
        assert_eq!(order["voucherTitle"], "Weekend 20");
    }

    #[test]
    fn test_checkout_with_free_voucher_waives_total() {
        let db = test_db();
        let mut payload = espresso_checkout(None);
        payload["voucher"] = serde_json::json!({ "title": "On the house", "discount": "FREE" });
        let order = checkout(&db, &payload).unwrap();
        assert_eq!(order["subtotal"], 36_000);
        assert_eq!(order["discount"], 0);
        assert_eq!(order["total"], 0);
    }

    #[test]
    fn test_checkout_empty_cart_rejected() {
        let db = test_db();
        let payload = serde_json::json!({ "items": [] });
        assert!(checkout(&db, &payload).is_err());
    }

    #[test]
    fn test_checkout_awards_bonus_to_profile() {
        let db = test_db();
        seed_profile(&db, "p1", 100);

        // 3x espresso = 54_000 >= 50_000 threshold
        let payload = serde_json::json!({
            "items": [
                { "menuItemId": "espresso", "name": "Espresso", "price": 18_000, "quantity": 3 }
            ],
            "profileId": "p1",
        });
        checkout(&db, &payload).unwrap();

        let conn = db.conn.lock().unwrap();
        let points: i64 = conn
            .query_row(
                "SELECT points FROM loyalty_profiles WHERE id = 'p1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(points, 110);
    }

    #[test]
    fn test_checkout_walk_in_gets_no_bonus() {
        let db = test_db();
        seed_profile(&db, "p1", 100);

        // Big order, but no profile on the checkout
        let payload = serde_json::json!({
            "items": [
                { "menuItemId": "espresso", "name": "Espresso", "price": 18_000, "quantity": 5 }
            ],
        });
        checkout(&db, &payload).unwrap();

        let conn = db.conn.lock().unwrap();
        let points: i64 = conn
            .query_row(
                "SELECT points FROM loyalty_profiles WHERE id = 'p1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(points, 100);
    }

    #[test]
    fn test_checkout_consumes_profile_voucher() {
        let db = test_db();
        seed_profile(&db, "p1", 0);
        {
            let conn = db.conn.lock().unwrap();
            conn.execute(
                "UPDATE loyalty_profiles SET active_voucher = ?1 WHERE id = 'p1'",
                params![r#"{"title":"Weekend 20","discount":"20%"}"#],
            )
            .unwrap();
        }

        let mut payload = espresso_checkout(Some("p1"));
        payload["applyVoucher"] = Value::Bool(true);
        let order = checkout(&db, &payload).unwrap();
        assert_eq!(order["discount"], 7_200);

        let conn = db.conn.lock().unwrap();
        let active: Option<String> = conn
            .query_row(
                "SELECT active_voucher FROM loyalty_profiles WHERE id = 'p1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(active.is_none(), "voucher should be consumed");
    }

    #[test]
    fn test_checkout_explicit_voucher_keeps_profile_voucher() {
        let db = test_db();
        seed_profile(&db, "p1", 0);
        {
            let conn = db.conn.lock().unwrap();
            conn.execute(
                "UPDATE loyalty_profiles SET active_voucher = ?1 WHERE id = 'p1'",
                params![r#"{"title":"Claimed 50","discount":"50%"}"#],
            )
            .unwrap();
        }

        // Cashier hands over an explicit voucher while the storefront flag
        // is also set. The explicit one wins and the claim must survive.
        let mut payload = espresso_checkout(Some("p1"));
        payload["voucher"] = serde_json::json!({ "title": "Cashier 10", "discount": "10%" });
        payload["applyVoucher"] = Value::Bool(true);
        let order = checkout(&db, &payload).unwrap();
        assert_eq!(order["voucherTitle"], "Cashier 10");
        assert_eq!(order["discount"], 3_600);

        let conn = db.conn.lock().unwrap();
        let active: Option<String> = conn
            .query_row(
                "SELECT active_voucher FROM loyalty_profiles WHERE id = 'p1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(
            active.as_deref(),
            Some(r#"{"title":"Claimed 50","discount":"50%"}"#),
            "unapplied claimed voucher must stay on the profile"
        );
    }

    #[test]
    fn test_update_status_happy_path() {
        let db = test_db();
        let order = checkout(&db, &espresso_checkout(None)).unwrap();
        let id = order["id"].as_str().unwrap();

        let r = update_status(&db, id, "process").unwrap();
        assert_eq!(r["previousStatus"], "pending");
        let r = update_status(&db, id, "completed").unwrap();
        assert_eq!(r["status"], "completed");
    }

    #[test]
    fn test_update_status_rejects_illegal_edges() {
        let db = test_db();
        let order = checkout(&db, &espresso_checkout(None)).unwrap();
        let id = order["id"].as_str().unwrap();

        // pending -> completed skips process
        assert!(update_status(&db, id, "completed").is_err());

        update_status(&db, id, "cancelled").unwrap();
        // terminal: nothing leaves cancelled
        assert!(update_status(&db, id, "pending").is_err());
        assert!(update_status(&db, id, "process").is_err());
    }

    #[test]
    fn test_delete_requires_cancelled() {
        let db = test_db();
        let order = checkout(&db, &espresso_checkout(None)).unwrap();
        let id = order["id"].as_str().unwrap();

        let err = delete_order(&db, id).unwrap_err();
        assert!(err.contains("Only cancelled orders"));

        update_status(&db, id, "cancelled").unwrap();
        delete_order(&db, id).unwrap();
        assert!(get_order(&db, id).is_err());
    }

    #[test]
    fn test_expire_overdue_cancels_after_deadline() {
        // Order created at T with 5-minute deadline; at T+301s it cancels.
        let db = test_db();
        let order = checkout(&db, &espresso_checkout(None)).unwrap();
        let id = order["id"].as_str().unwrap().to_string();

        let created = chrono::DateTime::parse_from_rfc3339(
            order["createdAt"].as_str().unwrap(),
        )
        .unwrap()
        .with_timezone(&Utc);

        // 299s in: still pending
        let expired = expire_overdue(&db, &(created + Duration::seconds(299)).to_rfc3339()).unwrap();
        assert!(expired.is_empty());

        // 301s in: cancelled
        let expired = expire_overdue(&db, &(created + Duration::seconds(301)).to_rfc3339()).unwrap();
        assert_eq!(expired, vec![id.clone()]);
        assert_eq!(get_order(&db, &id).unwrap()["status"], "cancelled");

        // Second tick is a no-op (idempotent) and the order never comes back
        let expired = expire_overdue(&db, &(created + Duration::seconds(302)).to_rfc3339()).unwrap();
        assert!(expired.is_empty());
        assert_eq!(get_order(&db, &id).unwrap()["status"], "cancelled");
    }

    #[test]
    fn test_expiry_skips_non_pending_orders() {
        let db = test_db();
        let order = checkout(&db, &espresso_checkout(None)).unwrap();
        let id = order["id"].as_str().unwrap().to_string();
        update_status(&db, &id, "process").unwrap();

        let far_future = (Utc::now() + Duration::days(1)).to_rfc3339();
        let expired = expire_overdue(&db, &far_future).unwrap();
        assert!(expired.is_empty());
        assert_eq!(get_order(&db, &id).unwrap()["status"], "process");
    }

    #[test]
    fn test_total_invariant_survives_catalog_edits() {
        let db = test_db();
        let order = checkout(&db, &espresso_checkout(None)).unwrap();
        let id = order["id"].as_str().unwrap().to_string();

        // Catalog price change after the fact must not touch the snapshot
        {
            let conn = db.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO menu_items (id, name, price, category, created_at, updated_at)
                 VALUES ('espresso', 'Espresso', 99000, 'signature-coffee', datetime('now'), datetime('now'))",
                [],
            )
            .unwrap();
        }
        let reloaded = get_order(&db, &id).unwrap();
        assert_eq!(reloaded["total"], 36_000);
        assert_eq!(reloaded["items"][0]["price"], 18_000);
    }

    #[test]
    fn test_whatsapp_link_contents() {
        let order = serde_json::json!({
            "id": "ORD-20240101120000-ab12",
            "customerName": "Budi",
            "customerPhone": "08123456789",
            "items": [
                { "name": "Espresso", "price": 18_000, "quantity": 2 }
            ],
            "subtotal": 36_000,
            "discount": 7_200,
            "total": 28_800,
        });

        let link = build_whatsapp_link(&order, "+62 812-0000-1111").unwrap();
        assert!(link.starts_with("https://wa.me/6281200001111?text="));
        assert!(link.contains("ORD-20240101120000-ab12"));
        // Itemized line and totals survive URL encoding
        assert!(link.contains("Espresso"));
        assert!(link.contains("28800"));
    }

    #[test]
    fn test_whatsapp_link_requires_phone() {
        let order = serde_json::json!({ "id": "x", "items": [] });
        assert!(build_whatsapp_link(&order, "").is_err());
    }
}
