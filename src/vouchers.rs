//! Voucher catalog and the "shake" mini-game for BrewDesk.
//!
//! A voucher carries a discount descriptor: either a percentage string
//! ("20%") or the literal "FREE". The shake game draws one voucher
//! uniformly at random from the active pool, bounded by a per-profile
//! attempt counter; a draw only becomes effective once the customer
//! explicitly claims it.

use chrono::Utc;
use rand::Rng;
use rusqlite::params;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DbState;

/// Shake attempts a profile starts with (and is reset to).
pub const SHAKE_ATTEMPT_CAP: i64 = 3;

// ---------------------------------------------------------------------------
// Discount descriptor
// ---------------------------------------------------------------------------

/// Parsed voucher discount descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoucherDiscount {
    /// Percentage off the cart subtotal.
    Percent(u32),
    /// Full order waiver, applied at the checkout layer (not as a
    /// subtotal reduction).
    Free,
}

impl VoucherDiscount {
    /// Parse a descriptor string: `"NN%"` or the literal `"FREE"`
    /// (case-insensitive, surrounding whitespace ignored).
    pub fn parse(descriptor: &str) -> Option<Self> {
        let trimmed = descriptor.trim();
        if trimmed.eq_ignore_ascii_case("free") {
            return Some(Self::Free);
        }
        let pct = trimmed.strip_suffix('%')?.trim().parse::<u32>().ok()?;
        if pct > 100 {
            return None;
        }
        Some(Self::Percent(pct))
    }
}

fn validate_descriptor(descriptor: &str) -> Result<(), String> {
    VoucherDiscount::parse(descriptor)
        .map(|_| ())
        .ok_or_else(|| format!("Invalid discount descriptor: {descriptor:?} (expected \"NN%\" or \"FREE\")"))
}

// ---------------------------------------------------------------------------
// Catalog CRUD (admin)
// ---------------------------------------------------------------------------

fn voucher_row_to_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    Ok(serde_json::json!({
        "id": row.get::<_, String>(0)?,
        "title": row.get::<_, String>(1)?,
        "discount": row.get::<_, String>(2)?,
        "description": row.get::<_, String>(3)?,
        "expiresAt": row.get::<_, Option<String>>(4)?,
        "isActive": row.get::<_, i64>(5)? != 0,
        "createdAt": row.get::<_, String>(6)?,
        "updatedAt": row.get::<_, String>(7)?,
    }))
}

/// List vouchers, optionally including deactivated ones (admin view).
pub fn list_vouchers(db: &DbState, include_inactive: bool) -> Result<Vec<Value>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let sql = if include_inactive {
        "SELECT id, title, discount, description, expires_at, is_active, created_at, updated_at
         FROM vouchers ORDER BY created_at DESC"
    } else {
        "SELECT id, title, discount, description, expires_at, is_active, created_at, updated_at
         FROM vouchers WHERE is_active = 1 ORDER BY created_at DESC"
    };
    let mut stmt = conn.prepare(sql).map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map([], |row| voucher_row_to_json(row))
        .map_err(|e| e.to_string())?;

    let mut vouchers = Vec::new();
    for row in rows {
        match row {
            Ok(v) => vouchers.push(v),
            Err(e) => warn!("skipping malformed voucher row: {e}"),
        }
    }
    Ok(vouchers)
}

/// Create a voucher. The descriptor is validated up front so the catalog
/// never holds an unparseable discount.
pub fn create_voucher(db: &DbState, payload: &Value) -> Result<Value, String> {
    let title = str_field(payload, "title").ok_or("Missing title")?;
    let discount = str_field(payload, "discount").ok_or("Missing discount")?;
    validate_descriptor(&discount)?;
    let description = str_field(payload, "description").unwrap_or_default();
    let expires_at = str_field(payload, "expiresAt").or_else(|| str_field(payload, "expires_at"));

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    conn.execute(
        "INSERT INTO vouchers (id, title, discount, description, expires_at, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
        params![id, title, discount, description, expires_at, now],
    )
    .map_err(|e| format!("insert voucher: {e}"))?;

    info!(voucher_id = %id, title = %title, discount = %discount, "Voucher created");
    Ok(serde_json::json!({ "success": true, "voucherId": id }))
}

/// Update title, discount, description, expiry, or active flag.
pub fn update_voucher(db: &DbState, voucher_id: &str, payload: &Value) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let now = Utc::now().to_rfc3339();

    let exists: Option<String> = conn
        .query_row(
            "SELECT id FROM vouchers WHERE id = ?1",
            params![voucher_id],
            |row| row.get(0),
        )
        .ok();
    if exists.is_none() {
        return Err(format!("Voucher not found: {voucher_id}"));
    }

    if let Some(title) = str_field(payload, "title") {
        conn.execute(
            "UPDATE vouchers SET title = ?1, updated_at = ?2 WHERE id = ?3",
            params![title, now, voucher_id],
        )
        .map_err(|e| format!("update voucher title: {e}"))?;
    }
    if let Some(discount) = str_field(payload, "discount") {
        validate_descriptor(&discount)?;
        conn.execute(
            "UPDATE vouchers SET discount = ?1, updated_at = ?2 WHERE id = ?3",
            params![discount, now, voucher_id],
        )
        .map_err(|e| format!("update voucher discount: {e}"))?;
    }
    if let Some(description) = clearable_field(payload, "description") {
        conn.execute(
            "UPDATE vouchers SET description = ?1, updated_at = ?2 WHERE id = ?3",
            params![description, now, voucher_id],
        )
        .map_err(|e| format!("update voucher description: {e}"))?;
    }
    if let Some(expires_at) =
        clearable_field(payload, "expiresAt").or_else(|| clearable_field(payload, "expires_at"))
    {
        // Empty string lifts the expiry back to "never".
        let expires_at = Some(expires_at).filter(|s| !s.is_empty());
        conn.execute(
            "UPDATE vouchers SET expires_at = ?1, updated_at = ?2 WHERE id = ?3",
            params![expires_at, now, voucher_id],
        )
        .map_err(|e| format!("update voucher expiry: {e}"))?;
    }
    if let Some(active) = payload.get("isActive").and_then(Value::as_bool) {
        conn.execute(
            "UPDATE vouchers SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
            params![active as i64, now, voucher_id],
        )
        .map_err(|e| format!("update voucher active flag: {e}"))?;
    }

    Ok(serde_json::json!({ "success": true, "voucherId": voucher_id }))
}

/// Remove a voucher from the catalog. Claimed voucher snapshots on
/// profiles and orders are denormalized copies and stay intact.
pub fn delete_voucher(db: &DbState, voucher_id: &str) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let deleted = conn
        .execute("DELETE FROM vouchers WHERE id = ?1", params![voucher_id])
        .map_err(|e| format!("delete voucher: {e}"))?;
    if deleted == 0 {
        return Err(format!("Voucher not found: {voucher_id}"));
    }
    info!(voucher_id = %voucher_id, "Voucher deleted");
    Ok(serde_json::json!({ "success": true, "voucherId": voucher_id }))
}

// ---------------------------------------------------------------------------
// Shake mini-game
// ---------------------------------------------------------------------------

/// Draw one voucher uniformly at random from the active, unexpired pool.
///
/// Decrements the profile's attempt counter; the drawn voucher is only a
/// preview until [`claim_voucher`] persists it as the profile's active
/// voucher.
pub fn shake_draw(db: &DbState, profile_id: &str) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let attempts: i64 = conn
        .query_row(
            "SELECT shake_attempts FROM loyalty_profiles WHERE id = ?1",
            params![profile_id],
            |row| row.get(0),
        )
        .map_err(|_| format!("Profile not found: {profile_id}"))?;

    if attempts <= 0 {
        return Err("No shake attempts left".to_string());
    }

    let now = Utc::now().to_rfc3339();
    let mut stmt = conn
        .prepare(
            "SELECT id, title, discount, description, expires_at, is_active, created_at, updated_at
             FROM vouchers
             WHERE is_active = 1 AND (expires_at IS NULL OR expires_at > ?1)",
        )
        .map_err(|e| e.to_string())?;
    let pool: Vec<Value> = stmt
        .query_map(params![now], |row| voucher_row_to_json(row))
        .map_err(|e| e.to_string())?
        .filter_map(|r| r.ok())
        .collect();

    if pool.is_empty() {
        return Err("No vouchers available to draw".to_string());
    }

    let drawn = pool[rand::thread_rng().gen_range(0..pool.len())].clone();

    conn.execute(
        "UPDATE loyalty_profiles SET shake_attempts = shake_attempts - 1, updated_at = ?1
         WHERE id = ?2 AND shake_attempts > 0",
        params![now, profile_id],
    )
    .map_err(|e| format!("decrement shake attempts: {e}"))?;

    info!(
        profile_id = %profile_id,
        voucher = %drawn["title"].as_str().unwrap_or(""),
        attempts_left = attempts - 1,
        "Shake draw"
    );

    Ok(serde_json::json!({
        "success": true,
        "voucher": drawn,
        "attemptsLeft": attempts - 1,
    }))
}

/// Claim a drawn voucher as the profile's active voucher (at most one).
///
/// Stores a denormalized snapshot so a later catalog edit or delete does
/// not alter what the customer holds.
pub fn claim_voucher(db: &DbState, profile_id: &str, voucher_id: &str) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let snapshot: Value = conn
        .query_row(
            "SELECT id, title, discount, description, expires_at, is_active, created_at, updated_at
             FROM vouchers WHERE id = ?1 AND is_active = 1",
            params![voucher_id],
            |row| voucher_row_to_json(row),
        )
        .map_err(|_| format!("Voucher not found or inactive: {voucher_id}"))?;

    let now = Utc::now().to_rfc3339();
    let updated = conn
        .execute(
            "UPDATE loyalty_profiles SET active_voucher = ?1, updated_at = ?2 WHERE id = ?3",
            params![snapshot.to_string(), now, profile_id],
        )
        .map_err(|e| format!("claim voucher: {e}"))?;
    if updated == 0 {
        return Err(format!("Profile not found: {profile_id}"));
    }

    info!(profile_id = %profile_id, voucher_id = %voucher_id, "Voucher claimed");
    Ok(serde_json::json!({ "success": true, "voucher": snapshot }))
}

/// Reset a profile's attempts to the cap (demo/admin affordance).
pub fn reset_shake_attempts(db: &DbState, profile_id: &str) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let now = Utc::now().to_rfc3339();
    let updated = conn
        .execute(
            "UPDATE loyalty_profiles SET shake_attempts = ?1, updated_at = ?2 WHERE id = ?3",
            params![SHAKE_ATTEMPT_CAP, now, profile_id],
        )
        .map_err(|e| format!("reset shake attempts: {e}"))?;
    if updated == 0 {
        return Err(format!("Profile not found: {profile_id}"));
    }
    Ok(serde_json::json!({ "success": true, "attemptsLeft": SHAKE_ATTEMPT_CAP }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

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

    fn seed_profile(db: &DbState, id: &str, attempts: i64) {
        let conn = db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO loyalty_profiles (id, name, email, points, shake_attempts, created_at, updated_at)
             VALUES (?1, 'Budi', 'budi@example.com', 120, ?2, datetime('now'), datetime('now'))",
            params![id, attempts],
        )
        .expect("insert profile");
    }

    #[test]
    fn test_parse_percent_descriptor() {
        assert_eq!(VoucherDiscount::parse("20%"), Some(VoucherDiscount::Percent(20)));
        assert_eq!(VoucherDiscount::parse(" 5% "), Some(VoucherDiscount::Percent(5)));
        assert_eq!(VoucherDiscount::parse("100%"), Some(VoucherDiscount::Percent(100)));
    }

    #[test]
    fn test_parse_free_descriptor() {
        assert_eq!(VoucherDiscount::parse("FREE"), Some(VoucherDiscount::Free));
        assert_eq!(VoucherDiscount::parse("free"), Some(VoucherDiscount::Free));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(VoucherDiscount::parse("150%"), None);
        assert_eq!(VoucherDiscount::parse("20"), None);
        assert_eq!(VoucherDiscount::parse("%"), None);
        assert_eq!(VoucherDiscount::parse(""), None);
    }

    #[test]
    fn test_create_voucher_rejects_bad_descriptor() {
        let db = test_db();
        let payload = serde_json::json!({ "title": "Broken", "discount": "lots" });
        let err = create_voucher(&db, &payload).unwrap_err();
        assert!(err.contains("Invalid discount descriptor"));
    }

    #[test]
    fn test_create_and_list_vouchers() {
        let db = test_db();
        create_voucher(
            &db,
            &serde_json::json!({ "title": "Weekend 20", "discount": "20%" }),
        )
        .unwrap();
        create_voucher(
            &db,
            &serde_json::json!({ "title": "On the house", "discount": "FREE" }),
        )
        .unwrap();

        let vouchers = list_vouchers(&db, false).unwrap();
        assert_eq!(vouchers.len(), 2);
    }

    #[test]
    fn test_update_voucher_clears_expiry_with_empty_string() {
        let db = test_db();
        create_voucher(
            &db,
            &serde_json::json!({
                "title": "Weekend 20",
                "discount": "20%",
                "expiresAt": "2099-01-01T00:00:00Z",
            }),
        )
        .unwrap();
        let id = list_vouchers(&db, false).unwrap()[0]["id"]
            .as_str()
            .unwrap()
            .to_string();

        update_voucher(&db, &id, &serde_json::json!({ "expiresAt": "" })).unwrap();
        let voucher = list_vouchers(&db, false).unwrap().remove(0);
        assert!(voucher["expiresAt"].is_null());

        // A payload without the key leaves the expiry alone.
        update_voucher(
            &db,
            &id,
            &serde_json::json!({ "expiresAt": "2099-06-01T00:00:00Z" }),
        )
        .unwrap();
        update_voucher(&db, &id, &serde_json::json!({ "title": "Weekend 25" })).unwrap();
        let voucher = list_vouchers(&db, false).unwrap().remove(0);
        assert_eq!(voucher["expiresAt"], "2099-06-01T00:00:00Z");
        assert_eq!(voucher["title"], "Weekend 25");
    }

    #[test]
    fn test_shake_draw_decrements_attempts() {
        let db = test_db();
        seed_profile(&db, "p1", 3);
        create_voucher(
            &db,
            &serde_json::json!({ "title": "Weekend 20", "discount": "20%" }),
        )
        .unwrap();

        let result = shake_draw(&db, "p1").unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["attemptsLeft"], 2);
        assert_eq!(result["voucher"]["title"], "Weekend 20");

        // Draw alone persists nothing on the profile
        let conn = db.conn.lock().unwrap();
        let active: Option<String> = conn
            .query_row(
                "SELECT active_voucher FROM loyalty_profiles WHERE id = 'p1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(active.is_none());
    }

    #[test]
    fn test_shake_draw_rejected_at_zero_attempts() {
        let db = test_db();
        seed_profile(&db, "p1", 0);
        create_voucher(
            &db,
            &serde_json::json!({ "title": "Weekend 20", "discount": "20%" }),
        )
        .unwrap();

        let err = shake_draw(&db, "p1").unwrap_err();
        assert!(err.contains("No shake attempts left"));
    }

    #[test]
    fn test_shake_draw_skips_expired_vouchers() {
        let db = test_db();
        seed_profile(&db, "p1", 3);
        create_voucher(
            &db,
            &serde_json::json!({
                "title": "Long gone",
                "discount": "10%",
                "expiresAt": "2000-01-01T00:00:00Z",
            }),
        )
        .unwrap();

        let err = shake_draw(&db, "p1").unwrap_err();
        assert!(err.contains("No vouchers available"));
    }

    #[test]
    fn test_claim_sets_active_voucher_snapshot() {
        let db = test_db();
        seed_profile(&db, "p1", 3);
        create_voucher(
            &db,
            &serde_json::json!({ "title": "Weekend 20", "discount": "20%" }),
        )
        .unwrap();
        let voucher_id = list_vouchers(&db, false).unwrap()[0]["id"]
            .as_str()
            .unwrap()
            .to_string();

        claim_voucher(&db, "p1", &voucher_id).unwrap();

        // Deleting the catalog entry leaves the claimed snapshot intact
        delete_voucher(&db, &voucher_id).unwrap();
        let conn = db.conn.lock().unwrap();
        let active: String = conn
            .query_row(
                "SELECT active_voucher FROM loyalty_profiles WHERE id = 'p1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        let snapshot: Value = serde_json::from_str(&active).unwrap();
        assert_eq!(snapshot["title"], "Weekend 20");
        assert_eq!(snapshot["discount"], "20%");
    }

    #[test]
    fn test_reset_attempts() {
        let db = test_db();
        seed_profile(&db, "p1", 0);
        let result = reset_shake_attempts(&db, "p1").unwrap();
        assert_eq!(result["attemptsLeft"], SHAKE_ATTEMPT_CAP);
    }
}
