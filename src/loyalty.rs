//! Loyalty engine: member profiles, point levels, reward redemptions.
//!
//! Points are the single scarce resource. They are deducted the moment a
//! redemption is requested and the redemption record starts `pending`
//! for staff fulfilment. An insufficient balance rejects the request
//! outright, leaving no record. Points never go negative; the schema
//! CHECK backs up the code guard.

use chrono::Utc;
use rusqlite::params;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DbState;
use crate::vouchers::SHAKE_ATTEMPT_CAP;

/// Level thresholds in lifetime points. Labels are cosmetic; no pricing
/// rule keys off them.
const LEVEL_SILVER: i64 = 1_000;
const LEVEL_GOLD: i64 = 5_000;

pub fn level_for_points(points: i64) -> &'static str {
    if points >= LEVEL_GOLD {
        "Gold"
    } else if points >= LEVEL_SILVER {
        "Silver"
    } else {
        "Bronze"
    }
}

/// Points target shown on the profile card: the next level boundary, or
/// the Gold threshold once reached.
fn goal_for_points(points: i64) -> i64 {
    if points >= LEVEL_GOLD {
        LEVEL_GOLD
    } else if points >= LEVEL_SILVER {
        LEVEL_GOLD
    } else {
        LEVEL_SILVER
    }
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

const PROFILE_COLUMNS: &str =
    "id, name, email, points, goal_points, level, shake_attempts, active_voucher, created_at, updated_at";

fn profile_row_to_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    let active_voucher_raw: Option<String> = row.get(7)?;
    let active_voucher = active_voucher_raw
        .and_then(|s| serde_json::from_str::<Value>(&s).ok())
        .unwrap_or(Value::Null);
    Ok(serde_json::json!({
        "id": row.get::<_, String>(0)?,
        "name": row.get::<_, String>(1)?,
        "email": row.get::<_, String>(2)?,
        "points": row.get::<_, i64>(3)?,
        "goalPoints": row.get::<_, i64>(4)?,
        "level": row.get::<_, String>(5)?,
        "shakeAttempts": row.get::<_, i64>(6)?,
        "activeVoucher": active_voucher,
        "createdAt": row.get::<_, String>(8)?,
        "updatedAt": row.get::<_, String>(9)?,
    }))
}

pub fn get_profile(db: &DbState, profile_id: &str) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    conn.query_row(
        &format!("SELECT {PROFILE_COLUMNS} FROM loyalty_profiles WHERE id = ?1"),
        params![profile_id],
        |row| profile_row_to_json(row),
    )
    .map_err(|_| format!("Profile not found: {profile_id}"))
}

pub fn list_profiles(db: &DbState) -> Result<Vec<Value>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {PROFILE_COLUMNS} FROM loyalty_profiles ORDER BY name COLLATE NOCASE"
        ))
        .map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map([], |row| profile_row_to_json(row))
        .map_err(|e| e.to_string())?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Register a member profile. Starts at zero points, Bronze, with a full
/// set of shake attempts.
pub fn create_profile(db: &DbState, payload: &Value) -> Result<Value, String> {
    let name = payload
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or("Profile name is required")?;
    let email = payload
        .get("email")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim();

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    conn.execute(
        "INSERT INTO loyalty_profiles
            (id, name, email, points, goal_points, level, shake_attempts, created_at, updated_at)
         VALUES (?1, ?2, ?3, 0, ?4, 'Bronze', ?5, ?6, ?6)",
        params![id, name, email, LEVEL_SILVER, SHAKE_ATTEMPT_CAP, now],
    )
    .map_err(|e| format!("create profile: {e}"))?;
    drop(conn);

    info!(profile_id = %id, name = %name, "Loyalty profile created");
    get_profile(db, &id)
}

/// Adjust a profile's points by `delta` (positive or negative) and
/// recompute level and goal. The balance is clamped at zero.
pub fn award_points(db: &DbState, profile_id: &str, delta: i64) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let current: i64 = conn
        .query_row(
            "SELECT points FROM loyalty_profiles WHERE id = ?1",
            params![profile_id],
            |row| row.get(0),
        )
        .map_err(|_| format!("Profile not found: {profile_id}"))?;

    let new_points = (current + delta).max(0);
    let level = level_for_points(new_points);
    let goal = goal_for_points(new_points);
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "UPDATE loyalty_profiles
         SET points = ?1, level = ?2, goal_points = ?3, updated_at = ?4
         WHERE id = ?5",
        params![new_points, level, goal, now, profile_id],
    )
    .map_err(|e| format!("update points: {e}"))?;
    drop(conn);

    info!(profile_id = %profile_id, delta = delta, points = new_points, level = level, "Points updated");
    get_profile(db, profile_id)
}

// ---------------------------------------------------------------------------
// Rewards catalog
// ---------------------------------------------------------------------------

const REWARD_COLUMNS: &str =
    "id, name, description, points_cost, image_ref, is_available, created_at, updated_at";

fn reward_row_to_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    Ok(serde_json::json!({
        "id": row.get::<_, String>(0)?,
        "name": row.get::<_, String>(1)?,
        "description": row.get::<_, String>(2)?,
        "pointsCost": row.get::<_, i64>(3)?,
        "imageRef": row.get::<_, String>(4)?,
        "isAvailable": row.get::<_, i64>(5)? != 0,
        "createdAt": row.get::<_, String>(6)?,
        "updatedAt": row.get::<_, String>(7)?,
    }))
}

/// Rewards catalog. Storefront passes `include_unavailable = false`.
pub fn list_rewards(db: &DbState, include_unavailable: bool) -> Result<Vec<Value>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let sql = if include_unavailable {
        format!("SELECT {REWARD_COLUMNS} FROM rewards ORDER BY points_cost, name")
    } else {
        format!(
            "SELECT {REWARD_COLUMNS} FROM rewards WHERE is_available = 1 ORDER BY points_cost, name"
        )
    };
    let mut stmt = conn.prepare(&sql).map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map([], |row| reward_row_to_json(row))
        .map_err(|e| e.to_string())?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn create_reward(db: &DbState, payload: &Value) -> Result<Value, String> {
    let name = payload
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or("Reward name is required")?;
    let points_cost = payload
        .get("pointsCost")
        .or_else(|| payload.get("points_cost"))
        .and_then(Value::as_i64)
        .unwrap_or(0);
    if points_cost < 0 {
        return Err("Reward cost cannot be negative".to_string());
    }
    let description = payload
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("");
    let image_ref = payload
        .get("imageRef")
        .or_else(|| payload.get("image_ref"))
        .and_then(Value::as_str)
        .unwrap_or("");
    let is_available = payload
        .get("isAvailable")
        .or_else(|| payload.get("is_available"))
        .and_then(Value::as_bool)
        .unwrap_or(true);

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    conn.execute(
        "INSERT INTO rewards (id, name, description, points_cost, image_ref, is_available, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![id, name, description, points_cost, image_ref, is_available as i64, now],
    )
    .map_err(|e| format!("create reward: {e}"))?;

    conn.query_row(
        &format!("SELECT {REWARD_COLUMNS} FROM rewards WHERE id = ?1"),
        params![id],
        |row| reward_row_to_json(row),
    )
    .map_err(|e| e.to_string())
}

pub fn update_reward(db: &DbState, reward_id: &str, payload: &Value) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let now = Utc::now().to_rfc3339();

    if let Some(name) = payload.get("name").and_then(Value::as_str) {
        conn.execute(
            "UPDATE rewards SET name = ?1, updated_at = ?2 WHERE id = ?3",
            params![name.trim(), now, reward_id],
        )
        .map_err(|e| e.to_string())?;
    }
    if let Some(description) = payload.get("description").and_then(Value::as_str) {
        conn.execute(
            "UPDATE rewards SET description = ?1, updated_at = ?2 WHERE id = ?3",
            params![description, now, reward_id],
        )
        .map_err(|e| e.to_string())?;
    }
    if let Some(cost) = payload
        .get("pointsCost")
        .or_else(|| payload.get("points_cost"))
        .and_then(Value::as_i64)
    {
        if cost < 0 {
            return Err("Reward cost cannot be negative".to_string());
        }
        conn.execute(
            "UPDATE rewards SET points_cost = ?1, updated_at = ?2 WHERE id = ?3",
            params![cost, now, reward_id],
        )
        .map_err(|e| e.to_string())?;
    }
    if let Some(image_ref) = payload
        .get("imageRef")
        .or_else(|| payload.get("image_ref"))
        .and_then(Value::as_str)
    {
        conn.execute(
            "UPDATE rewards SET image_ref = ?1, updated_at = ?2 WHERE id = ?3",
            params![image_ref, now, reward_id],
        )
        .map_err(|e| e.to_string())?;
    }
    if let Some(available) = payload
        .get("isAvailable")
        .or_else(|| payload.get("is_available"))
        .and_then(Value::as_bool)
    {
        conn.execute(
            "UPDATE rewards SET is_available = ?1, updated_at = ?2 WHERE id = ?3",
            params![available as i64, now, reward_id],
        )
        .map_err(|e| e.to_string())?;
    }

    conn.query_row(
        &format!("SELECT {REWARD_COLUMNS} FROM rewards WHERE id = ?1"),
        params![reward_id],
        |row| reward_row_to_json(row),
    )
    .map_err(|_| format!("Reward not found: {reward_id}"))
}

pub fn delete_reward(db: &DbState, reward_id: &str) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let affected = conn
        .execute("DELETE FROM rewards WHERE id = ?1", params![reward_id])
        .map_err(|e| format!("delete reward: {e}"))?;
    if affected == 0 {
        return Err(format!("Reward not found: {reward_id}"));
    }
    Ok(serde_json::json!({ "success": true, "rewardId": reward_id }))
}

// ---------------------------------------------------------------------------
// Redemptions
// ---------------------------------------------------------------------------

const REDEMPTION_COLUMNS: &str =
    "id, profile_id, customer_name, reward_id, reward_name, points_cost, status, created_at, updated_at";

fn redemption_row_to_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    Ok(serde_json::json!({
        "id": row.get::<_, String>(0)?,
        "profileId": row.get::<_, String>(1)?,
        "customerName": row.get::<_, String>(2)?,
        "rewardId": row.get::<_, String>(3)?,
        "rewardName": row.get::<_, String>(4)?,
        "pointsCost": row.get::<_, i64>(5)?,
        "status": row.get::<_, String>(6)?,
        "createdAt": row.get::<_, String>(7)?,
        "updatedAt": row.get::<_, String>(8)?,
    }))
}

/// All redemptions, newest first.
pub fn list_redemptions(db: &DbState) -> Result<Vec<Value>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {REDEMPTION_COLUMNS} FROM redemptions ORDER BY created_at DESC, id DESC"
        ))
        .map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map([], |row| redemption_row_to_json(row))
        .map_err(|e| e.to_string())?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Redeem a reward for a profile.
///
/// Deducts the cost atomically with inserting the pending record; an
/// insufficient balance is rejected before anything is written. The
/// record denormalizes the reward name and cost so later catalog edits
/// never rewrite history.
pub fn redeem_reward(db: &DbState, profile_id: &str, reward_id: &str) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let (profile_name, points): (String, i64) = conn
        .query_row(
            "SELECT name, points FROM loyalty_profiles WHERE id = ?1",
            params![profile_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(|_| format!("Profile not found: {profile_id}"))?;

    let (reward_name, cost, available): (String, i64, i64) = conn
        .query_row(
            "SELECT name, points_cost, is_available FROM rewards WHERE id = ?1",
            params![reward_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .map_err(|_| format!("Reward not found: {reward_id}"))?;

    if available == 0 {
        return Err(format!("Reward is not available: {reward_name}"));
    }
    if points < cost {
        return Err(format!(
            "Not enough points: have {points}, need {cost} for {reward_name}"
        ));
    }

    let remaining = points - cost;
    let now = Utc::now().to_rfc3339();
    let redemption_id = Uuid::new_v4().to_string();

    conn.execute(
        "UPDATE loyalty_profiles
         SET points = ?1, level = ?2, goal_points = ?3, updated_at = ?4
         WHERE id = ?5",
        params![
            remaining,
            level_for_points(remaining),
            goal_for_points(remaining),
            now,
            profile_id
        ],
    )
    .map_err(|e| format!("deduct points: {e}"))?;

    conn.execute(
        "INSERT INTO redemptions
            (id, profile_id, customer_name, reward_id, reward_name, points_cost, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?7)",
        params![redemption_id, profile_id, profile_name, reward_id, reward_name, cost, now],
    )
    .map_err(|e| format!("insert redemption: {e}"))?;

    info!(
        redemption_id = %redemption_id,
        profile_id = %profile_id,
        reward = %reward_name,
        cost = cost,
        remaining = remaining,
        "Reward redeemed"
    );

    conn.query_row(
        &format!("SELECT {REDEMPTION_COLUMNS} FROM redemptions WHERE id = ?1"),
        params![redemption_id],
        |row| redemption_row_to_json(row),
    )
    .map_err(|e| e.to_string())
}

/// Move a redemption out of `pending`. Cancelling refunds the points,
/// since they were deducted up front at request time.
pub fn update_redemption_status(
    db: &DbState,
    redemption_id: &str,
    new_status: &str,
) -> Result<Value, String> {
    let next = match new_status.trim().to_lowercase().as_str() {
        "completed" => "completed",
        "cancelled" | "canceled" => "cancelled",
        other => return Err(format!("Unknown redemption status: {other:?}")),
    };

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let (current, profile_id, cost): (String, String, i64) = conn
        .query_row(
            "SELECT status, profile_id, points_cost FROM redemptions WHERE id = ?1",
            params![redemption_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .map_err(|_| format!("Redemption not found: {redemption_id}"))?;

    if current != "pending" {
        return Err(format!(
            "Redemption {redemption_id} is already {current}; only pending redemptions can change"
        ));
    }

    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE redemptions SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![next, now, redemption_id],
    )
    .map_err(|e| format!("update redemption: {e}"))?;
    drop(conn);

    if next == "cancelled" {
        if let Err(e) = award_points(db, &profile_id, cost) {
            warn!(redemption_id = %redemption_id, error = %e, "Refund after cancellation failed");
        }
    }

    info!(redemption_id = %redemption_id, status = next, "Redemption status updated");
    Ok(serde_json::json!({
        "success": true,
        "redemptionId": redemption_id,
        "previousStatus": "pending",
        "status": next,
    }))
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

    fn seed_reward(db: &DbState, id: &str, cost: i64) {
        let conn = db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO rewards (id, name, points_cost, created_at, updated_at)
             VALUES (?1, 'Free Croissant', ?2, datetime('now'), datetime('now'))",
            params![id, cost],
        )
        .expect("insert reward");
    }

    #[test]
    fn test_level_thresholds() {
        assert_eq!(level_for_points(0), "Bronze");
        assert_eq!(level_for_points(999), "Bronze");
        assert_eq!(level_for_points(1_000), "Silver");
        assert_eq!(level_for_points(4_999), "Silver");
        assert_eq!(level_for_points(5_000), "Gold");
        assert_eq!(level_for_points(100_000), "Gold");
    }

    #[test]
    fn test_create_profile_defaults() {
        let db = test_db();
        let p = create_profile(&db, &serde_json::json!({ "name": "Budi" })).unwrap();
        assert_eq!(p["points"], 0);
        assert_eq!(p["level"], "Bronze");
        assert_eq!(p["shakeAttempts"], 3);
        assert!(p["activeVoucher"].is_null());
    }

    #[test]
    fn test_create_profile_requires_name() {
        let db = test_db();
        assert!(create_profile(&db, &serde_json::json!({ "name": "  " })).is_err());
        assert!(create_profile(&db, &serde_json::json!({})).is_err());
    }

    #[test]
    fn test_award_points_recomputes_level() {
        let db = test_db();
        let p = create_profile(&db, &serde_json::json!({ "name": "Budi" })).unwrap();
        let id = p["id"].as_str().unwrap();

        let p = award_points(&db, id, 1_200).unwrap();
        assert_eq!(p["points"], 1_200);
        assert_eq!(p["level"], "Silver");
        assert_eq!(p["goalPoints"], 5_000);

        let p = award_points(&db, id, 4_000).unwrap();
        assert_eq!(p["level"], "Gold");
    }

    #[test]
    fn test_award_points_clamps_at_zero() {
        let db = test_db();
        let p = create_profile(&db, &serde_json::json!({ "name": "Budi" })).unwrap();
        let id = p["id"].as_str().unwrap();

        award_points(&db, id, 50).unwrap();
        let p = award_points(&db, id, -500).unwrap();
        assert_eq!(p["points"], 0);
        assert_eq!(p["level"], "Bronze");
    }

    #[test]
    fn test_redeem_deducts_and_records_pending() {
        let db = test_db();
        let p = create_profile(&db, &serde_json::json!({ "name": "Budi" })).unwrap();
        let pid = p["id"].as_str().unwrap();
        award_points(&db, pid, 500).unwrap();
        seed_reward(&db, "r1", 300);

        let r = redeem_reward(&db, pid, "r1").unwrap();
        assert_eq!(r["status"], "pending");
        assert_eq!(r["rewardName"], "Free Croissant");
        assert_eq!(r["pointsCost"], 300);

        let p = get_profile(&db, pid).unwrap();
        assert_eq!(p["points"], 200);
    }

    #[test]
    fn test_redeem_insufficient_points_leaves_no_record() {
        let db = test_db();
        let p = create_profile(&db, &serde_json::json!({ "name": "Budi" })).unwrap();
        let pid = p["id"].as_str().unwrap();
        award_points(&db, pid, 100).unwrap();
        seed_reward(&db, "r1", 300);

        let err = redeem_reward(&db, pid, "r1").unwrap_err();
        assert!(err.contains("Not enough points"));

        // No deduction, no record
        assert_eq!(get_profile(&db, pid).unwrap()["points"], 100);
        assert!(list_redemptions(&db).unwrap().is_empty());
    }

    #[test]
    fn test_redemption_snapshot_survives_reward_edits() {
        let db = test_db();
        let p = create_profile(&db, &serde_json::json!({ "name": "Budi" })).unwrap();
        let pid = p["id"].as_str().unwrap();
        award_points(&db, pid, 500).unwrap();
        seed_reward(&db, "r1", 300);
        redeem_reward(&db, pid, "r1").unwrap();

        update_reward(&db, "r1", &serde_json::json!({ "name": "Renamed", "pointsCost": 999 }))
            .unwrap();

        let r = &list_redemptions(&db).unwrap()[0];
        assert_eq!(r["rewardName"], "Free Croissant");
        assert_eq!(r["pointsCost"], 300);
    }

    #[test]
    fn test_redemption_status_transitions() {
        let db = test_db();
        let p = create_profile(&db, &serde_json::json!({ "name": "Budi" })).unwrap();
        let pid = p["id"].as_str().unwrap();
        award_points(&db, pid, 500).unwrap();
        seed_reward(&db, "r1", 300);
        let r = redeem_reward(&db, pid, "r1").unwrap();
        let rid = r["id"].as_str().unwrap();

        update_redemption_status(&db, rid, "completed").unwrap();
        // Terminal: no second transition
        assert!(update_redemption_status(&db, rid, "cancelled").is_err());
    }

    #[test]
    fn test_cancelled_redemption_refunds_points() {
        let db = test_db();
        let p = create_profile(&db, &serde_json::json!({ "name": "Budi" })).unwrap();
        let pid = p["id"].as_str().unwrap();
        award_points(&db, pid, 500).unwrap();
        seed_reward(&db, "r1", 300);
        let r = redeem_reward(&db, pid, "r1").unwrap();
        let rid = r["id"].as_str().unwrap();

        update_redemption_status(&db, rid, "cancelled").unwrap();
        assert_eq!(get_profile(&db, pid).unwrap()["points"], 500);
    }

    #[test]
    fn test_unavailable_reward_rejected() {
        let db = test_db();
        let p = create_profile(&db, &serde_json::json!({ "name": "Budi" })).unwrap();
        let pid = p["id"].as_str().unwrap();
        award_points(&db, pid, 500).unwrap();
        seed_reward(&db, "r1", 300);
        update_reward(&db, "r1", &serde_json::json!({ "isAvailable": false })).unwrap();

        assert!(redeem_reward(&db, pid, "r1").is_err());
    }

    #[test]
    fn test_storefront_reward_list_hides_unavailable() {
        let db = test_db();
        seed_reward(&db, "r1", 300);
        seed_reward(&db, "r2", 100);
        update_reward(&db, "r1", &serde_json::json!({ "isAvailable": false })).unwrap();

        assert_eq!(list_rewards(&db, false).unwrap().len(), 1);
        assert_eq!(list_rewards(&db, true).unwrap().len(), 2);
    }
}
