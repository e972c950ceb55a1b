//! First-run demo data for BrewDesk.
//!
//! A fresh install seeds a small menu, a voucher pool for the shake game,
//! a rewards catalog, and one demo member profile so both the storefront
//! and the back office render something immediately. Seeding only runs
//! when the menu catalog is empty, so user edits are never clobbered.

use chrono::Utc;
use rusqlite::params;
use tracing::info;

use crate::db::DbState;
use crate::vouchers::SHAKE_ATTEMPT_CAP;

/// Demo member id, stable so the storefront can preselect it.
pub const DEMO_PROFILE_ID: &str = "demo-member";

struct SeedItem {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    price: i64,
    category: &'static str,
    popular: bool,
}

const SEED_MENU: &[SeedItem] = &[
    SeedItem {
        id: "espresso",
        name: "Espresso",
        description: "Double shot, dark roast",
        price: 18_000,
        category: "signature-coffee",
        popular: true,
    },
    SeedItem {
        id: "cafe-latte",
        name: "Cafe Latte",
        description: "Espresso with steamed milk",
        price: 28_000,
        category: "signature-coffee",
        popular: true,
    },
    SeedItem {
        id: "caramel-macchiato",
        name: "Caramel Macchiato",
        description: "Vanilla, steamed milk, caramel drizzle",
        price: 32_000,
        category: "signature-coffee",
        popular: false,
    },
    SeedItem {
        id: "matcha-latte",
        name: "Matcha Latte",
        description: "Ceremonial grade matcha with milk",
        price: 30_000,
        category: "non-coffee",
        popular: true,
    },
    SeedItem {
        id: "chocolate-frappe",
        name: "Chocolate Frappe",
        description: "Blended ice chocolate with whipped cream",
        price: 29_000,
        category: "non-coffee",
        popular: false,
    },
    SeedItem {
        id: "butter-croissant",
        name: "Butter Croissant",
        description: "Baked fresh daily",
        price: 22_000,
        category: "snacks",
        popular: false,
    },
    SeedItem {
        id: "banana-bread",
        name: "Banana Bread",
        description: "House recipe, walnut topping",
        price: 24_000,
        category: "snacks",
        popular: false,
    },
];

const SEED_VOUCHERS: &[(&str, &str, &str)] = &[
    ("Weekday 10", "10%", "10% off, any weekday order"),
    ("Weekend 20", "20%", "20% off weekend treats"),
    ("Lucky 50", "50%", "Half price, lucky shake"),
    ("On the House", "FREE", "Whole order on us"),
];

const SEED_REWARDS: &[(&str, &str, i64)] = &[
    ("Free Espresso", "Any single espresso shot", 100),
    ("Free Croissant", "One fresh butter croissant", 150),
    ("Free Signature Drink", "Any signature coffee, any size", 300),
];

/// Seed the demo catalog on an empty database. Idempotent: any existing
/// menu row skips the whole pass.
pub fn seed_if_empty(db: &DbState) -> Result<(), String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let menu_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM menu_items", [], |row| row.get(0))
        .map_err(|e| e.to_string())?;
    if menu_count > 0 {
        return Ok(());
    }

    let now = Utc::now().to_rfc3339();

    for item in SEED_MENU {
        conn.execute(
            "INSERT INTO menu_items (id, name, description, price, category, is_popular, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                item.id,
                item.name,
                item.description,
                item.price,
                item.category,
                item.popular as i64,
                now
            ],
        )
        .map_err(|e| format!("seed menu item {}: {e}", item.id))?;
    }

    for (idx, (title, discount, description)) in SEED_VOUCHERS.iter().enumerate() {
        conn.execute(
            "INSERT INTO vouchers (id, title, discount, description, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
            params![format!("voucher-{}", idx + 1), title, discount, description, now],
        )
        .map_err(|e| format!("seed voucher {title}: {e}"))?;
    }

    for (idx, (name, description, cost)) in SEED_REWARDS.iter().enumerate() {
        conn.execute(
            "INSERT INTO rewards (id, name, description, points_cost, is_available, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
            params![format!("reward-{}", idx + 1), name, description, cost, now],
        )
        .map_err(|e| format!("seed reward {name}: {e}"))?;
    }

    conn.execute(
        "INSERT INTO loyalty_profiles (id, name, email, points, level, shake_attempts, created_at, updated_at)
         VALUES (?1, 'Demo Member', 'demo@brewdesk.local', 120, 'Bronze', ?2, ?3, ?3)",
        params![DEMO_PROFILE_ID, SHAKE_ATTEMPT_CAP, now],
    )
    .map_err(|e| format!("seed demo profile: {e}"))?;

    info!(
        menu_items = SEED_MENU.len(),
        vouchers = SEED_VOUCHERS.len(),
        rewards = SEED_REWARDS.len(),
        "Seeded demo data"
    );
    Ok(())
}
