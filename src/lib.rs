//! BrewDesk - Tauri v2 Backend
//!
//! This module registers all IPC command handlers that the frontend calls
//! via `@tauri-apps/api/core::invoke()`. The storefront (menu, cart,
//! checkout, loyalty, shake game) and the admin back office (catalogs,
//! orders, redemptions, POS cashier flow) share the same command surface;
//! the frontend decides which screens expose which commands.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// App start time for uptime calculation (epoch seconds).
pub(crate) static APP_START_EPOCH: AtomicU64 = AtomicU64::new(0);

/// Interval for the pending-order expiry tick.
const EXPIRY_TICK_SECS: u64 = 1;

mod cart;
mod commands;
mod data_helpers;
mod db;
mod demo;
mod diagnostics;
mod loyalty;
mod menu;
mod orders;
mod vouchers;

pub(crate) fn value_str(v: &serde_json::Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = v.get(*key).and_then(|x| x.as_str()) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

pub(crate) fn value_i64(v: &serde_json::Value, keys: &[&str]) -> Option<i64> {
    for key in keys {
        if let Some(n) = v.get(*key).and_then(|x| x.as_i64()) {
            return Some(n);
        }
    }
    None
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Record start time for uptime tracking
    let epoch = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    APP_START_EPOCH.store(epoch, Ordering::Relaxed);

    // Initialize structured logging (console + rolling file)
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,brewdesk_lib=debug"));

    // Prune old log files before setting up the appender
    diagnostics::prune_old_logs();

    // Rolling file appender: creates daily log files in the logs directory
    let log_dir = diagnostics::get_log_dir();
    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(&log_dir, "brewdesk");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    // Keep the guard alive for the lifetime of the app — dropping it flushes logs.
    // We leak it intentionally since the app runs until process exit.
    std::mem::forget(_guard);

    info!("Starting BrewDesk v{}", env!("CARGO_PKG_VERSION"));

    tauri::Builder::default()
        .setup(|app| {
            use tauri::Manager;

            let app_data_dir = app
                .path()
                .app_data_dir()
                .expect("Failed to get app data dir");

            // Main DB connection for Tauri commands
            let db_state = db::init(&app_data_dir).expect("Failed to initialize database");

            // First run: seed the demo catalog so both surfaces render
            if let Err(e) = demo::seed_if_empty(&db_state) {
                tracing::warn!("Demo seed failed: {e}");
            }

            app.manage(db_state);

            // Start the pending-order expiry tick (1s interval)
            orders::start_expiry_loop(app.handle().clone(), EXPIRY_TICK_SECS);

            info!("Database and expiry loop registered");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // App lifecycle
            commands::runtime::app_get_version,
            commands::runtime::app_shutdown,
            commands::runtime::system_get_info,
            commands::runtime::system_get_health,
            // Settings
            commands::settings::settings_get_all,
            commands::settings::settings_get,
            commands::settings::settings_set,
            // Cart
            commands::cart::cart_add_item,
            commands::cart::cart_remove_item,
            commands::cart::cart_get_summary,
            // Menu catalog
            commands::menu::menu_get_all,
            commands::menu::menu_get_by_id,
            commands::menu::menu_create,
            commands::menu::menu_update,
            commands::menu::menu_delete,
            // Orders
            commands::orders::order_checkout,
            commands::orders::order_get_all,
            commands::orders::order_get_by_id,
            commands::orders::order_get_history,
            commands::orders::order_update_status,
            commands::orders::order_delete,
            commands::orders::order_send_whatsapp,
            // Loyalty
            commands::loyalty::loyalty_get_profile,
            commands::loyalty::loyalty_get_profiles,
            commands::loyalty::loyalty_create_profile,
            commands::loyalty::loyalty_adjust_points,
            commands::loyalty::rewards_get_all,
            commands::loyalty::reward_create,
            commands::loyalty::reward_update,
            commands::loyalty::reward_delete,
            commands::loyalty::redemption_redeem,
            commands::loyalty::redemption_get_all,
            commands::loyalty::redemption_update_status,
            // Vouchers and shake game
            commands::vouchers::voucher_get_all,
            commands::vouchers::voucher_create,
            commands::vouchers::voucher_update,
            commands::vouchers::voucher_delete,
            commands::vouchers::shake_draw,
            commands::vouchers::shake_claim,
            commands::vouchers::shake_reset_attempts,
        ])
        .run(tauri::generate_context!())
        .expect("error while running BrewDesk");
}
