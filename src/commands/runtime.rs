use serde_json::Value;
use std::sync::atomic::Ordering;
use tracing::info;

use crate::{db, diagnostics, APP_START_EPOCH};

#[tauri::command]
pub async fn app_get_version() -> Result<String, String> {
    Ok(env!("CARGO_PKG_VERSION").to_string())
}

/// Version, build, platform, and uptime for the About screen.
#[tauri::command]
pub async fn system_get_info() -> Result<Value, String> {
    let mut info = diagnostics::get_about_info();
    let started = APP_START_EPOCH.load(Ordering::Relaxed);
    let uptime = if started > 0 {
        (chrono::Utc::now().timestamp().max(0) as u64).saturating_sub(started)
    } else {
        0
    };
    info["uptimeSecs"] = serde_json::json!(uptime);
    Ok(info)
}

/// Table counts and database stats for the About screen.
#[tauri::command]
pub async fn system_get_health(db: tauri::State<'_, db::DbState>) -> Result<Value, String> {
    diagnostics::get_system_health(&db)
}

#[tauri::command]
pub async fn app_shutdown(app: tauri::AppHandle) -> Result<(), String> {
    info!("Shutdown requested");
    app.exit(0);
    Ok(())
}
