//! Liveness and capability endpoints.

use axum::response::Json;
use chrono::Utc;

use loom_domain::style::StoryStyle;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /health
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /styles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn styles() -> Json<serde_json::Value> {
    let styles: Vec<serde_json::Value> = StoryStyle::ALL
        .iter()
        .map(|s| {
            serde_json::json!({
                "id": s.id(),
                "name": s.name(),
                "description": s.description(),
                "max_tokens": s.max_tokens(),
            })
        })
        .collect();
    Json(serde_json::json!({ "styles": styles }))
}
