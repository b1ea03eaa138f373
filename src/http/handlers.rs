//! API route handlers.
//!
//! Neither handler inspects the method, and `welcome` also answers every
//! path without a route of its own.

use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct WelcomeBody {
    pub message: &'static str,
}

pub const WELCOME_MESSAGE: &str = "Welcome to Sample API with new ver";

/// `/healthz`. Always healthy.
pub async fn healthz() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

/// `/` and the catch-all.
pub async fn welcome() -> Json<WelcomeBody> {
    Json(WelcomeBody {
        message: WELCOME_MESSAGE,
    })
}
