//! The admin REST control plane. Adapted from the teacher's axum
//! `Router`/`Extension<SharedState>` web API: the shape (a `Router`
//! built from per-resource modules, a shared app state extension, an
//! `ErrorResult` JSON error body) survives, but the teacher's
//! session-cookie/OAuth2 auth is replaced with the single shared-secret
//! bearer check this server's design calls for, and zone data is read
//! from the storage engine instead of a sqlite pool.

pub mod auth;
pub mod backup;
pub mod tenants;
pub mod zones;

use crate::notifier::Notifier;
use crate::storage::Engine;
use crate::zones::ZoneSet;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post, put};
use axum::Router;
use serde::Serialize;
use std::sync::{Arc, RwLock};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub zones: Arc<RwLock<ZoneSet>>,
    pub admin_password: Arc<str>,
    pub backup_dir: Arc<std::path::Path>,
    /// Shared with the DNS server's own NOTIFY path: a REST mutation
    /// fires the same sender a committed zone change would.
    pub notifier: Arc<Notifier>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResult {
    pub message: String,
}

pub fn new(state: AppState) -> Router {
    Router::new()
        .route("/zones", get(zones::list_zones).post(zones::create_zone))
        .route(
            "/zones/{apex}",
            get(zones::get_zone).put(zones::update_zone).delete(zones::delete_zone),
        )
        .route("/zones/{apex}/transfer", post(zones::trigger_transfer))
        .route(
            "/zones/{apex}/rrsets/{fqdn}",
            get(zones::list_rrsets).post(zones::create_rrset).delete(zones::delete_rrset),
        )
        .route("/backup", post(backup::trigger_backup))
        .route("/backups", get(backup::list_backups))
        .route("/backups/{name}", get(backup::get_backup).delete(backup::purge_backup))
        .route("/backups/{name}/restore", put(backup::restore_backup))
        .route("/tenants/{tenant}/zones", get(tenants::list_tenant_zones))
        .route("/tenants/{tenant}/rrsets", get(tenants::list_tenant_rrsets))
        .route("/version", get(version))
        .layer(from_fn_with_state(state.clone(), auth::check_auth))
        .with_state(state)
}

#[derive(Serialize)]
struct VersionResponse {
    version: String,
}

async fn version() -> axum::Json<VersionResponse> {
    axum::Json(VersionResponse { version: format!("nsblast {}", env!("CARGO_PKG_VERSION")) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::tempdir;
    use tower::ServiceExt;

    fn test_state() -> (tempfile::TempDir, AppState) {
        let dir = tempdir().unwrap();
        let engine = Arc::new(Engine::open(dir.path()).unwrap());
        let state = AppState {
            engine,
            zones: Arc::new(RwLock::new(ZoneSet::default())),
            admin_password: Arc::from("hunter2"),
            backup_dir: Arc::from(dir.path()),
            notifier: Arc::new(Notifier::new(crate::ack_timer::AckTimerConfig::default())),
        };
        (dir, state)
    }

    #[tokio::test]
    async fn version_endpoint_requires_no_auth_but_is_still_routed() {
        let (_dir, state) = test_state();
        let app = new(state);
        let request = Request::builder()
            .uri("/version")
            .header("authorization", "Bearer hunter2")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_bearer_token_is_rejected() {
        let (_dir, state) = test_state();
        let app = new(state);
        let request = Request::builder().uri("/version").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
