//! On-demand backup trigger, laid over [`crate::storage::backup::BackupManager`].
//! The teacher has no equivalent endpoint (it relies on sqlite's own
//! backup tooling); this is new surface grounded directly on
//! `BackupManager::run`'s "checkpoint plus meta.json" behavior rather
//! than on any teacher file.

use super::{AppState, ErrorResult};
use crate::storage::backup::{BackupInfo, BackupManager};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Serialize)]
pub struct BackupResponse {
    pub path: String,
    pub last_trxid: u64,
}

fn manager(state: &AppState) -> BackupManager {
    BackupManager::new(state.backup_dir.to_path_buf())
}

pub async fn trigger_backup(State(state): State<AppState>) -> Response {
    let now_unix = SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs();
    match manager(&state).run(&state.engine, now_unix) {
        Ok(path) => {
            let last_trxid = state.engine.last_assigned_trxid();
            (
                StatusCode::OK,
                Json(BackupResponse { path: path.display().to_string(), last_trxid }),
            )
                .into_response()
        }
        Err(e) => (StatusCode::CONFLICT, Json(ErrorResult { message: e.to_string() })).into_response(),
    }
}

pub async fn list_backups(State(state): State<AppState>) -> Response {
    match manager(&state).list() {
        Ok(backups) => Json(backups).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResult { message: e.to_string() })).into_response(),
    }
}

pub async fn get_backup(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    respond(manager(&state).get(&name))
}

pub async fn purge_backup(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match manager(&state).purge(&name) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RestoreRequest {
    /// Restore into this path instead of the live storage directory.
    /// Left unset, restore refuses to run -- overwriting a running
    /// engine's own storage path out from under it would corrupt the
    /// live database, and this server has no code path that stops the
    /// DNS/replication tasks first.
    pub target_dir: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RestoreResponse {
    pub last_trxid: u64,
}

pub async fn restore_backup(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<RestoreRequest>,
) -> Response {
    let Some(target_dir) = request.target_dir else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResult { message: "target_dir is required; restoring over the live storage path in place is not supported".into() }),
        )
            .into_response();
    };
    match manager(&state).restore(&name, target_dir) {
        Ok(meta) => Json(RestoreResponse { last_trxid: meta.last_trxid }).into_response(),
        Err(e) => error_response(e),
    }
}

fn respond(result: Result<BackupInfo, crate::error::NsblastError>) -> Response {
    match result {
        Ok(info) => Json(info).into_response(),
        Err(e) => error_response(e),
    }
}

fn error_response(e: crate::error::NsblastError) -> Response {
    let status = match e {
        crate::error::NsblastError::NotFound(_) => StatusCode::NOT_FOUND,
        crate::error::NsblastError::Constraint(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResult { message: e.to_string() })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ack_timer::AckTimerConfig;
    use crate::notifier::Notifier;
    use crate::storage::Engine;
    use std::sync::{Arc, RwLock};
    use tempfile::tempdir;

    fn test_state(dir: &tempfile::TempDir, backup_dir: &tempfile::TempDir) -> AppState {
        let engine = Arc::new(Engine::open(dir.path()).unwrap());
        AppState {
            engine,
            zones: Arc::new(RwLock::new(crate::zones::ZoneSet::default())),
            admin_password: Arc::from("x"),
            backup_dir: Arc::from(backup_dir.path()),
            notifier: Arc::new(Notifier::new(AckTimerConfig::default())),
        }
    }

    #[tokio::test]
    async fn trigger_backup_writes_a_checkpoint() {
        let dir = tempdir().unwrap();
        let backup_dir = tempdir().unwrap();
        let state = test_state(&dir, &backup_dir);
        let response = trigger_backup(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let mut entries = std::fs::read_dir(backup_dir.path()).unwrap();
        assert!(entries.next().is_some());
    }

    #[tokio::test]
    async fn list_and_purge_roundtrip() {
        let dir = tempdir().unwrap();
        let backup_dir = tempdir().unwrap();
        let state = test_state(&dir, &backup_dir);
        trigger_backup(State(state.clone())).await;

        let listed = list_backups(State(state.clone())).await;
        assert_eq!(listed.into_response().status(), StatusCode::OK);

        let backups = manager(&state).list().unwrap();
        assert_eq!(backups.len(), 1);
        let name = backups[0].name.clone();

        let response = get_backup(State(state.clone()), Path(name.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let response = purge_backup(State(state.clone()), Path(name)).await.into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(manager(&state).list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn restoring_without_a_target_dir_is_rejected() {
        let dir = tempdir().unwrap();
        let backup_dir = tempdir().unwrap();
        let state = test_state(&dir, &backup_dir);
        trigger_backup(State(state.clone())).await;
        let name = manager(&state).list().unwrap()[0].name.clone();

        let response = restore_backup(State(state), Path(name), Json(RestoreRequest::default()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn restore_to_an_explicit_target_dir_succeeds() {
        let dir = tempdir().unwrap();
        let backup_dir = tempdir().unwrap();
        let restore_dir = tempdir().unwrap();
        let state = test_state(&dir, &backup_dir);
        trigger_backup(State(state.clone())).await;
        let name = manager(&state).list().unwrap()[0].name.clone();

        let request = RestoreRequest { target_dir: Some(restore_dir.path().display().to_string()) };
        let response = restore_backup(State(state), Path(name), Json(request)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn getting_an_unknown_backup_is_not_found() {
        let dir = tempdir().unwrap();
        let backup_dir = tempdir().unwrap();
        let state = test_state(&dir, &backup_dir);
        let response = get_backup(State(state), Path("nope".into())).await.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
