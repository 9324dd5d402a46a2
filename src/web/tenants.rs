//! Tenant-scoped read surface: "what has this account got, across every
//! zone it owns" without the caller needing to already know the zone
//! list. Grounded on `storage::key::Class::TenantZone`/`Zrr`'s own doc
//! comments -- those classes exist purely to make this kind of
//! account-wide listing a single prefix scan instead of a walk over
//! every zone this server hosts.

use super::{AppState, ErrorResult};
use crate::storage::codec::Entry;
use crate::storage::engine::Category;
use crate::storage::key;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct TenantZoneSummary {
    pub apex: String,
}

pub async fn list_tenant_zones(State(state): State<AppState>, Path(tenant): Path<String>) -> Response {
    let txn = state.engine.begin();
    let prefix = key::tenant_zone_prefix(&tenant);
    match txn.iterate(&prefix, Category::Account) {
        Ok(rows) => {
            let apexes: Vec<TenantZoneSummary> = rows
                .iter()
                .filter_map(|(k, _)| apex_from_tenant_scoped_key(&prefix, k))
                .map(|apex| TenantZoneSummary { apex })
                .collect();
            Json(apexes).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResult { message: e.to_string() })).into_response(),
    }
}

#[derive(Debug, Serialize)]
pub struct TenantRrsetSummary {
    pub fqdn: String,
    pub types: Vec<String>,
}

pub async fn list_tenant_rrsets(State(state): State<AppState>, Path(tenant): Path<String>) -> Response {
    let txn = state.engine.begin();
    let prefix = key::zrr_prefix(&tenant);
    let rows = match txn.iterate(&prefix, Category::Account) {
        Ok(rows) => rows,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResult { message: e.to_string() })).into_response(),
    };

    let mut summaries = Vec::with_capacity(rows.len());
    for (k, _) in &rows {
        let Some(fqdn) = apex_from_tenant_scoped_key(&prefix, k) else { continue };
        let types = match txn.read(&key::entry_key(&fqdn), Category::Entry) {
            Ok(Some(bytes)) => match Entry::parse(&bytes) {
                Ok(entry) if !entry.is_tombstone() => {
                    entry.rrs.iter().map(|rr| format!("{:?}", rr.rtype)).collect()
                }
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        summaries.push(TenantRrsetSummary { fqdn, types });
    }
    Json(summaries).into_response()
}

/// Strip a tenant-scoped key's `CLASS || tenant || '/'` prefix, leaving
/// the literal fqdn the row is addressed by.
fn apex_from_tenant_scoped_key(prefix: &[u8], key: &[u8]) -> Option<String> {
    let rest = key.strip_prefix(prefix)?;
    std::str::from_utf8(rest).ok().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::zones::{create_rrset, create_zone, CreateRrsetRequest, CreateZoneRequest, RrsetData};
    use crate::ack_timer::AckTimerConfig;
    use crate::notifier::Notifier;
    use crate::storage::Engine;
    use std::sync::{Arc, RwLock};
    use tempfile::tempdir;

    fn test_state() -> (tempfile::TempDir, AppState) {
        let dir = tempdir().unwrap();
        let engine = Arc::new(Engine::open(dir.path()).unwrap());
        let state = AppState {
            engine,
            zones: Arc::new(RwLock::new(crate::zones::ZoneSet::default())),
            admin_password: Arc::from("x"),
            backup_dir: Arc::from(dir.path()),
            notifier: Arc::new(Notifier::new(AckTimerConfig::default())),
        };
        (dir, state)
    }

    fn create_request() -> CreateZoneRequest {
        CreateZoneRequest {
            apex: "example.com".into(),
            rname: "hostmaster.example.com".into(),
            refresh: 3600,
            retry: 600,
            expire: 604_800,
            minimum: 300,
            ttl: 3600,
            notify_targets: Vec::new(),
            tenant: "acme".into(),
        }
    }

    #[tokio::test]
    async fn tenant_zone_listing_reflects_created_zones() {
        let (_dir, state) = test_state();
        create_zone(State(state.clone()), Json(create_request())).await;

        let response = list_tenant_zones(State(state.clone()), Path("acme".into())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let other = list_tenant_zones(State(state), Path("beta".into())).await.into_response();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn tenant_rrset_listing_spans_every_owned_zone() {
        let (_dir, state) = test_state();
        create_zone(State(state.clone()), Json(create_request())).await;
        create_rrset(
            State(state.clone()),
            Path(("example.com".into(), "www.example.com".into())),
            Json(CreateRrsetRequest { ttl: 300, rdata: RrsetData::A { address: "10.0.0.1".parse().unwrap() } }),
        )
        .await;

        let txn = state.engine.begin();
        let rows = txn.iterate(&key::zrr_prefix("acme"), Category::Account).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
