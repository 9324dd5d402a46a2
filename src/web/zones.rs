//! Zone and RRset CRUD. Grounded on the teacher's `FileZone` `APIEntity`
//! impl (`api_create`/`api_get`/`api_delete`) in shape, not substance:
//! where the teacher inserts a row into a sqlite `zones` table and a
//! matching `FileZoneRecord` per RR, creating a zone here means writing
//! one packed `Entry` (carrying the SOA) at the apex key and registering
//! a `ZoneConfig` in the shared `ZoneSet`; an RRset is a sub-resource of
//! its owner name's `Entry`, added/removed by read-modify-write rather
//! than a dedicated row the way the teacher's per-RR sqlite table works.

use super::{AppState, ErrorResult};
use crate::storage::codec::{Entry, EntryBuilder};
use crate::storage::engine::Category;
use crate::storage::key;
use crate::wire::rdata::{split_into_char_strings, RData, SoaData};
use crate::zones::{ZoneConfig, ZoneRole};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateZoneRequest {
    pub apex: String,
    pub rname: String,
    #[serde(default = "default_refresh")]
    pub refresh: u32,
    #[serde(default = "default_retry")]
    pub retry: u32,
    #[serde(default = "default_expire")]
    pub expire: u32,
    #[serde(default = "default_minimum")]
    pub minimum: u32,
    #[serde(default = "default_soa_ttl")]
    pub ttl: u32,
    #[serde(default)]
    pub notify_targets: Vec<std::net::SocketAddr>,
    #[serde(default = "default_tenant")]
    pub tenant: String,
}

fn default_tenant() -> String {
    "default".to_string()
}

/// Zone-level fields that may be changed after creation. `None` leaves
/// the existing value alone; unlike `CreateZoneRequest`, there's no
/// sensible default to fall back to for an update.
#[derive(Debug, Deserialize, Default)]
pub struct UpdateZoneRequest {
    pub rname: Option<String>,
    pub refresh: Option<u32>,
    pub retry: Option<u32>,
    pub expire: Option<u32>,
    pub minimum: Option<u32>,
    pub notify_targets: Option<Vec<std::net::SocketAddr>>,
}

fn default_refresh() -> u32 {
    3600
}
fn default_retry() -> u32 {
    600
}
fn default_expire() -> u32 {
    604_800
}
fn default_minimum() -> u32 {
    300
}
fn default_soa_ttl() -> u32 {
    3600
}

#[derive(Debug, Serialize)]
pub struct ZoneSummary {
    pub apex: String,
    pub role: String,
    pub serial: Option<u32>,
}

pub async fn list_zones(State(state): State<AppState>) -> Json<Vec<ZoneSummary>> {
    let zones = state.zones.read().expect("zones lock poisoned");
    let txn = state.engine.begin();
    let summaries = zones
        .iter()
        .map(|z| {
            let serial = txn
                .read(&key::entry_key(&z.apex), Category::Entry)
                .ok()
                .flatten()
                .and_then(|bytes| Entry::parse(&bytes).ok())
                .and_then(|entry| entry.soa().map(|soa| soa.serial));
            ZoneSummary {
                apex: z.apex.clone(),
                role: if z.is_primary() { "primary".into() } else { "slave".into() },
                serial,
            }
        })
        .collect();
    Json(summaries)
}

pub async fn get_zone(State(state): State<AppState>, Path(apex): Path<String>) -> Response {
    let zones = state.zones.read().expect("zones lock poisoned");
    match zones.get(&apex) {
        Some(zone) => Json(zone.clone()).into_response(),
        None => not_found(&apex),
    }
}

pub async fn create_zone(State(state): State<AppState>, Json(mut request): Json<CreateZoneRequest>) -> Response {
    if !nsblast_util::is_valid_fqdn(&request.apex) {
        return bad_request(format!("not a valid zone apex: {}", request.apex));
    }
    request.apex = nsblast_util::normalize_fqdn(&request.apex);

    if state.zones.read().expect("zones lock poisoned").get(&request.apex).is_some() {
        return (
            StatusCode::CONFLICT,
            Json(ErrorResult { message: format!("zone already exists: {}", request.apex) }),
        )
            .into_response();
    }

    let soa = SoaData {
        mname: request.apex.clone(),
        rname: request.rname,
        serial: 1,
        refresh: request.refresh,
        retry: request.retry,
        expire: request.expire,
        minimum: request.minimum,
    };

    let mut builder = EntryBuilder::new(request.apex.as_str());
    if let Err(e) = builder.create_soa(request.ttl, soa) {
        return bad_request(e.to_string());
    }
    let entry = match builder.finish() {
        Ok(entry) => entry,
        Err(e) => return bad_request(e.to_string()),
    };
    let bytes = match entry.to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => return bad_request(e.to_string()),
    };

    let txn = state.engine.begin();
    let k = key::entry_key(&request.apex);
    if let Err(e) = txn.write(&k, &bytes, true, Category::Entry) {
        return bad_request(e.to_string());
    }
    let tenant_zone_k = key::tenant_zone_key(&request.tenant, &request.apex);
    if let Err(e) = txn.write(&tenant_zone_k, &[], true, Category::Account) {
        return bad_request(e.to_string());
    }
    if let Err(e) = txn.commit() {
        return bad_request(e.to_string());
    }

    state.zones.write().expect("zones lock poisoned").insert(ZoneConfig {
        apex: request.apex.clone(),
        tenant: request.tenant.clone(),
        role: ZoneRole::Primary,
        notify_targets: request.notify_targets.clone(),
        allow_transfer_from: Vec::new(),
    });

    notify_zone_changed(&state, &request.apex, &request.notify_targets);
    StatusCode::CREATED.into_response()
}

pub async fn update_zone(
    State(state): State<AppState>,
    Path(apex): Path<String>,
    Json(request): Json<UpdateZoneRequest>,
) -> Response {
    let notify_targets = {
        let mut zones = state.zones.write().expect("zones lock poisoned");
        let Some(mut updated) = zones.get(&apex).cloned() else { return not_found(&apex) };
        if let Some(targets) = request.notify_targets.clone() {
            updated.notify_targets = targets;
        }
        zones.insert(updated.clone());
        updated.notify_targets
    };

    let txn = state.engine.begin();
    let k = key::entry_key(&apex);
    let Some(bytes) = (match txn.read(&k, Category::Entry) {
        Ok(v) => v,
        Err(e) => return bad_request(e.to_string()),
    }) else {
        return not_found(&apex);
    };
    let mut entry = match Entry::parse(&bytes) {
        Ok(e) => e,
        Err(e) => return bad_request(e.to_string()),
    };
    let Some(mut soa) = entry.soa().cloned() else {
        return bad_request(format!("zone {apex} has no SOA to update"));
    };
    if let Some(rname) = request.rname {
        soa.rname = rname;
    }
    if let Some(refresh) = request.refresh {
        soa.refresh = refresh;
    }
    if let Some(retry) = request.retry {
        soa.retry = retry;
    }
    if let Some(expire) = request.expire {
        soa.expire = expire;
    }
    if let Some(minimum) = request.minimum {
        soa.minimum = minimum;
    }
    if let Err(e) = entry.replace_soa(soa, default_soa_ttl()) {
        return bad_request(e.to_string());
    }
    if let Err(e) = entry.increment_soa_serial() {
        return bad_request(e.to_string());
    }
    let new_bytes = match entry.to_bytes() {
        Ok(b) => b,
        Err(e) => return bad_request(e.to_string()),
    };
    if let Err(e) = txn.write(&k, &new_bytes, false, Category::Entry) {
        return bad_request(e.to_string());
    }
    if let Err(e) = txn.commit() {
        return bad_request(e.to_string());
    }

    notify_zone_changed(&state, &apex, &notify_targets);
    StatusCode::NO_CONTENT.into_response()
}

pub async fn delete_zone(State(state): State<AppState>, Path(apex): Path<String>) -> Response {
    let removed = {
        let mut zones = state.zones.write().expect("zones lock poisoned");
        zones.remove(&apex)
    };
    let Some(zone) = removed else {
        return not_found(&apex);
    };

    let txn = state.engine.begin();
    // `remove_recursive` accumulates every key it deletes into the
    // transaction's own trxlog touches, so the zone's deletion is
    // replicated even though there's no separate "touched keys" list to
    // pass to commit() here.
    let removed = match txn.remove_recursive(&key::entry_key(&apex), Category::Entry) {
        Ok(removed) => removed,
        Err(e) => return bad_request(e.to_string()),
    };
    for removed_key in &removed {
        if let Some(fqdn) = key::fqdn_of_entry_key(removed_key) {
            let zrr_k = key::zrr_key(&zone.tenant, &fqdn);
            if let Err(e) = txn.remove(&zrr_k, Category::Account) {
                return bad_request(e.to_string());
            }
        }
    }
    let tenant_zone_k = key::tenant_zone_key(&zone.tenant, &apex);
    if let Err(e) = txn.remove(&tenant_zone_k, Category::Account) {
        return bad_request(e.to_string());
    }
    if let Err(e) = txn.commit() {
        return bad_request(e.to_string());
    }
    notify_zone_changed(&state, &apex, &zone.notify_targets);
    StatusCode::NO_CONTENT.into_response()
}

/// What a new RRset's rdata should hold, for the handful of record
/// types an operator is likely to manage through this API. Less
/// commonly edited types (HINFO, RP, AFSDB, SRV) are reachable through
/// `create_zone`'s underlying storage layer but not exposed here yet.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum RrsetData {
    A { address: std::net::Ipv4Addr },
    Aaaa { address: std::net::Ipv6Addr },
    Ns { nameserver: String },
    Cname { target: String },
    Mx { preference: u16, exchange: String },
    Txt { text: String },
}

#[derive(Debug, Deserialize)]
pub struct CreateRrsetRequest {
    pub ttl: u32,
    pub rdata: RrsetData,
}

#[derive(Debug, Serialize)]
pub struct RrsetRecord {
    #[serde(rename = "type")]
    pub rtype: String,
    pub ttl: u32,
}

pub async fn list_rrsets(State(state): State<AppState>, Path((apex, fqdn)): Path<(String, String)>) -> Response {
    let _ = apex;
    let txn = state.engine.begin();
    match txn.read(&key::entry_key(&fqdn), Category::Entry) {
        Ok(Some(bytes)) => match Entry::parse(&bytes) {
            Ok(entry) if !entry.is_tombstone() => {
                let records: Vec<RrsetRecord> = entry
                    .rrs
                    .iter()
                    .map(|rr| RrsetRecord { rtype: format!("{:?}", rr.rtype), ttl: rr.ttl() })
                    .collect();
                Json(records).into_response()
            }
            Ok(_) => not_found(&fqdn),
            Err(e) => bad_request(e.to_string()),
        },
        Ok(None) => not_found(&fqdn),
        Err(e) => bad_request(e.to_string()),
    }
}

pub async fn create_rrset(
    State(state): State<AppState>,
    Path((apex, fqdn)): Path<(String, String)>,
    Json(request): Json<CreateRrsetRequest>,
) -> Response {
    if !nsblast_util::is_valid_fqdn(&fqdn) {
        return bad_request(format!("not a valid owner name: {fqdn}"));
    }
    let fqdn = nsblast_util::normalize_fqdn(&fqdn);
    if fqdn != apex && !fqdn.ends_with(&format!(".{apex}")) {
        return bad_request(format!("{fqdn} is not under zone {apex}"));
    }
    let tenant = match state.zones.read().expect("zones lock poisoned").get(&apex) {
        Some(zone) => zone.tenant.clone(),
        None => return not_found(&apex),
    };

    let rdata = match request.rdata {
        RrsetData::A { address } => RData::A(address),
        RrsetData::Aaaa { address } => RData::Aaaa(address),
        RrsetData::Ns { nameserver } => RData::Ns(nameserver),
        RrsetData::Cname { target } => RData::Cname(target),
        RrsetData::Mx { preference, exchange } => RData::Mx { preference, exchange },
        RrsetData::Txt { text } => RData::Txt(split_into_char_strings(text.as_bytes())),
    };

    let txn = state.engine.begin();
    let k = key::entry_key(&fqdn);
    let existing = match txn.read(&k, Category::Entry) {
        Ok(Some(bytes)) => match Entry::parse(&bytes) {
            Ok(entry) => entry.rrs,
            Err(e) => return bad_request(e.to_string()),
        },
        Ok(None) => Vec::new(),
        Err(e) => return bad_request(e.to_string()),
    };
    let is_new = existing.is_empty();

    let mut builder = EntryBuilder::new(fqdn.clone());
    for rr in existing {
        let result = match rr.rdata {
            RData::Soa(soa) => builder.create_soa(rr.ttl(), soa),
            other => builder.create_rr(rr.rclass(), rr.ttl(), other),
        };
        if let Err(e) = result {
            return bad_request(e.to_string());
        }
    }
    if let Err(e) = builder.create_rr(crate::enums::RecordClass::Internet, request.ttl, rdata) {
        return bad_request(e.to_string());
    }
    let entry = match builder.finish() {
        Ok(entry) => entry,
        Err(e) => return bad_request(e.to_string()),
    };
    let bytes = match entry.to_bytes() {
        Ok(b) => b,
        Err(e) => return bad_request(e.to_string()),
    };
    if let Err(e) = txn.write(&k, &bytes, is_new, Category::Entry) {
        return bad_request(e.to_string());
    }
    let zrr_k = key::zrr_key(&tenant, &fqdn);
    if let Err(e) = txn.write(&zrr_k, &[], is_new, Category::Account) {
        return bad_request(e.to_string());
    }
    if let Err(e) = txn.commit() {
        return bad_request(e.to_string());
    }

    let targets = state.zones.read().expect("zones lock poisoned").get(&apex).map(|z| z.notify_targets.clone());
    if let Some(targets) = targets {
        notify_zone_changed(&state, &apex, &targets);
    }
    StatusCode::CREATED.into_response()
}

pub async fn delete_rrset(State(state): State<AppState>, Path((apex, fqdn)): Path<(String, String)>) -> Response {
    let tenant = match state.zones.read().expect("zones lock poisoned").get(&apex) {
        Some(zone) => zone.tenant.clone(),
        None => return not_found(&apex),
    };
    let txn = state.engine.begin();
    let k = key::entry_key(&fqdn);
    let mut entry = match txn.read(&k, Category::Entry) {
        Ok(Some(bytes)) => match Entry::parse(&bytes) {
            Ok(e) => e,
            Err(e) => return bad_request(e.to_string()),
        },
        Ok(None) => return not_found(&fqdn),
        Err(e) => return bad_request(e.to_string()),
    };

    // The last RRset at a name can't simply be removed and re-packed
    // (an entry with zero RRs is rejected by the builder), so it's
    // tombstoned in place instead -- the resolver already treats a
    // tombstoned entry as NXDOMAIN, and the deletion still travels
    // through the trxlog with the RRs it removed intact.
    entry.tombstone();
    let bytes = match entry.to_bytes() {
        Ok(b) => b,
        Err(e) => return bad_request(e.to_string()),
    };
    if let Err(e) = txn.write(&k, &bytes, false, Category::Entry) {
        return bad_request(e.to_string());
    }
    let zrr_k = key::zrr_key(&tenant, &fqdn);
    if let Err(e) = txn.remove(&zrr_k, Category::Account) {
        return bad_request(e.to_string());
    }
    if let Err(e) = txn.commit() {
        return bad_request(e.to_string());
    }

    let targets = state.zones.read().expect("zones lock poisoned").get(&apex).map(|z| z.notify_targets.clone());
    if let Some(targets) = targets {
        notify_zone_changed(&state, &apex, &targets);
    }
    StatusCode::NO_CONTENT.into_response()
}

/// Force a NOTIFY round to every configured secondary for `apex` right
/// now, rather than waiting for the next commit that happens to touch
/// it. Useful after an out-of-band change (a restored backup, a manual
/// storage edit) that this server's own commit path never saw.
pub async fn trigger_transfer(State(state): State<AppState>, Path(apex): Path<String>) -> Response {
    let targets = {
        let zones = state.zones.read().expect("zones lock poisoned");
        match zones.get(&apex) {
            Some(zone) => zone.notify_targets.clone(),
            None => return not_found(&apex),
        }
    };
    if targets.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }
    let notifier = state.notifier.clone();
    let apex_owned = apex.clone();
    tokio::spawn(async move {
        let _ = notifier.notify_all(&targets, &apex_owned).await;
    });
    StatusCode::ACCEPTED.into_response()
}

fn notify_zone_changed(state: &AppState, apex: &str, targets: &[std::net::SocketAddr]) {
    if targets.is_empty() {
        return;
    }
    let notifier = state.notifier.clone();
    let targets = targets.to_vec();
    let apex = apex.to_string();
    tokio::spawn(async move {
        let _ = notifier.notify_all(&targets, &apex).await;
    });
}

fn not_found(apex: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorResult { message: format!("no such zone or name: {apex}") })).into_response()
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResult { message })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
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
            refresh: default_refresh(),
            retry: default_retry(),
            expire: default_expire(),
            minimum: default_minimum(),
            ttl: default_soa_ttl(),
            notify_targets: Vec::new(),
            tenant: default_tenant(),
        }
    }

    #[tokio::test]
    async fn create_then_list_then_delete_roundtrips() {
        let (_dir, state) = test_state();
        let response = create_zone(State(state.clone()), Json(create_request())).await;
        assert_eq!(response.into_response().status(), StatusCode::CREATED);

        let listed = list_zones(State(state.clone())).await;
        assert_eq!(listed.0.len(), 1);
        assert_eq!(listed.0[0].apex, "example.com");
        assert_eq!(listed.0[0].serial, Some(1));

        let response = delete_zone(State(state.clone()), Path("example.com".into())).await.into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(list_zones(State(state)).await.0.is_empty());
    }

    #[tokio::test]
    async fn creating_a_duplicate_zone_conflicts() {
        let (_dir, state) = test_state();
        create_zone(State(state.clone()), Json(create_request())).await;
        let response = create_zone(State(state), Json(create_request())).await.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn creating_a_zone_with_an_invalid_apex_is_rejected() {
        let (_dir, state) = test_state();
        let mut request = create_request();
        request.apex = "-not-valid-.com".into();
        let response = create_zone(State(state), Json(request)).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn deleting_an_unknown_zone_is_not_found() {
        let (_dir, state) = test_state();
        let response = delete_zone(State(state), Path("example.com".into())).await.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_zone_trxlog_carries_every_removed_key() {
        let (_dir, state) = test_state();
        create_zone(State(state.clone()), Json(create_request())).await;

        create_rrset(
            State(state.clone()),
            Path(("example.com".into(), "www.example.com".into())),
            Json(CreateRrsetRequest { ttl: 300, rdata: RrsetData::A { address: "10.0.0.1".parse().unwrap() } }),
        )
        .await;

        let before = state.engine.last_assigned_trxid();
        delete_zone(State(state.clone()), Path("example.com".into())).await;
        let after = state.engine.last_assigned_trxid();
        assert!(after > before, "deleting a zone with entries must write a trxlog row");
    }

    #[tokio::test]
    async fn rrset_create_list_delete_roundtrips() {
        let (_dir, state) = test_state();
        create_zone(State(state.clone()), Json(create_request())).await;

        let response = create_rrset(
            State(state.clone()),
            Path(("example.com".into(), "www.example.com".into())),
            Json(CreateRrsetRequest { ttl: 300, rdata: RrsetData::A { address: "10.0.0.1".parse().unwrap() } }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);

        let listed = list_rrsets(State(state.clone()), Path(("example.com".into(), "www.example.com".into())))
            .await
            .into_response();
        assert_eq!(listed.status(), StatusCode::OK);

        let response = delete_rrset(State(state.clone()), Path(("example.com".into(), "www.example.com".into())))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let listed_after = list_rrsets(State(state), Path(("example.com".into(), "www.example.com".into())))
            .await
            .into_response();
        assert_eq!(listed_after.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_zone_bumps_serial_and_applies_fields() {
        let (_dir, state) = test_state();
        create_zone(State(state.clone()), Json(create_request())).await;

        let response = update_zone(
            State(state.clone()),
            Path("example.com".into()),
            Json(UpdateZoneRequest { refresh: Some(7200), ..Default::default() }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let listed = list_zones(State(state)).await;
        assert_eq!(listed.0[0].serial, Some(2));
    }
}
