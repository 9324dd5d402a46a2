//! RocksDB checkpoint-based backups.
//!
//! Grounded on `original_source/`'s `BackupMgr`: a backup is a RocksDB
//! checkpoint (a cheap hardlink-based snapshot, not a full copy) plus a
//! small `meta.json` sidecar recording when it was taken and which
//! trxid it's consistent up to, so a restored follower knows where to
//! resume streaming from. Only one backup may run at a time; a second
//! request while one is in flight is rejected rather than queued, since
//! queuing silently would let requests pile up behind a slow disk.

use crate::error::NsblastError;
use crate::storage::engine::Engine;
use rocksdb::checkpoint::Checkpoint;
use rocksdb::{Options, TransactionDB, TransactionDBOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupMeta {
    pub created_unix: u64,
    pub last_trxid: u64,
}

/// One backup as seen from the outside: its directory name plus the
/// sidecar metadata it was written with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupInfo {
    pub name: String,
    pub meta: BackupMeta,
}

pub struct BackupManager {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        BackupManager { dir: dir.into(), lock: Mutex::new(()) }
    }

    /// Take a checkpoint-backed backup, named by `now_unix`, writing
    /// `meta.json` alongside it. Errors immediately (does not block) if
    /// another backup is already running.
    pub fn run(&self, engine: &Engine, now_unix: u64) -> Result<PathBuf, NsblastError> {
        let _guard = self
            .lock
            .try_lock()
            .map_err(|_| NsblastError::Conflict("a backup is already in progress".into()))?;

        let target = self.dir.join(format!("backup-{now_unix}"));
        let checkpoint = Checkpoint::new(&engine.db)?;
        checkpoint.create_checkpoint(&target)?;

        let meta = BackupMeta { created_unix: now_unix, last_trxid: engine.last_assigned_trxid() };
        write_meta(&target, &meta)?;
        Ok(target)
    }

    /// The next hourly-aligned unix timestamp strictly after `now_unix`,
    /// so scheduled backups land on the hour regardless of server start
    /// time.
    pub fn next_hourly_boundary(now_unix: u64) -> u64 {
        const HOUR: u64 = 3600;
        (now_unix / HOUR + 1) * HOUR
    }

    pub fn read_meta(backup_dir: impl AsRef<Path>) -> Result<BackupMeta, NsblastError> {
        let bytes = std::fs::read(backup_dir.as_ref().join("meta.json"))?;
        serde_json::from_slice(&bytes).map_err(|e| NsblastError::Malformed(format!("bad backup meta.json: {e}")))
    }

    /// Every backup under this manager's directory, oldest first. A
    /// directory missing `meta.json` (an interrupted `run()`) is
    /// skipped rather than failing the whole listing.
    pub fn list(&self) -> Result<Vec<BackupInfo>, NsblastError> {
        let mut backups = Vec::new();
        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(backups),
            Err(e) => return Err(e.into()),
        };
        for entry in read_dir {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Ok(meta) = Self::read_meta(entry.path()) else { continue };
            let name = entry.file_name().to_string_lossy().into_owned();
            backups.push(BackupInfo { name, meta });
        }
        backups.sort_by_key(|b| b.meta.created_unix);
        Ok(backups)
    }

    pub fn get(&self, name: &str) -> Result<BackupInfo, NsblastError> {
        let path = self.named_path(name)?;
        let meta = Self::read_meta(&path)?;
        Ok(BackupInfo { name: name.to_string(), meta })
    }

    /// Open the checkpoint read-only and confirm it holds a consistent,
    /// loadable copy of the database -- not just that `meta.json`
    /// parses. Returns the trxid it was consistent up to on success.
    pub fn verify(&self, name: &str) -> Result<u64, NsblastError> {
        let path = self.named_path(name)?;
        let meta = Self::read_meta(&path)?;
        let opts = Options::default();
        let txn_opts = TransactionDBOptions::default();
        let db = TransactionDB::open(&opts, &txn_opts, &path)
            .map_err(|e| NsblastError::Malformed(format!("backup {name} failed to open: {e}")))?;
        drop(db);
        Ok(meta.last_trxid)
    }

    /// Replace `target_dir` (a live engine's storage path) with this
    /// backup's checkpoint. The caller must not hold an open [`Engine`]
    /// on `target_dir` when calling this -- RocksDB requires the
    /// directory be unlocked before a fresh open.
    pub fn restore(&self, name: &str, target_dir: impl AsRef<Path>) -> Result<BackupMeta, NsblastError> {
        let source = self.named_path(name)?;
        let meta = Self::read_meta(&source)?;
        let target = target_dir.as_ref();
        if target.exists() {
            std::fs::remove_dir_all(target)?;
        }
        std::fs::create_dir_all(target.parent().unwrap_or(Path::new(".")))?;
        copy_dir_recursive(&source, target)?;
        Ok(meta)
    }

    /// Delete a backup outright. Used by retention sweeps as well as
    /// the on-demand admin endpoint.
    pub fn purge(&self, name: &str) -> Result<(), NsblastError> {
        let path = self.named_path(name)?;
        std::fs::remove_dir_all(path)?;
        Ok(())
    }

    /// Delete every backup older than `keep_after_unix`, returning the
    /// names removed. Grounded on the common "keep N days" retention
    /// sweep original_source/ runs after each successful backup.
    pub fn purge_older_than(&self, keep_after_unix: u64) -> Result<Vec<String>, NsblastError> {
        let mut removed = Vec::new();
        for backup in self.list()? {
            if backup.meta.created_unix < keep_after_unix {
                self.purge(&backup.name)?;
                removed.push(backup.name);
            }
        }
        Ok(removed)
    }

    fn named_path(&self, name: &str) -> Result<PathBuf, NsblastError> {
        if name.contains('/') || name.contains("..") {
            return Err(NsblastError::Constraint(format!("invalid backup name: {name}")));
        }
        let path = self.dir.join(name);
        if !path.is_dir() {
            return Err(NsblastError::NotFound(format!("no such backup: {name}")));
        }
        Ok(path)
    }
}

fn copy_dir_recursive(source: &Path, target: &Path) -> Result<(), NsblastError> {
    std::fs::create_dir_all(target)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let dest = target.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &dest)?;
        } else {
            std::fs::copy(entry.path(), dest)?;
        }
    }
    Ok(())
}

fn write_meta(target: &Path, meta: &BackupMeta) -> Result<(), NsblastError> {
    let bytes = serde_json::to_vec_pretty(meta).map_err(|e| NsblastError::Internal(e.to_string()))?;
    std::fs::write(target.join("meta.json"), bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn backup_writes_checkpoint_and_meta() {
        let db_dir = tempdir().unwrap();
        let backups_dir = tempdir().unwrap();
        let engine = Engine::open(db_dir.path()).unwrap();
        let mgr = BackupManager::new(backups_dir.path());

        let target = mgr.run(&engine, 1_700_000_000).unwrap();
        assert!(target.join("meta.json").exists());

        let meta = BackupManager::read_meta(&target).unwrap();
        assert_eq!(meta.created_unix, 1_700_000_000);
    }

    #[test]
    fn concurrent_backup_is_rejected() {
        let db_dir = tempdir().unwrap();
        let backups_dir = tempdir().unwrap();
        let engine = Engine::open(db_dir.path()).unwrap();
        let mgr = BackupManager::new(backups_dir.path());

        let _held = mgr.lock.lock().unwrap();
        assert!(mgr.run(&engine, 1_700_000_000).is_err());
    }

    #[test]
    fn hourly_boundary_rounds_up() {
        assert_eq!(BackupManager::next_hourly_boundary(0), 3600);
        assert_eq!(BackupManager::next_hourly_boundary(3600), 7200);
        assert_eq!(BackupManager::next_hourly_boundary(3599), 3600);
    }

    #[test]
    fn list_returns_backups_oldest_first() {
        let db_dir = tempdir().unwrap();
        let backups_dir = tempdir().unwrap();
        let engine = Engine::open(db_dir.path()).unwrap();
        let mgr = BackupManager::new(backups_dir.path());

        mgr.run(&engine, 1_700_000_200).unwrap();
        mgr.run(&engine, 1_700_000_100).unwrap();

        let listed = mgr.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].meta.created_unix, 1_700_000_100);
        assert_eq!(listed[1].meta.created_unix, 1_700_000_200);
    }

    #[test]
    fn verify_opens_the_checkpoint_and_returns_its_trxid() {
        let db_dir = tempdir().unwrap();
        let backups_dir = tempdir().unwrap();
        let engine = Engine::open(db_dir.path()).unwrap();
        let txn = engine.begin();
        txn.write(&crate::storage::key::entry_key("example.com"), b"1", true, crate::storage::engine::Category::Entry).unwrap();
        txn.commit().unwrap();
        let mgr = BackupManager::new(backups_dir.path());

        let target = mgr.run(&engine, 1_700_000_000).unwrap();
        let name = target.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(mgr.verify(&name).unwrap(), engine.last_assigned_trxid());
    }

    #[test]
    fn restore_overwrites_the_target_directory_with_the_backup() {
        let db_dir = tempdir().unwrap();
        let backups_dir = tempdir().unwrap();
        let restore_dir = tempdir().unwrap();
        let engine = Engine::open(db_dir.path()).unwrap();
        let mgr = BackupManager::new(backups_dir.path());

        let target = mgr.run(&engine, 1_700_000_000).unwrap();
        let name = target.file_name().unwrap().to_string_lossy().into_owned();
        drop(engine);

        let restored_meta = mgr.restore(&name, restore_dir.path()).unwrap();
        assert_eq!(restored_meta.created_unix, 1_700_000_000);
        let restored = Engine::open(restore_dir.path()).unwrap();
        assert_eq!(restored.last_assigned_trxid(), restored_meta.last_trxid);
    }

    #[test]
    fn purge_older_than_removes_only_stale_backups() {
        let db_dir = tempdir().unwrap();
        let backups_dir = tempdir().unwrap();
        let engine = Engine::open(db_dir.path()).unwrap();
        let mgr = BackupManager::new(backups_dir.path());

        mgr.run(&engine, 1_700_000_000).unwrap();
        mgr.run(&engine, 1_800_000_000).unwrap();

        let removed = mgr.purge_older_than(1_750_000_000).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(mgr.list().unwrap().len(), 1);
    }

    #[test]
    fn named_path_rejects_path_traversal() {
        let backups_dir = tempdir().unwrap();
        let mgr = BackupManager::new(backups_dir.path());
        assert!(mgr.get("../etc").is_err());
        assert!(mgr.get("a/b").is_err());
    }
}
