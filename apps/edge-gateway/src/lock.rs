//! 维护命令（升级、恢复）：锁文件与资源文件备份。

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const MAINTENANCE_LOCK: &str = "upgrade.lock";
pub const BACKUP_DIR: &str = "backup";
pub const BACKUP_FILE: &str = "resources.json";

/// 维护锁：创建时写入，析构时删除。已存在时创建失败。
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    pub fn acquire(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        file.write_all(b"0")?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "maintenance_lock_removed"),
            Err(err) => warn!(path = %self.path.display(), error = %err, "maintenance_lock_remove_failed"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    NothingToDo,
    Copied { from: PathBuf, to: PathBuf },
}

fn backup_path(lock_dir: &Path) -> PathBuf {
    lock_dir.join(BACKUP_DIR).join(BACKUP_FILE)
}

fn copy_file(from: &Path, to: &Path) -> io::Result<Outcome> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(from, to)?;
    Ok(Outcome::Copied {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
    })
}

/// `upgrade --upgrade`：把资源文件备份到 `<lock_dir>/backup/`。
pub fn upgrade(lock_dir: &Path, resources: Option<&Path>, enabled: bool) -> io::Result<Outcome> {
    let _lock = LockFile::acquire(lock_dir.join(MAINTENANCE_LOCK))?;
    if !enabled {
        info!("upgrade_nothing_to_do");
        return Ok(Outcome::NothingToDo);
    }
    let Some(resources) = resources else {
        info!("upgrade_no_resources_file");
        return Ok(Outcome::NothingToDo);
    };
    let outcome = copy_file(resources, &backup_path(lock_dir))?;
    info!(?outcome, "upgrade_backup_finished");
    Ok(outcome)
}

/// `recover --recover`：用备份覆盖资源文件。
pub fn recover(lock_dir: &Path, resources: Option<&Path>, enabled: bool) -> io::Result<Outcome> {
    let _lock = LockFile::acquire(lock_dir.join(MAINTENANCE_LOCK))?;
    if !enabled {
        info!("recover_nothing_to_do");
        return Ok(Outcome::NothingToDo);
    }
    let Some(resources) = resources else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "no resources file to recover",
        ));
    };
    let outcome = copy_file(&backup_path(lock_dir), resources)?;
    info!(?outcome, "recover_finished");
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("edge-gateway-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_lock_file_is_exclusive_and_removed() {
        let dir = scratch_dir("lock");
        let path = dir.join(MAINTENANCE_LOCK);
        {
            let lock = LockFile::acquire(&path).unwrap();
            assert_eq!(fs::read(lock.path()).unwrap(), b"0");
            assert!(LockFile::acquire(&path).is_err());
        }
        assert!(!path.exists());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_upgrade_then_recover() {
        let dir = scratch_dir("maint");
        let resources = dir.join("resources.json");
        fs::write(&resources, "[]").unwrap();

        assert_eq!(upgrade(&dir, Some(&resources), false).unwrap(), Outcome::NothingToDo);
        assert!(!backup_path(&dir).exists());

        upgrade(&dir, Some(&resources), true).unwrap();
        assert_eq!(fs::read_to_string(backup_path(&dir)).unwrap(), "[]");

        fs::write(&resources, "broken").unwrap();
        recover(&dir, Some(&resources), true).unwrap();
        assert_eq!(fs::read_to_string(&resources).unwrap(), "[]");
        assert!(!dir.join(MAINTENANCE_LOCK).exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_recover_failure_still_removes_lock() {
        let dir = scratch_dir("recover");
        let resources = dir.join("resources.json");
        assert!(recover(&dir, Some(&resources), true).is_err());
        assert!(!dir.join(MAINTENANCE_LOCK).exists());
        fs::remove_dir_all(&dir).unwrap();
    }
}
