use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::auth::crypto::{hash_password, verify_password, UsernameCipher};
use crate::config::Config;

pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
    pub created_at: i64,
}

/// Both seeded administrator identities. Protected from delete/update
/// regardless of how a caller arrives at their row (by id lookup or by
/// decrypted-name comparison).
pub const SEEDED_ADMINS: [&str; 2] = ["Admin_G", "Admin_D"];

pub struct CredentialStore {
    conn: Mutex<Connection>,
    cipher: UsernameCipher,
}

impl CredentialStore {
    pub fn open(config: &Config) -> Result<Self> {
        let conn = if config.storage.user_db_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = std::path::Path::new(&config.storage.user_db_path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open(&config.storage.user_db_path)
                .with_context(|| format!("opening user store {}", config.storage.user_db_path))?
        };
        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username_ciphertext TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                is_admin INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        let cipher = UsernameCipher::load_or_create(&config.storage.user_key_path)?;
        let store = CredentialStore {
            conn: Mutex::new(conn),
            cipher,
        };
        store.seed_admins(config)?;
        Ok(store)
    }

    /// Re-synced at every startup: each seeded administrator's credentials
    /// are reset to the configured values. This mirrors the original
    /// program's `create_default_admins()` behavior exactly (documented in
    /// the design notes as a preserved, not accidental, quirk).
    fn seed_admins(&self, config: &Config) -> Result<()> {
        let admins = [
            (SEEDED_ADMINS[0], config.token.admin_g_pass.as_str()),
            (SEEDED_ADMINS[1], config.token.admin_d_pass.as_str()),
        ];
        let conn = self.conn.lock();
        for (name, password) in admins {
            let existing_id = self.find_id_by_name_locked(&conn, name)?;
            let hash = hash_password(password)?;
            let ciphertext = self.cipher.encrypt(name)?;
            match existing_id {
                Some(id) => {
                    conn.execute(
                        "UPDATE users SET password_hash = ?1, is_admin = 1 WHERE id = ?2",
                        params![hash, id],
                    )?;
                }
                None => {
                    conn.execute(
                        "INSERT INTO users (username_ciphertext, password_hash, is_admin, created_at) VALUES (?1, ?2, 1, ?3)",
                        params![ciphertext, hash, now()],
                    )?;
                    info!(username = name, "seeded administrator account");
                }
            }
        }
        Ok(())
    }

    fn find_id_by_name_locked(&self, conn: &Connection, name: &str) -> Result<Option<i64>> {
        let mut stmt = conn.prepare("SELECT id, username_ciphertext FROM users")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (id, ciphertext) = row?;
            if let Ok(decrypted) = self.cipher.decrypt(&ciphertext) {
                if decrypted.eq_ignore_ascii_case(name) {
                    return Ok(Some(id));
                }
            }
        }
        Ok(None)
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock();
        Ok(self.find_id_by_name_locked(&conn, name)?.is_some())
    }

    pub fn create(&self, name: &str, password: &str, is_admin: bool) -> Result<()> {
        let conn = self.conn.lock();
        if self.find_id_by_name_locked(&conn, name)?.is_some() {
            anyhow::bail!("user exists");
        }
        let hash = hash_password(password)?;
        let ciphertext = self.cipher.encrypt(name)?;
        conn.execute(
            "INSERT INTO users (username_ciphertext, password_hash, is_admin, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![ciphertext, hash, is_admin as i64, now()],
        )?;
        Ok(())
    }

    /// Returns `(authenticated, is_admin)`.
    pub fn authenticate(&self, name: &str, password: &str) -> Result<(bool, bool)> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT username_ciphertext, password_hash, is_admin FROM users")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        for row in rows {
            let (ciphertext, hash, is_admin) = row?;
            if let Ok(decrypted) = self.cipher.decrypt(&ciphertext) {
                if decrypted == name {
                    return Ok((verify_password(password, &hash), is_admin != 0));
                }
            }
        }
        Ok((false, false))
    }

    pub fn list_all(&self) -> Result<Vec<UserRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, username_ciphertext, is_admin, created_at FROM users ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, ciphertext, is_admin, created_at) = row?;
            let username = self.cipher.decrypt(&ciphertext).unwrap_or_else(|_| "<unreadable>".to_string());
            out.push(UserRecord {
                id,
                username,
                is_admin: is_admin != 0,
                created_at,
            });
        }
        Ok(out)
    }

    fn row_exists(&self, conn: &Connection, id: i64) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row("SELECT id FROM users WHERE id = ?1", params![id], |r| r.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    fn is_protected(&self, conn: &Connection, id: i64) -> Result<bool> {
        let is_admin: i64 = conn.query_row("SELECT is_admin FROM users WHERE id = ?1", params![id], |r| r.get(0))
            .optional_zero()?;
        if is_admin != 0 {
            return Ok(true);
        }
        let ciphertext: Option<String> = conn
            .query_row("SELECT username_ciphertext FROM users WHERE id = ?1", params![id], |r| r.get(0))
            .ok();
        if let Some(ciphertext) = ciphertext {
            if let Ok(name) = self.cipher.decrypt(&ciphertext) {
                return Ok(SEEDED_ADMINS.iter().any(|a| a.eq_ignore_ascii_case(&name)));
            }
        }
        Ok(false)
    }

    pub fn delete(&self, id: i64) -> Result<DeleteOutcome> {
        let conn = self.conn.lock();
        if self.is_protected(&conn, id)? {
            return Ok(DeleteOutcome::AdminLocked);
        }
        let affected = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Ok(DeleteOutcome::NotFound);
        }
        Ok(DeleteOutcome::Deleted)
    }

    pub fn update(&self, id: i64, new_name: Option<&str>, new_password: Option<&str>) -> Result<UpdateOutcome> {
        let conn = self.conn.lock();
        if !self.row_exists(&conn, id)? {
            return Ok(UpdateOutcome::NotFound);
        }
        if self.is_protected(&conn, id)? {
            return Ok(UpdateOutcome::AdminLocked);
        }
        if let Some(name) = new_name {
            if let Some(existing) = self.find_id_by_name_locked(&conn, name)? {
                if existing != id {
                    return Ok(UpdateOutcome::NameExists);
                }
            }
            let ciphertext = self.cipher.encrypt(name)?;
            conn.execute(
                "UPDATE users SET username_ciphertext = ?1 WHERE id = ?2",
                params![ciphertext, id],
            )?;
        }
        if let Some(password) = new_password {
            let hash = hash_password(password)?;
            conn.execute("UPDATE users SET password_hash = ?1 WHERE id = ?2", params![hash, id])?;
        }
        Ok(UpdateOutcome::Updated)
    }
}

pub enum DeleteOutcome {
    Deleted,
    NotFound,
    AdminLocked,
}

pub enum UpdateOutcome {
    Updated,
    NotFound,
    NameExists,
    AdminLocked,
}

trait OptionalZero<T> {
    fn optional_zero(self) -> rusqlite::Result<T>
    where
        T: Default;
}

impl<T> OptionalZero<T> for rusqlite::Result<T> {
    fn optional_zero(self) -> rusqlite::Result<T>
    where
        T: Default,
    {
        match self {
            Ok(v) => Ok(v),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(T::default()),
            Err(e) => Err(e),
        }
    }
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;

    fn test_config(db_path: String, key_path: String) -> Config {
        let capture = CaptureConfig {
            index: 0,
            width: 4,
            height: 4,
            max_fps: None,
            pixel_format: PixelFormat::Rgb24,
            swap_rb: false,
            buffer_count: 1,
            queue: 1,
            color_convert: ColorConvert::Auto,
            test_pattern: true,
        };
        Config {
            server: ServerConfig { bind_addr: "127.0.0.1:0".into(), stream_backend: "python".into() },
            camera_left: capture.clone(),
            camera_right: capture,
            webrtc: WebRtcConfig { ice_servers: vec![], max_peers: 1 },
            token: TokenConfig {
                secret: "s".into(),
                expire_minutes: 60,
                admin_g_pass: "admin1234".into(),
                admin_d_pass: "123456789".into(),
            },
            storage: StorageConfig {
                user_db_path: db_path,
                user_key_path: key_path,
                recording_dir: "/tmp".into(),
                retention_days: 7,
                low_space_threshold_bytes: 0,
            },
            log: LogConfig { dir: "/tmp".into(), max_bytes: 1024, backup_count: 1 },
            sinks: Default::default(),
        }
    }

    #[test]
    fn seeds_two_admins_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(":memory:".into(), dir.path().join("k").to_string_lossy().into());
        let store = CredentialStore::open(&cfg).unwrap();
        assert!(store.exists("Admin_G").unwrap());
        assert!(store.exists("Admin_D").unwrap());
        let (ok, is_admin) = store.authenticate("Admin_G", "admin1234").unwrap();
        assert!(ok && is_admin);
    }

    #[test]
    fn admin_delete_and_update_always_fail_locked() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(":memory:".into(), dir.path().join("k").to_string_lossy().into());
        let store = CredentialStore::open(&cfg).unwrap();
        let admins = store.list_all().unwrap();
        let admin = admins.iter().find(|u| u.username == "Admin_G").unwrap();
        assert!(matches!(store.delete(admin.id).unwrap(), DeleteOutcome::AdminLocked));
        assert!(matches!(
            store.update(admin.id, Some("new_name"), None).unwrap(),
            UpdateOutcome::AdminLocked
        ));
    }

    #[test]
    fn create_then_authenticate_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(":memory:".into(), dir.path().join("k").to_string_lossy().into());
        let store = CredentialStore::open(&cfg).unwrap();
        store.create("alice", "hunter2", false).unwrap();
        let (ok, is_admin) = store.authenticate("alice", "hunter2").unwrap();
        assert!(ok);
        assert!(!is_admin);
        let (ok, _) = store.authenticate("alice", "wrong").unwrap();
        assert!(!ok);
    }

    #[test]
    fn create_rejects_duplicate_name() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(":memory:".into(), dir.path().join("k").to_string_lossy().into());
        let store = CredentialStore::open(&cfg).unwrap();
        store.create("bob", "pw", false).unwrap();
        assert!(store.create("bob", "pw2", false).is_err());
    }

    #[test]
    fn update_on_nonexistent_id_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(":memory:".into(), dir.path().join("k").to_string_lossy().into());
        let store = CredentialStore::open(&cfg).unwrap();
        assert!(matches!(
            store.update(999_999, Some("nobody"), None).unwrap(),
            UpdateOutcome::NotFound
        ));
    }

    #[test]
    fn non_admin_delete_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(":memory:".into(), dir.path().join("k").to_string_lossy().into());
        let store = CredentialStore::open(&cfg).unwrap();
        store.create("carol", "pw", false).unwrap();
        let id = store.list_all().unwrap().into_iter().find(|u| u.username == "carol").unwrap().id;
        assert!(matches!(store.delete(id).unwrap(), DeleteOutcome::Deleted));
        assert!(!store.exists("carol").unwrap());
    }
}
