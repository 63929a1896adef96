use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, SecondsFormat, Utc};
use rand::Rng;
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{ProgramState, Role, StoredState, UserProfile};

pub struct Database {
    conn: Connection,
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Hex-encode `len` random bytes.
#[must_use]
pub fn random_hex(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len).fold(String::with_capacity(len * 2), |mut acc, _| {
        let b: u8 = rng.random();
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// Session tokens older than this are rejected and pruned.
pub const SESSION_TTL_DAYS: i64 = 30;

// Prefix of credentials carried over from the pre-argon2 schema: `sha256$<salt>$<hex>`.
const LEGACY_SCHEME: &str = "sha256$";

fn legacy_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .fold(String::with_capacity(64), |mut acc, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
}

/// Argon2id PHC string for `password` with a fresh random salt.
fn hash_password(password: &str) -> Result<String> {
    let salt_bytes: [u8; 16] = rand::rng().random();
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!("Invalid salt: {e}"))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {e}"))?;
    Ok(hash.to_string())
}

fn password_matches(stored: &str, password: &str) -> bool {
    if let Some(rest) = stored.strip_prefix(LEGACY_SCHEME) {
        return match rest.split_once('$') {
            Some((salt, digest)) => {
                let computed = legacy_digest(salt, password);
                computed.len() == digest.len()
                    && computed
                        .bytes()
                        .zip(digest.bytes())
                        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                        == 0
            }
            None => false,
        };
    }
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

fn session_cutoff() -> String {
    (Utc::now() - Duration::days(SESSION_TTL_DAYS)).to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS local_documents (
                    key TEXT PRIMARY KEY NOT NULL,
                    data TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS profiles (
                    id TEXT PRIMARY KEY NOT NULL,
                    email TEXT NOT NULL UNIQUE,
                    role TEXT NOT NULL DEFAULT 'client' CHECK (role IN ('client', 'admin')),
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS credentials (
                    user_id TEXT PRIMARY KEY NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
                    salt TEXT NOT NULL,
                    password_hash TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    token TEXT PRIMARY KEY NOT NULL,
                    user_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

                CREATE TABLE IF NOT EXISTS user_state (
                    user_id TEXT PRIMARY KEY NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
                    data TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                PRAGMA user_version = 2;",
            )?;
        }

        if version < 3 {
            // Fold the separate salt column into a self-describing hash string
            self.conn.execute_batch(
                "CREATE TABLE credentials_v3 (
                    user_id TEXT PRIMARY KEY NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
                    password_hash TEXT NOT NULL
                );
                INSERT INTO credentials_v3 (user_id, password_hash)
                    SELECT user_id, 'sha256$' || salt || '$' || password_hash FROM credentials;
                DROP TABLE credentials;
                ALTER TABLE credentials_v3 RENAME TO credentials;

                CREATE INDEX IF NOT EXISTS idx_sessions_created ON sessions(created_at);

                PRAGMA user_version = 3;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    // Expects columns: 0: id, 1: email, 2: role, 3: created_at
    fn profile_from_row(row: &rusqlite::Row) -> rusqlite::Result<UserProfile> {
        let role: String = row.get(2)?;
        Ok(UserProfile {
            id: row.get(0)?,
            email: row.get(1)?,
            role: if role == "admin" {
                Role::Admin
            } else {
                Role::Client
            },
            created_at: row.get(3)?,
        })
    }

    // --- Local documents ---

    /// Raw text of a local document, so callers can tell "missing" from "malformed".
    pub fn get_local_document(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT data FROM local_documents WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read local document")
    }

    /// Overwrite a local document. Returns the write timestamp.
    pub fn put_local_document(&self, key: &str, data: &str) -> Result<String> {
        let now = now_stamp();
        self.conn.execute(
            "INSERT INTO local_documents (key, data, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            params![key, data, now],
        )?;
        Ok(now)
    }

    // --- Accounts ---

    pub fn create_user(&self, email: &str, password: &str, role: Role) -> Result<UserProfile> {
        if self.get_profile_by_email(email)?.is_some() {
            bail!("User already registered");
        }
        let id = Uuid::new_v4().to_string();
        let now = now_stamp();
        let hash = hash_password(password)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO profiles (id, email, role, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, email, role.as_str(), now],
        )?;
        tx.execute(
            "INSERT INTO credentials (user_id, password_hash) VALUES (?1, ?2)",
            params![id, hash],
        )?;
        tx.commit()?;

        self.get_profile(&id)?
            .context("Profile missing right after insert")
    }

    /// Check an email/password pair. `None` means the pair does not match any account.
    /// Credentials still in the legacy format are rehashed with argon2 on success.
    pub fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<UserProfile>> {
        let stored: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT p.id, c.password_hash
                 FROM profiles p JOIN credentials c ON c.user_id = p.id
                 WHERE p.email = ?1",
                params![email],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((id, hash)) = stored else {
            return Ok(None);
        };
        if !password_matches(&hash, password) {
            return Ok(None);
        }
        if hash.starts_with(LEGACY_SCHEME) {
            self.conn.execute(
                "UPDATE credentials SET password_hash = ?1 WHERE user_id = ?2",
                params![hash_password(password)?, id],
            )?;
        }
        self.get_profile(&id)
    }

    pub fn get_profile(&self, id: &str) -> Result<Option<UserProfile>> {
        self.conn
            .query_row(
                "SELECT id, email, role, created_at FROM profiles WHERE id = ?1",
                params![id],
                Self::profile_from_row,
            )
            .optional()
            .context("Failed to read profile")
    }

    pub fn get_profile_by_email(&self, email: &str) -> Result<Option<UserProfile>> {
        self.conn
            .query_row(
                "SELECT id, email, role, created_at FROM profiles WHERE email = ?1",
                params![email],
                Self::profile_from_row,
            )
            .optional()
            .context("Failed to read profile")
    }

    pub fn set_role(&self, email: &str, role: Role) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE profiles SET role = ?1 WHERE email = ?2",
            params![role.as_str(), email],
        )?;
        Ok(rows > 0)
    }

    /// Non-admin profiles, newest first.
    pub fn list_clients(&self) -> Result<Vec<UserProfile>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, email, role, created_at FROM profiles
             WHERE role != 'admin'
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let profiles = stmt
            .query_map([], Self::profile_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(profiles)
    }

    // --- Sessions ---

    /// Issue a new bearer token. Expired tokens are pruned on the way.
    pub fn create_session(&self, user_id: &str) -> Result<String> {
        self.conn.execute(
            "DELETE FROM sessions WHERE created_at < ?1",
            params![session_cutoff()],
        )?;
        let token = random_hex(32);
        self.conn.execute(
            "INSERT INTO sessions (token, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![token, user_id, now_stamp()],
        )?;
        Ok(token)
    }

    /// The profile behind a token, unless the token is unknown or older than
    /// [`SESSION_TTL_DAYS`].
    pub fn get_session_user(&self, token: &str) -> Result<Option<UserProfile>> {
        self.conn
            .query_row(
                "SELECT p.id, p.email, p.role, p.created_at
                 FROM sessions s JOIN profiles p ON p.id = s.user_id
                 WHERE s.token = ?1 AND s.created_at >= ?2",
                params![token, session_cutoff()],
                Self::profile_from_row,
            )
            .optional()
            .context("Failed to read session")
    }

    pub fn delete_session(&self, token: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(rows > 0)
    }

    // --- Per-user state rows ---

    pub fn get_user_state(&self, user_id: &str) -> Result<Option<StoredState>> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT data, updated_at FROM user_state WHERE user_id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((data, updated_at)) = row else {
            return Ok(None);
        };
        let data: ProgramState = serde_json::from_str(&data)
            .with_context(|| format!("Stored state for user {user_id} is malformed"))?;
        Ok(Some(StoredState {
            user_id: user_id.to_string(),
            data,
            updated_at,
        }))
    }

    /// Overwrite a user's whole document and stamp it with the current time.
    pub fn upsert_user_state(&self, user_id: &str, state: &ProgramState) -> Result<StoredState> {
        let data = serde_json::to_string(state).context("Failed to serialize state")?;
        let now = now_stamp();
        self.conn.execute(
            "INSERT INTO user_state (user_id, data, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            params![user_id, data, now],
        )?;
        Ok(StoredState {
            user_id: user_id.to_string(),
            data: state.clone(),
            updated_at: now,
        })
    }
}
