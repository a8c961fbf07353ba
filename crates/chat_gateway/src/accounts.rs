//! Durable account storage.
//!
//! Accounts live in memory behind a single lock and are mirrored to a JSON
//! file shaped like `{ "<username>": { "password": "...", "id": "123456" } }`.
//! The whole table is rewritten on every signup while the lock is still held,
//! so concurrent signups can neither interleave writes nor receive the same
//! numeric ID.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::{AccountError, AuthError, GatewayError};

const ID_MIN: u32 = 100_000;
const ID_MAX: u32 = 999_999;

/// One persisted account entry, keyed by username in the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub password: String,
    /// Six-digit public ID. Older tables may omit it; such entries can still
    /// log in but are not reachable through `FIND_USER`.
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Default)]
struct AccountTable {
    users: BTreeMap<String, AccountRecord>,
    ids: HashMap<String, String>,
}

impl AccountTable {
    fn from_users(users: BTreeMap<String, AccountRecord>) -> Self {
        let ids = users
            .iter()
            .filter(|(_, record)| !record.id.is_empty())
            .map(|(user, record)| (record.id.clone(), user.clone()))
            .collect();
        Self { users, ids }
    }

    fn generate_id(&self) -> String {
        let mut rng = rand::rng();
        loop {
            let id = rng.random_range(ID_MIN..=ID_MAX).to_string();
            if !self.ids.contains_key(&id) {
                return id;
            }
        }
    }
}

/// Username/password store with a reverse numeric-ID index.
#[derive(Debug)]
pub struct AccountStore {
    path: PathBuf,
    table: Mutex<AccountTable>,
}

impl AccountStore {
    /// Loads the account table from `path`.
    ///
    /// A missing file yields an empty store. A file that exists but cannot be
    /// read or parsed is an error: starting empty would overwrite it on the
    /// next signup.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, GatewayError> {
        let path = path.into();
        let users = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str::<BTreeMap<String, AccountRecord>>(&contents)
                .map_err(|e| {
                    GatewayError::Storage(format!("Failed to parse {}: {e}", path.display()))
                })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No account table at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => {
                return Err(GatewayError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )))
            }
        };

        info!("Loaded {} account(s) from {}", users.len(), path.display());
        Ok(Self {
            path,
            table: Mutex::new(AccountTable::from_users(users)),
        })
    }

    /// Creates an account and returns its freshly generated ID.
    ///
    /// The table is persisted before returning. A failed write is logged and
    /// the in-memory account is kept.
    pub async fn create_account(
        &self,
        username: &str,
        password: &str,
    ) -> Result<String, AccountError> {
        if username.is_empty() || password.is_empty() {
            return Err(AccountError::MissingCredentials);
        }

        let mut table = self.table.lock().await;
        if table.users.contains_key(username) {
            return Err(AccountError::DuplicateUsername);
        }

        let id = table.generate_id();
        table.users.insert(
            username.to_owned(),
            AccountRecord {
                password: password.to_owned(),
                id: id.clone(),
            },
        );
        table.ids.insert(id.clone(), username.to_owned());

        if let Err(e) = write_table(&self.path, &table.users).await {
            error!("Failed to save accounts to {}: {}", self.path.display(), e);
        }

        info!("Created account {} with id {}", username, id);
        Ok(id)
    }

    /// Checks credentials and returns the account's ID.
    pub async fn verify(&self, username: &str, password: &str) -> Result<String, AuthError> {
        let table = self.table.lock().await;
        let record = table.users.get(username).ok_or(AuthError::NotFound)?;
        if record.password != password {
            debug!("Rejected password for {}", username);
            return Err(AuthError::BadCredentials);
        }
        Ok(record.id.clone())
    }

    /// Reverse lookup from numeric ID to username.
    pub async fn find_by_numeric_id(&self, id: &str) -> Option<String> {
        self.table.lock().await.ids.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.table.lock().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Rewrites the whole table through a sibling temp file and a rename.
async fn write_table(
    path: &Path,
    users: &BTreeMap<String, AccountRecord>,
) -> Result<(), GatewayError> {
    let contents = serde_json::to_string_pretty(users)
        .map_err(|e| GatewayError::Storage(format!("Failed to serialize accounts: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
