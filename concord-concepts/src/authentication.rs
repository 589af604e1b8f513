//! Username and password accounts.

use std::{collections::HashMap, sync::Arc};

use concord_core::{
    action::{ActionRef, QueryRef},
    concept::{Concept, RegistryBuilder},
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

pub const INVALID_CREDENTIALS: &str = "Invalid username or password";

#[derive(Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ByUsername {
    pub username: String,
}

#[derive(Deserialize)]
pub struct ByUser {
    pub user: String,
}

#[derive(Serialize)]
pub struct UserRow {
    pub user: String,
}

#[derive(Serialize)]
pub struct UsernameRow {
    pub username: String,
}

#[derive(Debug)]
struct Account {
    user: String,
    salt: Uuid,
    verifier: String,
}

impl Account {
    fn new(password: &str) -> Self {
        let salt = Uuid::new_v4();
        Self {
            user: Uuid::new_v4().to_string(),
            salt,
            verifier: verifier(salt, password),
        }
    }

    fn accepts(&self, password: &str) -> bool {
        verifier(self.salt, password) == self.verifier
    }
}

fn verifier(salt: Uuid, password: &str) -> String {
    blake3::Hasher::new()
        .update(salt.as_bytes())
        .update(password.as_bytes())
        .finalize()
        .to_hex()
        .to_string()
}

/// Registered accounts keyed by username. Passwords are kept only as salted
/// digests.
#[derive(Debug, Default)]
pub struct UserAuthentication {
    accounts: RwLock<HashMap<String, Account>>,
}

impl UserAuthentication {
    pub const REGISTER: ActionRef = ActionRef::new(Self::NAME, "register");
    pub const AUTHENTICATE: ActionRef = ActionRef::new(Self::NAME, "authenticate");
    pub const GET_USER_BY_USERNAME: QueryRef = QueryRef::new(Self::NAME, "_getUserByUsername");
    pub const GET_USERNAME: QueryRef = QueryRef::new(Self::NAME, "_getUsername");

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account and return the new user's id.
    ///
    /// # Errors
    ///
    /// Fails if `username` is taken.
    pub async fn register_user(&self, username: &str, password: &str) -> Result<String, String> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(username) {
            return Err(format!("Username '{username}' already exists"));
        }
        let account = Account::new(password);
        let user = account.user.clone();
        accounts.insert(username.to_string(), account);
        tracing::debug!(%user, "user registered");
        Ok(user)
    }

    /// Check credentials and return the matching user's id.
    ///
    /// # Errors
    ///
    /// Unknown usernames and wrong passwords fail with the same message.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<String, String> {
        self.accounts
            .read()
            .await
            .get(username)
            .filter(|account| account.accepts(password))
            .map(|account| account.user.clone())
            .ok_or_else(|| INVALID_CREDENTIALS.to_string())
    }

    pub async fn user_by_username(&self, username: &str) -> Option<String> {
        self.accounts.read().await.get(username).map(|account| account.user.clone())
    }

    pub async fn username(&self, user: &str) -> Option<String> {
        self.accounts
            .read()
            .await
            .iter()
            .find(|(_, account)| account.user == user)
            .map(|(username, _)| username.clone())
    }
}

impl Concept for UserAuthentication {
    const NAME: &'static str = "UserAuthentication";

    fn register(self: Arc<Self>, registry: &mut RegistryBuilder) {
        registry
            .action(&self, "register", |auth: Arc<Self>, input: Credentials| async move {
                let user = auth.register_user(&input.username, &input.password).await?;
                Ok::<_, String>(UserRow { user })
            })
            .action(&self, "authenticate", |auth: Arc<Self>, input: Credentials| async move {
                let user = auth.authenticate(&input.username, &input.password).await?;
                Ok::<_, String>(UserRow { user })
            })
            .query(&self, "_getUserByUsername", |auth: Arc<Self>, input: ByUsername| async move {
                auth.user_by_username(&input.username)
                    .await
                    .map(|user| UserRow { user })
                    .into_iter()
                    .collect::<Vec<_>>()
            })
            .query(&self, "_getUsername", |auth: Arc<Self>, input: ByUser| async move {
                auth.username(&input.user)
                    .await
                    .map(|username| UsernameRow { username })
                    .into_iter()
                    .collect::<Vec<_>>()
            });
    }
}
