//! Session tokens.

use std::{collections::HashMap, sync::Arc};

use concord_core::{
    action::{ActionRef, QueryRef},
    concept::{Concept, RegistryBuilder},
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct Create {
    pub user: String,
}

#[derive(Deserialize)]
pub struct Delete {
    pub session: String,
}

#[derive(Deserialize)]
pub struct GetUser {
    pub session: String,
}

#[derive(Serialize)]
pub struct Created {
    pub session: String,
}

#[derive(Serialize)]
pub struct UserRow {
    pub user: String,
}

/// Maps session tokens to the users that opened them.
#[derive(Debug, Default)]
pub struct Session {
    sessions: RwLock<HashMap<String, String>>,
}

impl Session {
    pub const CREATE: ActionRef = ActionRef::new(Self::NAME, "create");
    pub const DELETE: ActionRef = ActionRef::new(Self::NAME, "delete");
    pub const GET_USER: QueryRef = QueryRef::new(Self::NAME, "_getUser");

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for `user` and return its token.
    pub async fn create(&self, user: impl Into<String>) -> String {
        let session = Uuid::new_v4().to_string();
        self.sessions.write().await.insert(session.clone(), user.into());
        session
    }

    /// Close a session.
    ///
    /// # Errors
    ///
    /// Fails if the session does not exist.
    pub async fn delete(&self, session: &str) -> Result<(), String> {
        match self.sessions.write().await.remove(session) {
            Some(_) => Ok(()),
            None => Err(format!("Session {session} not found.")),
        }
    }

    pub async fn user(&self, session: &str) -> Option<String> {
        self.sessions.read().await.get(session).cloned()
    }
}

impl Concept for Session {
    const NAME: &'static str = "Session";

    fn register(self: Arc<Self>, registry: &mut RegistryBuilder) {
        registry
            .action(&self, "create", |s: Arc<Self>, input: Create| async move {
                Ok::<_, String>(Created {
                    session: s.create(input.user).await,
                })
            })
            .action(&self, "delete", |s: Arc<Self>, input: Delete| async move {
                s.delete(&input.session).await
            })
            .query(&self, "_getUser", |s: Arc<Self>, input: GetUser| async move {
                s.user(&input.session)
                    .await
                    .map(|user| UserRow { user })
                    .into_iter()
                    .collect::<Vec<_>>()
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sessions_resolve_until_deleted() {
        let sessions = Session::new();
        let token = sessions.create("alice").await;
        assert_eq!(sessions.user(&token).await.as_deref(), Some("alice"));

        sessions.delete(&token).await.unwrap();
        assert!(sessions.user(&token).await.is_none());
        assert_eq!(
            sessions.delete(&token).await.unwrap_err(),
            format!("Session {token} not found.")
        );
    }
}
