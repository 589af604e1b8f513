//! The bridge between external callers and the action log.
//!
//! An incoming request becomes a `Requesting.request` entry carrying its
//! `path` and fields; syncs match on the path and eventually call
//! `Requesting.respond` with the same request id. The caller then collects
//! the response with [`Requesting::take_response`].

use std::{collections::HashMap, sync::Arc};

use concord_core::{
    action::{ActionRef, QueryRef, Record},
    concept::{Concept, RegistryBuilder},
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct Request {
    pub path: String,
    #[serde(flatten)]
    pub fields: Record,
}

#[derive(Deserialize)]
pub struct Respond {
    pub request: String,
    #[serde(flatten)]
    pub fields: Record,
}

#[derive(Deserialize)]
pub struct GetResponse {
    pub request: String,
}

#[derive(Serialize)]
pub struct RequestId {
    pub request: String,
}

#[derive(Serialize)]
pub struct ResponseRow {
    pub response: Record,
}

#[derive(Debug)]
struct Pending {
    path: String,
    response: Option<Record>,
}

/// Open requests and their responses.
#[derive(Debug, Default)]
pub struct Requesting {
    requests: RwLock<HashMap<String, Pending>>,
}

impl Requesting {
    pub const REQUEST: ActionRef = ActionRef::new(Self::NAME, "request");
    pub const RESPOND: ActionRef = ActionRef::new(Self::NAME, "respond");
    pub const GET_RESPONSE: QueryRef = QueryRef::new(Self::NAME, "_getResponse");

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a request for `path` and return its id.
    pub async fn request(&self, path: String) -> String {
        let request = Uuid::new_v4().to_string();
        tracing::debug!(%request, %path, "request opened");
        self.requests.write().await.insert(
            request.clone(),
            Pending {
                path,
                response: None,
            },
        );
        request
    }

    /// Answer an open request.
    ///
    /// # Errors
    ///
    /// Fails if the request is unknown or was already answered.
    pub async fn respond(&self, request: &str, response: Record) -> Result<(), String> {
        let mut requests = self.requests.write().await;
        let Some(pending) = requests.get_mut(request) else {
            return Err(format!("Request {request} not found."));
        };
        if pending.response.is_some() {
            tracing::warn!(%request, path = %pending.path, "request answered twice");
            return Err(format!("Request {request} has already been answered."));
        }
        pending.response = Some(response);
        Ok(())
    }

    pub async fn response(&self, request: &str) -> Option<Record> {
        self.requests
            .read()
            .await
            .get(request)
            .and_then(|pending| pending.response.clone())
    }

    /// Requests opened and not yet collected.
    pub async fn open_requests(&self) -> usize {
        self.requests.read().await.len()
    }

    /// Remove a request, returning its response if it was answered.
    pub async fn take_response(&self, request: &str) -> Option<Record> {
        self.requests
            .write()
            .await
            .remove(request)
            .and_then(|pending| pending.response)
    }
}

impl Concept for Requesting {
    const NAME: &'static str = "Requesting";

    fn register(self: Arc<Self>, registry: &mut RegistryBuilder) {
        registry
            .action(&self, "request", |r: Arc<Self>, Request { path, .. }: Request| async move {
                Ok::<_, String>(RequestId {
                    request: r.request(path).await,
                })
            })
            .action(&self, "respond", |r: Arc<Self>, input: Respond| async move {
                r.respond(&input.request, input.fields).await?;
                Ok::<_, String>(RequestId {
                    request: input.request,
                })
            })
            .query(&self, "_getResponse", |r: Arc<Self>, input: GetResponse| async move {
                r.response(&input.request)
                    .await
                    .map(|response| ResponseRow { response })
                    .into_iter()
                    .collect::<Vec<_>>()
            });
    }
}
