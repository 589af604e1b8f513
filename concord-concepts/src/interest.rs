//! What users are interested in: free-form tags and concrete items.

use std::{collections::HashMap, sync::Arc};

use concord_core::{
    action::{ActionRef, QueryRef},
    concept::{Concept, RegistryBuilder},
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PersonalInterest {
    pub id: String,
    pub user: String,
    pub tag: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ItemInterest {
    pub id: String,
    pub user: String,
    pub item: String,
}

#[derive(Deserialize)]
pub struct UserTag {
    pub user: String,
    pub tag: String,
}

#[derive(Deserialize)]
pub struct UserItem {
    pub user: String,
    pub item: String,
}

#[derive(Deserialize)]
pub struct ByUser {
    pub user: String,
}

#[derive(Deserialize)]
pub struct ByItem {
    pub item: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalInterestId {
    pub personal_interest: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemInterestId {
    pub item_interest: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalInterestRow {
    pub personal_interest: PersonalInterest,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemInterestRow {
    pub item_interest: ItemInterest,
}

#[derive(Serialize)]
pub struct UserRow {
    pub user: String,
}

#[derive(Debug, Default)]
struct Interests {
    personal: HashMap<String, PersonalInterest>,
    items: HashMap<String, ItemInterest>,
}

/// Interest store.
#[derive(Debug, Default)]
pub struct UserInterest {
    inner: RwLock<Interests>,
}

impl UserInterest {
    pub const ADD_PERSONAL_INTEREST: ActionRef = ActionRef::new(Self::NAME, "addPersonalInterest");
    pub const REMOVE_PERSONAL_INTEREST: ActionRef = ActionRef::new(Self::NAME, "removePersonalInterest");
    pub const ADD_ITEM_INTEREST: ActionRef = ActionRef::new(Self::NAME, "addItemInterest");
    pub const REMOVE_ITEM_INTEREST: ActionRef = ActionRef::new(Self::NAME, "removeItemInterest");

    pub const GET_PERSONAL_INTERESTS: QueryRef = QueryRef::new(Self::NAME, "_getPersonalInterests");
    pub const GET_ITEM_INTERESTS: QueryRef = QueryRef::new(Self::NAME, "_getItemInterests");
    pub const GET_USERS_INTERESTED_IN_ITEMS: QueryRef = QueryRef::new(Self::NAME, "_getUsersInterestedInItems");

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Rejects empty tags and tags the user already has.
    pub async fn add_personal_interest(&self, user: String, tag: String) -> Result<String, String> {
        let tag = tag.trim().to_string();
        if tag.is_empty() {
            return Err("Tag cannot be empty.".to_string());
        }
        let mut inner = self.inner.write().await;
        if inner.personal.values().any(|i| i.user == user && i.tag == tag) {
            return Err(format!("User {user} already has personal interest '{tag}'."));
        }
        let id = Uuid::new_v4().to_string();
        inner
            .personal
            .insert(id.clone(), PersonalInterest { id: id.clone(), user, tag });
        Ok(id)
    }

    /// # Errors
    ///
    /// Fails if the user has no such tag.
    pub async fn remove_personal_interest(&self, user: &str, tag: &str) -> Result<String, String> {
        let tag = tag.trim();
        let mut inner = self.inner.write().await;
        let id = inner
            .personal
            .values()
            .find(|i| i.user == user && i.tag == tag)
            .map(|i| i.id.clone())
            .ok_or_else(|| format!("No personal interest '{tag}' found for user {user}."))?;
        inner.personal.remove(&id);
        Ok(id)
    }

    /// # Errors
    ///
    /// Rejects items the user is already interested in.
    pub async fn add_item_interest(&self, user: String, item: String) -> Result<String, String> {
        let mut inner = self.inner.write().await;
        if inner.items.values().any(|i| i.user == user && i.item == item) {
            return Err(format!("User {user} is already interested in item {item}."));
        }
        let id = Uuid::new_v4().to_string();
        inner
            .items
            .insert(id.clone(), ItemInterest { id: id.clone(), user, item });
        Ok(id)
    }

    /// # Errors
    ///
    /// Fails if the user is not interested in the item.
    pub async fn remove_item_interest(&self, user: &str, item: &str) -> Result<String, String> {
        let mut inner = self.inner.write().await;
        let id = inner
            .items
            .values()
            .find(|i| i.user == user && i.item == item)
            .map(|i| i.id.clone())
            .ok_or_else(|| format!("User {user} has no interest in item {item}."))?;
        inner.items.remove(&id);
        Ok(id)
    }

    pub async fn personal_interests(&self, user: &str) -> Vec<PersonalInterest> {
        let mut found: Vec<_> = self
            .inner
            .read()
            .await
            .personal
            .values()
            .filter(|i| i.user == user)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.tag.cmp(&b.tag));
        found
    }

    pub async fn item_interests(&self, user: &str) -> Vec<ItemInterest> {
        let mut found: Vec<_> = self
            .inner
            .read()
            .await
            .items
            .values()
            .filter(|i| i.user == user)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.item.cmp(&b.item));
        found
    }

    pub async fn users_interested_in(&self, item: &str) -> Vec<String> {
        let mut users: Vec<_> = self
            .inner
            .read()
            .await
            .items
            .values()
            .filter(|i| i.item == item)
            .map(|i| i.user.clone())
            .collect();
        users.sort();
        users
    }
}

impl Concept for UserInterest {
    const NAME: &'static str = "UserInterest";

    fn register(self: Arc<Self>, registry: &mut RegistryBuilder) {
        registry
            .action(&self, "addPersonalInterest", |u: Arc<Self>, input: UserTag| async move {
                u.add_personal_interest(input.user, input.tag)
                    .await
                    .map(|personal_interest| PersonalInterestId { personal_interest })
            })
            .action(&self, "removePersonalInterest", |u: Arc<Self>, input: UserTag| async move {
                u.remove_personal_interest(&input.user, &input.tag)
                    .await
                    .map(|personal_interest| PersonalInterestId { personal_interest })
            })
            .action(&self, "addItemInterest", |u: Arc<Self>, input: UserItem| async move {
                u.add_item_interest(input.user, input.item)
                    .await
                    .map(|item_interest| ItemInterestId { item_interest })
            })
            .action(&self, "removeItemInterest", |u: Arc<Self>, input: UserItem| async move {
                u.remove_item_interest(&input.user, &input.item)
                    .await
                    .map(|item_interest| ItemInterestId { item_interest })
            })
            .query(&self, "_getPersonalInterests", |u: Arc<Self>, input: ByUser| async move {
                u.personal_interests(&input.user)
                    .await
                    .into_iter()
                    .map(|personal_interest| PersonalInterestRow { personal_interest })
                    .collect::<Vec<_>>()
            })
            .query(&self, "_getItemInterests", |u: Arc<Self>, input: ByUser| async move {
                u.item_interests(&input.user)
                    .await
                    .into_iter()
                    .map(|item_interest| ItemInterestRow { item_interest })
                    .collect::<Vec<_>>()
            })
            .query(&self, "_getUsersInterestedInItems", |u: Arc<Self>, input: ByItem| async move {
                u.users_interested_in(&input.item)
                    .await
                    .into_iter()
                    .map(|user| UserRow { user })
                    .collect::<Vec<_>>()
            });
    }
}
