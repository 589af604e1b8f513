//! Ratings and written reviews of items, one per user and item.

use std::{collections::HashMap, sync::Arc};

use concord_core::{
    action::{ActionRef, QueryRef},
    concept::{Concept, RegistryBuilder},
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

const RATING_RANGE: std::ops::RangeInclusive<i64> = 0..=10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Review {
    pub id: String,
    pub reviewer: String,
    pub target: String,
    pub rating: i64,
    pub entry: String,
}

#[derive(Deserialize)]
pub struct WriteReview {
    pub user: String,
    pub item: String,
    pub rating: i64,
    pub entry: String,
}

#[derive(Deserialize)]
pub struct UserItem {
    pub user: String,
    pub item: String,
}

#[derive(Deserialize)]
pub struct ByItem {
    pub item: String,
}

#[derive(Deserialize)]
pub struct ByUser {
    pub user: String,
}

#[derive(Serialize)]
pub struct ReviewId {
    pub review: String,
}

#[derive(Serialize)]
pub struct ReviewRow {
    pub review: Review,
}

/// Review store keyed by review id.
#[derive(Debug, Default)]
pub struct Reviewing {
    reviews: RwLock<HashMap<String, Review>>,
}

impl Reviewing {
    pub const ADD_REVIEW: ActionRef = ActionRef::new(Self::NAME, "addReview");
    pub const REMOVE_REVIEW: ActionRef = ActionRef::new(Self::NAME, "removeReview");
    pub const MODIFY_REVIEW: ActionRef = ActionRef::new(Self::NAME, "modifyReview");

    pub const GET_REVIEW: QueryRef = QueryRef::new(Self::NAME, "_getReview");
    pub const GET_REVIEWS_BY_ITEM: QueryRef = QueryRef::new(Self::NAME, "_getReviewsByItem");
    pub const GET_REVIEWS_BY_USER: QueryRef = QueryRef::new(Self::NAME, "_getReviewsByUser");

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Rejects ratings outside 0..=10 and a second review of the same item.
    pub async fn add_review(&self, input: WriteReview) -> Result<String, String> {
        check_rating(input.rating)?;
        let mut reviews = self.reviews.write().await;
        if find(&reviews, &input.user, &input.item).is_some() {
            return Err(format!(
                "User {} has already reviewed item {}.",
                input.user, input.item
            ));
        }
        let id = Uuid::new_v4().to_string();
        reviews.insert(
            id.clone(),
            Review {
                id: id.clone(),
                reviewer: input.user,
                target: input.item,
                rating: input.rating,
                entry: input.entry,
            },
        );
        Ok(id)
    }

    /// # Errors
    ///
    /// Fails if the user has not reviewed the item.
    pub async fn remove_review(&self, user: &str, item: &str) -> Result<(), String> {
        let mut reviews = self.reviews.write().await;
        let id = find(&reviews, user, item)
            .ok_or_else(|| format!("No review by user {user} for item {item} found to remove."))?;
        reviews.remove(&id);
        Ok(())
    }

    /// # Errors
    ///
    /// Rejects ratings outside 0..=10 and reviews that do not exist.
    pub async fn modify_review(&self, input: WriteReview) -> Result<String, String> {
        check_rating(input.rating)?;
        let mut reviews = self.reviews.write().await;
        let id = find(&reviews, &input.user, &input.item).ok_or_else(|| {
            format!(
                "No review by user {} for item {} found to modify.",
                input.user, input.item
            )
        })?;
        if let Some(review) = reviews.get_mut(&id) {
            review.rating = input.rating;
            review.entry = input.entry;
        }
        Ok(id)
    }

    pub async fn review(&self, user: &str, item: &str) -> Option<Review> {
        let reviews = self.reviews.read().await;
        find(&reviews, user, item).and_then(|id| reviews.get(&id).cloned())
    }

    pub async fn reviews_by_item(&self, item: &str) -> Vec<Review> {
        self.select(|review| review.target == item).await
    }

    pub async fn reviews_by_user(&self, user: &str) -> Vec<Review> {
        self.select(|review| review.reviewer == user).await
    }

    async fn select(&self, predicate: impl Fn(&Review) -> bool) -> Vec<Review> {
        let mut found: Vec<_> = self
            .reviews
            .read()
            .await
            .values()
            .filter(|review| predicate(review))
            .cloned()
            .collect();
        found.sort_by(|a, b| (&a.reviewer, &a.target).cmp(&(&b.reviewer, &b.target)));
        found
    }
}

fn check_rating(rating: i64) -> Result<(), String> {
    if RATING_RANGE.contains(&rating) {
        Ok(())
    } else {
        Err("Rating must be between 0 and 10.".to_string())
    }
}

fn find(reviews: &HashMap<String, Review>, user: &str, item: &str) -> Option<String> {
    reviews
        .values()
        .find(|review| review.reviewer == user && review.target == item)
        .map(|review| review.id.clone())
}

fn rows(reviews: Vec<Review>) -> Vec<ReviewRow> {
    reviews.into_iter().map(|review| ReviewRow { review }).collect()
}

impl Concept for Reviewing {
    const NAME: &'static str = "Reviewing";

    fn register(self: Arc<Self>, registry: &mut RegistryBuilder) {
        registry
            .action(&self, "addReview", |r: Arc<Self>, input: WriteReview| async move {
                r.add_review(input).await.map(|review| ReviewId { review })
            })
            .action(&self, "removeReview", |r: Arc<Self>, input: UserItem| async move {
                r.remove_review(&input.user, &input.item).await
            })
            .action(&self, "modifyReview", |r: Arc<Self>, input: WriteReview| async move {
                r.modify_review(input).await.map(|review| ReviewId { review })
            })
            .query(&self, "_getReview", |r: Arc<Self>, input: UserItem| async move {
                rows(r.review(&input.user, &input.item).await.into_iter().collect())
            })
            .query(&self, "_getReviewsByItem", |r: Arc<Self>, input: ByItem| async move {
                rows(r.reviews_by_item(&input.item).await)
            })
            .query(&self, "_getReviewsByUser", |r: Arc<Self>, input: ByUser| async move {
                rows(r.reviews_by_user(&input.user).await)
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(user: &str, item: &str, rating: i64) -> WriteReview {
        WriteReview {
            user: user.to_string(),
            item: item.to_string(),
            rating,
            entry: "fine".to_string(),
        }
    }

    #[tokio::test]
    async fn one_review_per_user_and_item() {
        let reviewing = Reviewing::new();
        let id = reviewing.add_review(write("alice", "e1", 7)).await.unwrap();
        let err = reviewing.add_review(write("alice", "e1", 3)).await.unwrap_err();
        assert_eq!(err, "User alice has already reviewed item e1.");

        assert_eq!(reviewing.modify_review(write("alice", "e1", 9)).await.unwrap(), id);
        assert_eq!(reviewing.review("alice", "e1").await.unwrap().rating, 9);

        reviewing.remove_review("alice", "e1").await.unwrap();
        assert!(reviewing.review("alice", "e1").await.is_none());
        assert!(reviewing.modify_review(write("alice", "e1", 1)).await.is_err());
    }

    #[tokio::test]
    async fn ratings_are_bounded() {
        let reviewing = Reviewing::new();
        for rating in [-1, 11] {
            let err = reviewing.add_review(write("alice", "e1", rating)).await.unwrap_err();
            assert_eq!(err, "Rating must be between 0 and 10.");
        }
        assert!(reviewing.add_review(write("alice", "e1", 0)).await.is_ok());
        assert!(reviewing.add_review(write("bob", "e1", 10)).await.is_ok());
    }

    #[tokio::test]
    async fn reviews_are_indexed_by_item_and_user() {
        let reviewing = Reviewing::new();
        reviewing.add_review(write("bob", "e1", 5)).await.unwrap();
        reviewing.add_review(write("alice", "e1", 6)).await.unwrap();
        reviewing.add_review(write("alice", "e2", 4)).await.unwrap();

        let reviewers: Vec<_> = reviewing.reviews_by_item("e1").await.into_iter().map(|r| r.reviewer).collect();
        assert_eq!(reviewers, vec!["alice", "bob"]);
        assert_eq!(reviewing.reviews_by_user("alice").await.len(), 2);
    }
}
