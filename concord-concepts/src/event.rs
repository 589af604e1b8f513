//! Scheduled events.
//!
//! An event is `upcoming` until it is cancelled or completed. Completion is
//! never requested by users: once an upcoming event's end time has passed it
//! is reported as `completed` by every query, and the completion syncs record
//! that through `Event.completeEvent`.

use std::{collections::HashMap, fmt, sync::Arc};

use chrono::{DateTime, TimeDelta, Utc};
use concord_core::{
    action::{ActionRef, QueryRef},
    concept::{Concept, RegistryBuilder},
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Source of the current time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Upcoming,
    Cancelled,
    Completed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EventDoc {
    pub id: String,
    pub organizer: String,
    pub name: String,
    pub date: DateTime<Utc>,
    /// Minutes.
    pub duration: i64,
    pub location: String,
    pub description: String,
    pub status: EventStatus,
}

impl EventDoc {
    /// `None` when the end lies beyond the representable range.
    #[must_use]
    pub fn end(&self) -> Option<DateTime<Utc>> {
        TimeDelta::try_minutes(self.duration).and_then(|duration| self.date.checked_add_signed(duration))
    }

    fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end().is_some_and(|end| end <= now)
    }

    fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == EventStatus::Upcoming && self.has_ended(now)
    }

    /// The document as queries report it.
    fn effective(&self, now: DateTime<Utc>) -> Self {
        let mut doc = self.clone();
        if doc.is_overdue(now) {
            doc.status = EventStatus::Completed;
        }
        doc
    }
}

#[derive(Deserialize)]
pub struct CreateEvent {
    pub organizer: String,
    pub name: String,
    pub date: DateTime<Utc>,
    pub duration: i64,
    pub location: String,
    pub description: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyEvent {
    pub organizer: String,
    pub event: String,
    pub new_name: String,
    pub new_date: DateTime<Utc>,
    pub new_duration: i64,
    pub new_location: String,
    pub new_description: String,
}

/// Input of the organizer-only lifecycle actions.
#[derive(Deserialize)]
pub struct OrganizerAction {
    pub organizer: String,
    pub event: String,
}

#[derive(Deserialize)]
pub struct ByEvent {
    pub event: String,
}

#[derive(Deserialize)]
pub struct ByOrganizer {
    pub organizer: String,
}

#[derive(Deserialize)]
pub struct ByStatus {
    pub status: EventStatus,
}

#[derive(Deserialize)]
pub struct NoInput {}

#[derive(Serialize)]
pub struct EventId {
    pub event: String,
}

#[derive(Serialize)]
pub struct EventRow {
    pub event: EventDoc,
}

#[derive(Clone, Copy)]
enum Lifecycle {
    Cancel,
    UnCancel,
    Delete,
}

impl Lifecycle {
    const fn denied(self) -> &'static str {
        match self {
            Self::Cancel => "Only the event organizer can cancel the event.",
            Self::UnCancel => "Only the event organizer can un-cancel the event.",
            Self::Delete => "Only the event organizer can delete the event.",
        }
    }
}

/// Event store.
pub struct Event {
    events: RwLock<HashMap<String, EventDoc>>,
    clock: Clock,
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event").field("events", &self.events).finish_non_exhaustive()
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }
}

impl Event {
    pub const CREATE_EVENT: ActionRef = ActionRef::new(Self::NAME, "createEvent");
    pub const MODIFY_EVENT: ActionRef = ActionRef::new(Self::NAME, "modifyEvent");
    pub const CANCEL_EVENT: ActionRef = ActionRef::new(Self::NAME, "cancelEvent");
    pub const UN_CANCEL_EVENT: ActionRef = ActionRef::new(Self::NAME, "unCancelEvent");
    pub const DELETE_EVENT: ActionRef = ActionRef::new(Self::NAME, "deleteEvent");
    pub const COMPLETE_EVENT: ActionRef = ActionRef::new(Self::NAME, "completeEvent");

    pub const GET_EVENT_BY_ID: QueryRef = QueryRef::new(Self::NAME, "_getEventById");
    pub const GET_EVENTS_BY_ORGANIZER: QueryRef = QueryRef::new(Self::NAME, "_getEventsByOrganizer");
    pub const GET_EVENTS_BY_STATUS: QueryRef = QueryRef::new(Self::NAME, "_getEventsByStatus");
    pub const GET_ALL_EVENTS: QueryRef = QueryRef::new(Self::NAME, "_getAllEvents");
    pub const GET_OVERDUE_EVENTS: QueryRef = QueryRef::new(Self::NAME, "_getOverdueEvents");

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// # Errors
    ///
    /// Rejects past dates, empty names and non-positive durations.
    pub async fn create_event(&self, input: CreateEvent) -> Result<String, String> {
        if input.date < self.now() {
            return Err("Event date cannot be in the past.".to_string());
        }
        if input.name.trim().is_empty() {
            return Err("Event name cannot be empty.".to_string());
        }
        if input.duration <= 0 {
            return Err("Event duration must be a positive number of minutes.".to_string());
        }

        let id = Uuid::new_v4().to_string();
        let doc = EventDoc {
            id: id.clone(),
            organizer: input.organizer,
            name: input.name,
            date: input.date,
            duration: input.duration,
            location: input.location,
            description: input.description,
            status: EventStatus::Upcoming,
        };
        tracing::debug!(event = %id, organizer = %doc.organizer, "event created");
        self.events.write().await.insert(id.clone(), doc);
        Ok(id)
    }

    /// # Errors
    ///
    /// Rejects unknown events, non-organizers, no-op edits and invalid values.
    pub async fn modify_event(&self, input: ModifyEvent) -> Result<String, String> {
        let now = self.now();
        let mut events = self.events.write().await;
        let doc = events.get_mut(&input.event).ok_or_else(|| not_found(&input.event))?;
        if doc.organizer != input.organizer {
            return Err("Only the event organizer can modify the event.".to_string());
        }
        let unchanged = doc.name == input.new_name
            && doc.date == input.new_date
            && doc.duration == input.new_duration
            && doc.location == input.new_location
            && doc.description == input.new_description;
        if unchanged {
            return Err("At least one field must differ from the original event details to modify.".to_string());
        }
        if input.new_date < now {
            return Err("New event date cannot be in the past.".to_string());
        }
        if input.new_name.trim().is_empty() {
            return Err("New event name cannot be empty.".to_string());
        }
        if input.new_duration <= 0 {
            return Err("New event duration must be a positive number of minutes.".to_string());
        }

        doc.name = input.new_name;
        doc.date = input.new_date;
        doc.duration = input.new_duration;
        doc.location = input.new_location;
        doc.description = input.new_description;
        Ok(input.event)
    }

    /// # Errors
    ///
    /// Rejects unknown events, non-organizers and events that are not upcoming.
    pub async fn cancel_event(&self, input: OrganizerAction) -> Result<String, String> {
        self.transition(input, Lifecycle::Cancel).await
    }

    /// # Errors
    ///
    /// Rejects unknown events, non-organizers, events that are not cancelled
    /// and events that have already ended.
    pub async fn un_cancel_event(&self, input: OrganizerAction) -> Result<String, String> {
        self.transition(input, Lifecycle::UnCancel).await
    }

    /// # Errors
    ///
    /// Rejects unknown events and non-organizers.
    pub async fn delete_event(&self, input: OrganizerAction) -> Result<String, String> {
        self.transition(input, Lifecycle::Delete).await
    }

    async fn transition(&self, input: OrganizerAction, lifecycle: Lifecycle) -> Result<String, String> {
        let now = self.now();
        let mut events = self.events.write().await;
        let doc = events.get_mut(&input.event).ok_or_else(|| not_found(&input.event))?;
        if doc.organizer != input.organizer {
            return Err(lifecycle.denied().to_string());
        }

        match lifecycle {
            Lifecycle::Cancel => {
                if doc.status != EventStatus::Upcoming {
                    return Err("Event cannot be cancelled as its status is not 'upcoming'.".to_string());
                }
                doc.status = EventStatus::Cancelled;
            }
            Lifecycle::UnCancel => {
                if doc.status != EventStatus::Cancelled {
                    return Err("Event cannot be un-cancelled as its status is not 'cancelled'.".to_string());
                }
                if doc.has_ended(now) {
                    return Err("Cannot un-cancel an event that has already ended.".to_string());
                }
                doc.status = EventStatus::Upcoming;
            }
            Lifecycle::Delete => {
                events.remove(&input.event);
                tracing::debug!(event = %input.event, "event deleted");
            }
        }
        Ok(input.event)
    }

    /// Mark an upcoming event whose end has passed as completed.
    ///
    /// # Errors
    ///
    /// Rejects unknown events, events that are not upcoming and events that
    /// have not ended.
    pub async fn complete_event(&self, event: String) -> Result<String, String> {
        let now = self.now();
        let mut events = self.events.write().await;
        let doc = events.get_mut(&event).ok_or_else(|| not_found(&event))?;
        if doc.status != EventStatus::Upcoming {
            return Err("Event cannot be completed as its status is not 'upcoming'.".to_string());
        }
        if !doc.has_ended(now) {
            return Err("Event cannot be completed as it has not yet ended.".to_string());
        }
        doc.status = EventStatus::Completed;
        tracing::debug!(%event, "event completed");
        Ok(event)
    }

    pub async fn event_by_id(&self, event: &str) -> Option<EventDoc> {
        let now = self.now();
        self.events.read().await.get(event).map(|doc| doc.effective(now))
    }

    pub async fn events_by_organizer(&self, organizer: &str) -> Vec<EventDoc> {
        self.select(|doc| doc.organizer == organizer).await
    }

    pub async fn events_by_status(&self, status: EventStatus) -> Vec<EventDoc> {
        self.select(|doc| doc.status == status).await
    }

    pub async fn all_events(&self) -> Vec<EventDoc> {
        self.select(|_| true).await
    }

    /// Ids of upcoming events whose end has passed.
    pub async fn overdue_events(&self) -> Vec<String> {
        let now = self.now();
        let mut overdue: Vec<_> = self
            .events
            .read()
            .await
            .values()
            .filter(|doc| doc.is_overdue(now))
            .map(|doc| (doc.date, doc.id.clone()))
            .collect();
        overdue.sort();
        overdue.into_iter().map(|(_, id)| id).collect()
    }

    /// Effective documents matching `predicate`, ordered by date.
    async fn select(&self, predicate: impl Fn(&EventDoc) -> bool) -> Vec<EventDoc> {
        let now = self.now();
        let mut docs: Vec<_> = self
            .events
            .read()
            .await
            .values()
            .map(|doc| doc.effective(now))
            .filter(|doc| predicate(doc))
            .collect();
        docs.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        docs
    }
}

fn not_found(event: &str) -> String {
    format!("Event with ID {event} not found.")
}

fn rows(docs: Vec<EventDoc>) -> Vec<EventRow> {
    docs.into_iter().map(|event| EventRow { event }).collect()
}

impl Concept for Event {
    const NAME: &'static str = "Event";

    fn register(self: Arc<Self>, registry: &mut RegistryBuilder) {
        registry
            .action(&self, "createEvent", |e: Arc<Self>, input: CreateEvent| async move {
                e.create_event(input).await.map(|event| EventId { event })
            })
            .action(&self, "modifyEvent", |e: Arc<Self>, input: ModifyEvent| async move {
                e.modify_event(input).await.map(|event| EventId { event })
            })
            .action(&self, "cancelEvent", |e: Arc<Self>, input: OrganizerAction| async move {
                e.cancel_event(input).await.map(|event| EventId { event })
            })
            .action(&self, "unCancelEvent", |e: Arc<Self>, input: OrganizerAction| async move {
                e.un_cancel_event(input).await.map(|event| EventId { event })
            })
            .action(&self, "deleteEvent", |e: Arc<Self>, input: OrganizerAction| async move {
                e.delete_event(input).await.map(|event| EventId { event })
            })
            .action(&self, "completeEvent", |e: Arc<Self>, input: ByEvent| async move {
                e.complete_event(input.event).await.map(|event| EventId { event })
            })
            .query(&self, "_getEventById", |e: Arc<Self>, input: ByEvent| async move {
                rows(e.event_by_id(&input.event).await.into_iter().collect())
            })
            .query(&self, "_getEventsByOrganizer", |e: Arc<Self>, input: ByOrganizer| async move {
                rows(e.events_by_organizer(&input.organizer).await)
            })
            .query(&self, "_getEventsByStatus", |e: Arc<Self>, input: ByStatus| async move {
                rows(e.events_by_status(input.status).await)
            })
            .query(&self, "_getAllEvents", |e: Arc<Self>, _: NoInput| async move {
                rows(e.all_events().await)
            })
            .query(&self, "_getOverdueEvents", |e: Arc<Self>, _: NoInput| async move {
                e.overdue_events()
                    .await
                    .into_iter()
                    .map(|event| EventId { event })
                    .collect::<Vec<_>>()
            });
    }
}
