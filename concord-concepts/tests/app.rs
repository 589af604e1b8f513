use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};
use concord_concepts::{
    App,
    event::{Event, EventStatus},
    interest::UserInterest,
    requesting::Requesting,
    reviewing::{Reviewing, WriteReview},
    syncs::{self, EVENT_NOT_FOUND, INVALID_SESSION},
};
use concord_core::{
    action::{ActionRecord, ActionRef, Record},
    config::EngineConfig,
    log::{ActionLog, LogFilter},
    sync::SyncSet,
    test::record,
};
use serde_json::{Value, json};

struct Harness {
    app: App,
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl Harness {
    fn new() -> Self {
        Self::with_syncs(syncs::all())
    }

    fn with_syncs(syncs: SyncSet) -> Self {
        let now = Arc::new(Mutex::new("2030-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap()));
        let clock = Arc::clone(&now);
        let app = App::builder()
            .clock(Arc::new(move || *clock.lock().unwrap()))
            .syncs(syncs)
            .build()
            .unwrap();
        Self { app, now }
    }

    fn advance_days(&self, days: i64) {
        *self.now.lock().unwrap() += TimeDelta::days(days);
    }

    async fn request(&self, path: &str, fields: Value) -> Record {
        self.app.request(path, record(fields)).await.unwrap()
    }

    async fn entries(&self, action: ActionRef) -> Vec<ActionRecord> {
        self.app.engine().log().load(&LogFilter::for_action(action)).await.unwrap()
    }

    /// Creates an event through a request and returns its id.
    async fn create_event(&self, session: &str) -> String {
        let response = self
            .request(
                "/Event/createEvent",
                json!({
                    "session": session,
                    "name": "Launch party",
                    "date": "2030-01-02T18:00:00Z",
                    "duration": 120,
                    "location": "Rooftop",
                    "description": "Drinks and demos",
                }),
            )
            .await;
        response["event"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn created_events_can_be_fetched() {
    let harness = Harness::new();
    let alice = harness.app.session().create("alice").await;
    let event = harness.create_event(&alice).await;

    let response = harness
        .request("/Event/_getEventById", json!({ "session": alice, "event": event }))
        .await;
    assert_eq!(response["event"]["id"], json!(event));
    assert_eq!(response["event"]["organizer"], json!("alice"));
    assert_eq!(response["event"]["status"], json!("upcoming"));
}

#[tokio::test]
async fn only_the_organizer_may_cancel() {
    let harness = Harness::new();
    let alice = harness.app.session().create("alice").await;
    let bob = harness.app.session().create("bob").await;
    let event = harness.create_event(&alice).await;

    let response = harness
        .request("/Event/cancelEvent", json!({ "session": bob, "event": event }))
        .await;
    assert_eq!(
        response,
        record(json!({ "error": "Only the event organizer can cancel the event." }))
    );
    assert!(harness.entries(Event::CANCEL_EVENT).await.is_empty());
    assert_eq!(
        harness.app.event().event_by_id(&event).await.unwrap().status,
        EventStatus::Upcoming
    );
}

#[tokio::test]
async fn organizer_cancels_and_restores() {
    let harness = Harness::new();
    let alice = harness.app.session().create("alice").await;
    let event = harness.create_event(&alice).await;

    let cancelled = harness
        .request("/Event/cancelEvent", json!({ "session": alice, "event": event }))
        .await;
    assert_eq!(cancelled, record(json!({ "success": true })));

    let again = harness
        .request("/Event/cancelEvent", json!({ "session": alice, "event": event }))
        .await;
    assert_eq!(
        again,
        record(json!({ "error": "Event cannot be cancelled as its status is not 'upcoming'." }))
    );

    let restored = harness
        .request("/Event/unCancelEvent", json!({ "session": alice, "event": event }))
        .await;
    assert_eq!(restored, record(json!({ "event": event })));
}

#[tokio::test]
async fn only_the_organizer_may_un_cancel() {
    let harness = Harness::new();
    let alice = harness.app.session().create("alice").await;
    let bob = harness.app.session().create("bob").await;
    let event = harness.create_event(&alice).await;
    harness
        .request("/Event/cancelEvent", json!({ "session": alice, "event": event }))
        .await;

    let response = harness
        .request("/Event/unCancelEvent", json!({ "session": bob, "event": event }))
        .await;
    assert_eq!(
        response,
        record(json!({ "error": "Only the event organizer can un-cancel the event." }))
    );
    assert!(harness.entries(Event::UN_CANCEL_EVENT).await.is_empty());
}

#[tokio::test]
async fn organizer_modifies_event() {
    let harness = Harness::new();
    let alice = harness.app.session().create("alice").await;
    let event = harness.create_event(&alice).await;

    let response = harness
        .request(
            "/Event/modifyEvent",
            json!({
                "session": alice,
                "event": event,
                "newName": "Launch party",
                "newDate": "2030-01-05T18:00:00Z",
                "newDuration": 90,
                "newLocation": "Garden",
                "newDescription": "Drinks and demos",
            }),
        )
        .await;
    assert_eq!(response, record(json!({ "event": event })));

    let doc = harness.app.event().event_by_id(&event).await.unwrap();
    assert_eq!(doc.location, "Garden");
    assert_eq!(doc.duration, 90);
}

#[tokio::test]
async fn invalid_sessions_are_rejected_before_any_action() {
    let harness = Harness::new();
    let response = harness
        .request(
            "/Event/createEvent",
            json!({
                "session": "nope",
                "name": "Launch party",
                "date": "2030-01-02T18:00:00Z",
                "duration": 120,
                "location": "Rooftop",
                "description": "Drinks and demos",
            }),
        )
        .await;
    assert_eq!(response, record(json!({ "error": INVALID_SESSION })));
    assert!(harness.entries(Event::CREATE_EVENT).await.is_empty());
}

#[tokio::test]
async fn unknown_events_are_reported() {
    let harness = Harness::new();
    let alice = harness.app.session().create("alice").await;

    let response = harness
        .request("/Event/deleteEvent", json!({ "session": alice, "event": "missing" }))
        .await;
    assert_eq!(response, record(json!({ "error": EVENT_NOT_FOUND })));

    let by_id = harness
        .request("/Event/_getEventById", json!({ "session": alice, "event": "missing" }))
        .await;
    assert_eq!(by_id, record(json!({ "event": null })));
}

#[tokio::test]
async fn action_errors_become_responses() {
    let harness = Harness::new();
    let alice = harness.app.session().create("alice").await;
    let response = harness
        .request(
            "/Event/createEvent",
            json!({
                "session": alice,
                "name": "Too late",
                "date": "2029-12-31T18:00:00Z",
                "duration": 60,
                "location": "Nowhere",
                "description": "",
            }),
        )
        .await;
    assert_eq!(response, record(json!({ "error": "Event date cannot be in the past." })));
}

#[tokio::test]
async fn listing_completes_ended_events_once() {
    let harness = Harness::new();
    let alice = harness.app.session().create("alice").await;
    let event = harness.create_event(&alice).await;
    harness.advance_days(3);

    let listing = harness
        .request("/Event/_getAllEvents", json!({ "session": alice }))
        .await;
    assert_eq!(listing["results"][0]["event"]["id"], json!(event));
    assert_eq!(listing["results"][0]["event"]["status"], json!("completed"));

    let completed = harness
        .request("/Event/_getEventsByStatus", json!({ "session": alice, "status": "completed" }))
        .await;
    assert_eq!(completed["results"].as_array().unwrap().len(), 1);

    assert_eq!(harness.entries(Event::COMPLETE_EVENT).await.len(), 1);
}

fn cascade_syncs(reviews_first: bool) -> SyncSet {
    let cascades = if reviews_first {
        SyncSet::new()
            .with(syncs::event::cascade_to_reviews())
            .with(syncs::event::cascade_to_interests())
    } else {
        SyncSet::new()
            .with(syncs::event::cascade_to_interests())
            .with(syncs::event::cascade_to_reviews())
    };
    let mut syncs = syncs::event::requests();
    syncs.merge(cascades);
    syncs.merge(syncs::interest::all());
    syncs
}

#[tokio::test]
async fn deletion_cascades_regardless_of_sync_order() {
    for reviews_first in [false, true] {
        let harness = Harness::with_syncs(cascade_syncs(reviews_first));
        let alice = harness.app.session().create("alice").await;
        let bob = harness.app.session().create("bob").await;
        let event = harness.create_event(&alice).await;

        let interest = harness
            .request("/UserInterest/addItemInterest", json!({ "session": bob, "item": event }))
            .await;
        assert!(interest.contains_key("itemInterest"));
        harness
            .app
            .reviewing()
            .add_review(WriteReview {
                user: "bob".to_string(),
                item: event.clone(),
                rating: 8,
                entry: "Great venue".to_string(),
            })
            .await
            .unwrap();

        let response = harness
            .request("/Event/deleteEvent", json!({ "session": alice, "event": event }))
            .await;
        assert_eq!(response, record(json!({ "success": true })));

        assert_eq!(harness.entries(UserInterest::REMOVE_ITEM_INTEREST).await.len(), 1);
        assert_eq!(harness.entries(Reviewing::REMOVE_REVIEW).await.len(), 1);
        assert!(harness.app.interest().users_interested_in(&event).await.is_empty());
        assert!(harness.app.reviewing().reviews_by_item(&event).await.is_empty());
        assert!(harness.app.event().event_by_id(&event).await.is_none());
    }
}

#[tokio::test]
async fn personal_interests_round_trip_through_requests() {
    let harness = Harness::new();
    let alice = harness.app.session().create("alice").await;

    let added = harness
        .request("/UserInterest/addPersonalInterest", json!({ "session": alice, "tag": "jazz" }))
        .await;
    assert!(added["personalInterest"].is_string());

    let duplicate = harness
        .request("/UserInterest/addPersonalInterest", json!({ "session": alice, "tag": "jazz" }))
        .await;
    assert_eq!(
        duplicate,
        record(json!({ "error": "User alice already has personal interest 'jazz'." }))
    );

    let listing = harness
        .request("/UserInterest/_getPersonalInterests", json!({ "session": alice }))
        .await;
    assert_eq!(listing["results"][0]["personalInterest"]["tag"], json!("jazz"));

    let removed = harness
        .request("/UserInterest/removePersonalInterest", json!({ "session": alice, "tag": "jazz" }))
        .await;
    assert_eq!(removed, record(json!({ "success": true })));
    assert!(harness.app.interest().personal_interests("alice").await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_get_their_own_responses() {
    let app = App::new(EngineConfig::default()).unwrap();
    let mut tasks = Vec::new();
    for user in ["ann", "ben", "cid", "dee"] {
        let app = app.clone();
        tasks.push(tokio::spawn(async move {
            let session = app.session().create(user).await;
            let tag = format!("{user}-tag");
            app.request(
                "/UserInterest/addPersonalInterest",
                record(json!({ "session": session, "tag": tag })),
            )
            .await
            .unwrap();
            let listing = app
                .request(
                    "/UserInterest/_getPersonalInterests",
                    record(json!({ "session": session })),
                )
                .await
                .unwrap();
            (tag, listing)
        }));
    }

    for task in tasks {
        let (tag, listing) = task.await.unwrap();
        let results = listing["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["personalInterest"]["tag"], json!(tag));
    }
}

#[tokio::test]
async fn malformed_query_input_gets_exactly_one_error_response() {
    let harness = Harness::new();
    let alice = harness.app.session().create("alice").await;

    let response = harness
        .request("/Event/_getEventsByStatus", json!({ "session": alice, "status": "bogus" }))
        .await;
    assert_eq!(response.len(), 1);
    assert!(
        response["error"]
            .as_str()
            .is_some_and(|error| error.starts_with("invalid input") && error.contains("bogus"))
    );
    assert_eq!(harness.entries(Requesting::RESPOND).await.len(), 1);

    let response = harness.request("/Event/_getAllEvents", json!({ "session": 5 })).await;
    assert_eq!(response, record(json!({ "error": INVALID_SESSION })));
    assert_eq!(harness.entries(Requesting::RESPOND).await.len(), 2);

    let response = harness
        .request("/Event/_getEventById", json!({ "session": alice, "event": 42 }))
        .await;
    assert!(response["error"].as_str().is_some_and(|error| error.starts_with("invalid input")));
    assert_eq!(harness.entries(Requesting::RESPOND).await.len(), 3);
    assert_eq!(harness.app.requesting().open_requests().await, 0);
}

#[tokio::test]
async fn signing_in_opens_a_usable_session() {
    let harness = Harness::new();

    let registered = harness
        .request("/UserAuthentication/register", json!({ "username": "alice", "password": "s3cret" }))
        .await;
    let user = registered["user"].as_str().unwrap().to_string();

    let duplicate = harness
        .request("/UserAuthentication/register", json!({ "username": "alice", "password": "other" }))
        .await;
    assert_eq!(duplicate, record(json!({ "error": "Username 'alice' already exists" })));

    let refused = harness
        .request("/UserAuthentication/authenticate", json!({ "username": "alice", "password": "wrong" }))
        .await;
    assert_eq!(refused, record(json!({ "error": "Invalid username or password" })));

    let signed_in = harness
        .request("/UserAuthentication/authenticate", json!({ "username": "alice", "password": "s3cret" }))
        .await;
    let session = signed_in["session"].as_str().unwrap();
    assert_eq!(harness.app.session().user(session).await, Some(user.clone()));

    let event = harness.create_event(session).await;
    let created = harness.app.event().event_by_id(&event).await.unwrap();
    assert_eq!(created.organizer, user);
}
