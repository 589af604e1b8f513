//! Syncs exposing the Event concept through requests.
//!
//! Every mutating request gets four syncs: the request sync invokes the
//! action when the caller may perform it, the guard sync answers with the
//! reason when they may not, and the success and error syncs relay the
//! action's outcome. Exactly one of them answers any given request.

use std::iter;

use concord_core::{
    action::ActionRef,
    concept::ConceptRegistry,
    engine::EngineError,
    frame::{Frame, Frames},
    pattern::Template,
    symbol::{Symbol, Vars},
    sync::{SyncRule, SyncSet, SyncSpec},
    template,
};
use serde_json::Value;

use super::common::{
    INVALID_SESSION, Reply, authenticated, error_response, input_guard, query_response, request_input,
    session_guard, success_response, title, vars,
};
use crate::{event::Event, interest::UserInterest, requesting::Requesting, reviewing::Reviewing};

pub const EVENT_NOT_FOUND: &str = "Event not found.";

/// A request that operates on an existing event and is reserved to its
/// organizer.
struct Operation {
    path: &'static str,
    action: ActionRef,
    /// Request fields besides `session` and `event`.
    fields: &'static [&'static str],
    verb: &'static str,
    reply: Reply,
}

const MODIFY: Operation = Operation {
    path: "/Event/modifyEvent",
    action: Event::MODIFY_EVENT,
    fields: &["newName", "newDate", "newDuration", "newLocation", "newDescription"],
    verb: "modify",
    reply: Reply::Field("event"),
};

const CANCEL: Operation = Operation {
    path: "/Event/cancelEvent",
    action: Event::CANCEL_EVENT,
    fields: &[],
    verb: "cancel",
    reply: Reply::Success,
};

const UN_CANCEL: Operation = Operation {
    path: "/Event/unCancelEvent",
    action: Event::UN_CANCEL_EVENT,
    fields: &[],
    verb: "un-cancel",
    reply: Reply::Field("event"),
};

const DELETE: Operation = Operation {
    path: "/Event/deleteEvent",
    action: Event::DELETE_EVENT,
    fields: &[],
    verb: "delete",
    reply: Reply::Success,
};

const CREATE_PATH: &str = "/Event/createEvent";
const CREATE_FIELDS: &[&str] = &["name", "date", "duration", "location", "description"];

const BY_ID_PATH: &str = "/Event/_getEventById";
const BY_ORGANIZER_PATH: &str = "/Event/_getEventsByOrganizer";
const BY_STATUS_PATH: &str = "/Event/_getEventsByStatus";
const ALL_PATH: &str = "/Event/_getAllEvents";

/// Every event sync, cascades included.
#[must_use]
pub fn all() -> SyncSet {
    requests().with(cascade_to_interests()).with(cascade_to_reviews())
}

/// Request handling and derived completion, without the delete cascades.
#[must_use]
pub fn requests() -> SyncSet {
    let mut syncs = SyncSet::new();
    syncs.extend(create());
    for operation in [MODIFY, CANCEL, UN_CANCEL, DELETE] {
        syncs.extend(organizer_only(&operation));
    }
    syncs.extend(queries());
    syncs
}

fn create() -> [SyncRule; 4] {
    let title = title(Event::CREATE_EVENT.name);
    [
        SyncRule::new(format!("Request{title}"), |v| {
            let (request, session, user) = (v.var("request"), v.var("session"), v.var("user"));
            let fields = vars(v, CREATE_FIELDS);
            let input = fields
                .iter()
                .fold(template! { organizer: &user }, |template, (name, symbol)| template.field(*name, symbol));
            let (where_session, where_user) = (session.clone(), user);
            SyncSpec::when(Requesting::REQUEST, request_input(CREATE_PATH, &session, &fields), template! { request })
                .where_clause(move |registry, frames| {
                    let (session, user) = (where_session.clone(), where_user.clone());
                    async move { authenticated(&registry, frames, &session, &user).await }
                })
                .then(Event::CREATE_EVENT, input)
        }),
        session_guard(&format!("{title}GuardResponse"), CREATE_PATH, CREATE_FIELDS),
        success_response(
            &format!("{title}Response"),
            CREATE_PATH,
            Event::CREATE_EVENT,
            "event",
            Reply::Field("event"),
        ),
        error_response(&format!("{title}ErrorResponse"), CREATE_PATH, Event::CREATE_EVENT),
    ]
}

enum Access {
    Granted(Frame),
    Denied(String),
}

/// Checks that a request's session belongs to the organizer of the event it
/// names.
#[derive(Clone)]
struct OrganizerGuard {
    session: Symbol,
    event: Symbol,
    user: Symbol,
    doc: Symbol,
    denied: String,
}

impl OrganizerGuard {
    fn new(v: &mut Vars, verb: &str) -> Self {
        Self {
            session: v.var("session"),
            event: v.var("event"),
            user: v.var("user"),
            doc: v.var("eventDoc"),
            denied: format!("Only the event organizer can {verb} the event."),
        }
    }

    /// Input template of the guarded request.
    fn request(&self, v: &mut Vars, operation: &Operation) -> (Template, Vec<(&'static str, Symbol)>) {
        let fields = vars(v, operation.fields);
        let request_fields: Vec<_> = iter::once(("event", self.event.clone()))
            .chain(fields.iter().cloned())
            .collect();
        (request_input(operation.path, &self.session, &request_fields), fields)
    }

    async fn check(&self, registry: &ConceptRegistry, frame: Frame) -> Result<Access, EngineError> {
        let signed_in = authenticated(registry, Frames::single(frame), &self.session, &self.user).await?;
        let Some(frame) = signed_in.into_iter().next() else {
            return Ok(Access::Denied(INVALID_SESSION.to_string()));
        };

        let found = Frames::single(frame)
            .query(
                registry,
                Event::GET_EVENT_BY_ID,
                &template! { event: &self.event },
                &template! { event: &self.doc },
            )
            .await?;
        let Some(frame) = found.into_iter().next() else {
            return Ok(Access::Denied(EVENT_NOT_FOUND.to_string()));
        };

        let organizer = frame.get(&self.doc).and_then(|doc| doc.get("organizer"));
        if organizer.is_some() && organizer == frame.get(&self.user) {
            Ok(Access::Granted(frame))
        } else {
            Ok(Access::Denied(self.denied.clone()))
        }
    }

    /// Frames the organizer check lets through.
    async fn grant(&self, registry: &ConceptRegistry, frames: Frames) -> Result<Frames, EngineError> {
        let mut granted = Frames::new();
        for frame in frames {
            if let Access::Granted(frame) = self.check(registry, frame).await? {
                granted.push(frame);
            }
        }
        Ok(granted)
    }

    /// Frames the organizer check rejects, with the reason bound to `error`.
    async fn deny(&self, registry: &ConceptRegistry, frames: Frames, error: &Symbol) -> Result<Frames, EngineError> {
        let mut rejected = Frames::new();
        for frame in frames {
            if let Access::Denied(reason) = self.check(registry, frame.clone()).await? {
                rejected.push(frame.with(error, Value::from(reason))?);
            }
        }
        Ok(rejected)
    }
}

fn organizer_only(operation: &Operation) -> [SyncRule; 4] {
    let title = title(operation.action.name);
    [
        SyncRule::new(format!("Request{title}"), |v| {
            let request = v.var("request");
            let guard = OrganizerGuard::new(v, operation.verb);
            let (pattern, fields) = guard.request(v, operation);
            let input = fields.iter().fold(
                template! { organizer: &guard.user, event: &guard.event },
                |template, (name, symbol)| template.field(*name, symbol),
            );
            SyncSpec::when(Requesting::REQUEST, pattern, template! { request })
                .where_clause(move |registry, frames| {
                    let guard = guard.clone();
                    async move { guard.grant(&registry, frames).await }
                })
                .then(operation.action, input)
        }),
        SyncRule::new(format!("{title}GuardResponse"), |v| {
            let (request, error) = (v.var("request"), v.var("error"));
            let guard = OrganizerGuard::new(v, operation.verb);
            let (pattern, _) = guard.request(v, operation);
            let reason = error.clone();
            SyncSpec::when(Requesting::REQUEST, pattern, template! { request })
                .where_clause(move |registry, frames| {
                    let (guard, error) = (guard.clone(), reason.clone());
                    async move { guard.deny(&registry, frames, &error).await }
                })
                .then(Requesting::RESPOND, template! { request, error })
        }),
        success_response(
            &format!("{title}Response"),
            operation.path,
            operation.action,
            "event",
            operation.reply,
        ),
        error_response(&format!("{title}ErrorResponse"), operation.path, operation.action),
    ]
}

fn queries() -> Vec<SyncRule> {
    let mut syncs = vec![
        event_by_id(),
        session_guard("GetEventByIdGuardResponse", BY_ID_PATH, &["event"]),
        input_guard(
            "GetEventByIdInputGuardResponse",
            BY_ID_PATH,
            &["event"],
            Event::GET_EVENT_BY_ID,
            &[("event", "event")],
        ),
        query_response(
            "RequestGetEventsByOrganizer",
            BY_ORGANIZER_PATH,
            &["organizer"],
            Event::GET_EVENTS_BY_ORGANIZER,
            &[("organizer", "organizer")],
        ),
        session_guard("GetEventsByOrganizerGuardResponse", BY_ORGANIZER_PATH, &["organizer"]),
        input_guard(
            "GetEventsByOrganizerInputGuardResponse",
            BY_ORGANIZER_PATH,
            &["organizer"],
            Event::GET_EVENTS_BY_ORGANIZER,
            &[("organizer", "organizer")],
        ),
        query_response(
            "RequestGetEventsByStatus",
            BY_STATUS_PATH,
            &["status"],
            Event::GET_EVENTS_BY_STATUS,
            &[("status", "status")],
        ),
        session_guard("GetEventsByStatusGuardResponse", BY_STATUS_PATH, &["status"]),
        input_guard(
            "GetEventsByStatusInputGuardResponse",
            BY_STATUS_PATH,
            &["status"],
            Event::GET_EVENTS_BY_STATUS,
            &[("status", "status")],
        ),
        query_response("RequestGetAllEvents", ALL_PATH, &[], Event::GET_ALL_EVENTS, &[]),
        session_guard("GetAllEventsGuardResponse", ALL_PATH, &[]),
    ];
    syncs.extend([BY_ID_PATH, BY_ORGANIZER_PATH, BY_STATUS_PATH, ALL_PATH].map(complete_overdue));
    syncs
}

/// Answers with the single event, or `null` when there is no such event.
fn event_by_id() -> SyncRule {
    SyncRule::new("RequestGetEventById", |v| {
        let (request, session, user) = (v.var("request"), v.var("session"), v.var("user"));
        let (event, docs, result) = (v.var("event"), v.var("eventDocs"), v.var("result"));
        let pattern = request_input(BY_ID_PATH, &session, &[("event", event.clone())]);
        let symbols = (session, user, event, docs, result.clone());
        SyncSpec::when(Requesting::REQUEST, pattern, template! { request })
            .where_clause(move |registry, frames| {
                let (session, user, event, docs, result) = symbols.clone();
                async move {
                    authenticated(&registry, frames, &session, &user)
                        .await?
                        .query_all(&registry, Event::GET_EVENT_BY_ID, &template! { event: &event }, &docs)
                        .await?
                        .try_map(|frame| {
                            let found = frame
                                .get(&docs)
                                .and_then(Value::as_array)
                                .and_then(|rows| rows.first())
                                .and_then(|row| row.get("event"))
                                .cloned()
                                .unwrap_or(Value::Null);
                            frame.with(&result, found)
                        })
                }
            })
            .then(Requesting::RESPOND, template! { request, event: &result })
    })
}

/// Records completion of overdue events whenever an authenticated caller
/// lists events through `path`.
fn complete_overdue(path: &'static str) -> SyncRule {
    let name = format!("CompleteOverdueEventsOn{}", title(path.trim_start_matches("/Event/_")));
    SyncRule::new(name, |v| {
        let (session, user, event) = (v.var("session"), v.var("user"), v.var("event"));
        let symbols = (session.clone(), user, event.clone());
        SyncSpec::when(Requesting::REQUEST, template! { path: path, session }, Template::new())
            .where_clause(move |registry, frames| {
                let (session, user, event) = symbols.clone();
                async move {
                    authenticated(&registry, frames, &session, &user)
                        .await?
                        .query(&registry, Event::GET_OVERDUE_EVENTS, &Template::new(), &template! { event: &event })
                        .await
                }
            })
            .then(Event::COMPLETE_EVENT, template! { event })
    })
}

/// Drops every interest in a deleted event.
#[must_use]
pub fn cascade_to_interests() -> SyncRule {
    SyncRule::new("CascadeEventDeletionToUserInterest", |v| {
        let (event, user) = (v.var("event"), v.var("user"));
        let symbols = (event.clone(), user.clone());
        SyncSpec::when(Event::DELETE_EVENT, Template::new(), template! { event })
            .where_clause(move |registry, frames| {
                let (event, user) = symbols.clone();
                async move {
                    frames
                        .query(
                            &registry,
                            UserInterest::GET_USERS_INTERESTED_IN_ITEMS,
                            &template! { item: &event },
                            &template! { user: &user },
                        )
                        .await
                }
            })
            .then(UserInterest::REMOVE_ITEM_INTEREST, template! { user, item: &event })
    })
}

/// Drops every review of a deleted event.
#[must_use]
pub fn cascade_to_reviews() -> SyncRule {
    SyncRule::new("CascadeEventDeletionToReviews", |v| {
        let (event, review, reviewer) = (v.var("event"), v.var("review"), v.var("reviewer"));
        let symbols = (event.clone(), review, reviewer.clone());
        SyncSpec::when(Event::DELETE_EVENT, Template::new(), template! { event })
            .where_clause(move |registry, frames| {
                let (event, review, reviewer) = symbols.clone();
                async move {
                    let author = |frame: &Frame| frame.get(&review).and_then(|doc| doc.get("reviewer")).cloned();
                    frames
                        .query(
                            &registry,
                            Reviewing::GET_REVIEWS_BY_ITEM,
                            &template! { item: &event },
                            &template! { review: &review },
                        )
                        .await?
                        .filter(|frame| author(frame).is_some())
                        .try_map(|frame| {
                            let author = author(&frame).unwrap_or(Value::Null);
                            frame.with(&reviewer, author)
                        })
                }
            })
            .then(Reviewing::REMOVE_REVIEW, template! { user: &reviewer, item: &event })
    })
}
