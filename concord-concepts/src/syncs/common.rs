//! Building blocks shared by the sync sets.

use concord_core::{
    action::{ActionRef, QueryRef},
    concept::ConceptRegistry,
    engine::EngineError,
    frame::Frames,
    pattern::Template,
    symbol::{Symbol, Vars},
    sync::{SyncRule, SyncSpec},
    template,
};
use serde_json::Value;

use crate::{requesting::Requesting, session::Session};

pub const INVALID_SESSION: &str = "Invalid session. Please sign in.";

/// Input template of a `Requesting.request` for `path` with a session and
/// the named fields.
pub(crate) fn request_input(path: &'static str, session: &Symbol, fields: &[(&'static str, Symbol)]) -> Template {
    fields.iter().fold(
        template! { path: path, session: session },
        |template, (name, symbol)| template.field(*name, symbol),
    )
}

/// Keep the frames whose session resolves to a user, binding it to `user`.
pub(crate) async fn authenticated(
    registry: &ConceptRegistry,
    frames: Frames,
    session: &Symbol,
    user: &Symbol,
) -> Result<Frames, EngineError> {
    frames
        .query(registry, Session::GET_USER, &template! { session: session }, &template! { user: user })
        .await
}

/// Frames whose session does not resolve, with `error` bound to the
/// invalid-session message. Authenticated frames drop out.
pub(crate) async fn unauthenticated(
    registry: &ConceptRegistry,
    frames: Frames,
    session: &Symbol,
    user: &Symbol,
    error: &Symbol,
) -> Result<Frames, EngineError> {
    let mut rejected = Frames::new();
    for frame in frames {
        let signed_in = authenticated(registry, Frames::single(frame.clone()), session, user).await?;
        if signed_in.is_empty() {
            rejected.push(frame.with(error, Value::from(INVALID_SESSION))?);
        }
    }
    Ok(rejected)
}

/// Answers a request whose session is invalid.
pub(crate) fn session_guard(name: &str, path: &'static str, fields: &[&'static str]) -> SyncRule {
    SyncRule::new(name, |v| {
        let (request, session, user, error) = (v.var("request"), v.var("session"), v.var("user"), v.var("error"));
        let fields = vars(v, fields);
        let (guard_session, guard_user, guard_error) = (session.clone(), user, error.clone());
        SyncSpec::when(Requesting::REQUEST, request_input(path, &session, &fields), template! { request })
            .where_clause(move |registry, frames| {
                let (session, user, error) = (guard_session.clone(), guard_user.clone(), guard_error.clone());
                async move { unauthenticated(&registry, frames, &session, &user, &error).await }
            })
            .then(Requesting::RESPOND, template! { request, error })
    })
}

/// How a request is answered once its action succeeded.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Reply {
    /// Echo this output field of the action.
    Field(&'static str),
    /// Reply `{ success: true }`.
    Success,
}

/// Answers a request once `action` completed without error.
///
/// The action must produce `output` on success; the reply is chosen by
/// `reply`.
pub(crate) fn success_response(
    name: &str,
    path: &'static str,
    action: ActionRef,
    output: &'static str,
    reply: Reply,
) -> SyncRule {
    SyncRule::new(name, |v| {
        let (request, value) = (v.var("request"), v.var(output));
        let answer = match reply {
            Reply::Field(field) => Template::new().field("request", &request).field(field, &value),
            Reply::Success => template! { request, success: true },
        };
        SyncSpec::when(Requesting::REQUEST, template! { path: path }, template! { request })
            .and_when(action, Template::new(), Template::new().field(output, &value))
            .then(Requesting::RESPOND, answer)
    })
}

/// Relays the error of a failed `action` to the request.
pub(crate) fn error_response(name: &str, path: &'static str, action: ActionRef) -> SyncRule {
    SyncRule::new(name, |v| {
        let (request, error) = (v.var("request"), v.var("error"));
        SyncSpec::when(Requesting::REQUEST, template! { path: path }, template! { request })
            .and_when(action, Template::new(), template! { error })
            .then(Requesting::RESPOND, template! { request, error })
    })
}

/// Answers an authenticated request with every row of `query`.
///
/// `input` maps query input fields to request fields; the pseudo-field
/// `user` refers to the signed-in user. Rows are returned under `results`.
pub(crate) fn query_response(
    name: &str,
    path: &'static str,
    fields: &[&'static str],
    query: QueryRef,
    input: &[(&'static str, &'static str)],
) -> SyncRule {
    SyncRule::new(name, |v| {
        let (request, session, user, results) = (v.var("request"), v.var("session"), v.var("user"), v.var("results"));
        let fields = vars(v, fields);
        let query_input = query_input(v, input);
        let (where_session, where_user, where_results) = (session.clone(), user, results.clone());
        SyncSpec::when(Requesting::REQUEST, request_input(path, &session, &fields), template! { request })
            .where_clause(move |registry, frames| {
                let (session, user, results) = (where_session.clone(), where_user.clone(), where_results.clone());
                let query_input = query_input.clone();
                async move {
                    authenticated(&registry, frames, &session, &user)
                        .await?
                        .query_all(&registry, query, &query_input, &results)
                        .await
                }
            })
            .then(Requesting::RESPOND, template! { request, results })
    })
}

/// Answers an authenticated request whose fields `query` cannot accept,
/// such as an unknown status or a number where text is expected.
///
/// Takes the same arguments as [`query_response`]; exactly one of the two
/// answers a signed-in request.
pub(crate) fn input_guard(
    name: &str,
    path: &'static str,
    fields: &[&'static str],
    query: QueryRef,
    input: &[(&'static str, &'static str)],
) -> SyncRule {
    SyncRule::new(name, |v| {
        let (request, session, user, error) = (v.var("request"), v.var("session"), v.var("user"), v.var("error"));
        let fields = vars(v, fields);
        let query_input = query_input(v, input);
        let (where_session, where_user, where_error) = (session.clone(), user, error.clone());
        SyncSpec::when(Requesting::REQUEST, request_input(path, &session, &fields), template! { request })
            .where_clause(move |registry, frames| {
                let (session, user, error) = (where_session.clone(), where_user.clone(), where_error.clone());
                let query_input = query_input.clone();
                async move {
                    authenticated(&registry, frames, &session, &user)
                        .await?
                        .rejected(&registry, query, &query_input, &error)
                        .await
                }
            })
            .then(Requesting::RESPOND, template! { request, error })
    })
}

fn query_input(v: &mut Vars, input: &[(&'static str, &'static str)]) -> Template {
    input
        .iter()
        .fold(Template::new(), |template, (name, source)| template.field(*name, v.var(source)))
}

/// One symbol per field name.
pub(crate) fn vars(v: &mut Vars, fields: &[&'static str]) -> Vec<(&'static str, Symbol)> {
    fields.iter().map(|name| (*name, v.var(name))).collect()
}

/// `createEvent` -> `CreateEvent`.
pub(crate) fn title(name: &str) -> String {
    let mut chars = name.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
        .unwrap_or_default()
}
