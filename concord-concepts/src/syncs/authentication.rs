//! Syncs for signing up and signing in.
//!
//! Neither route needs a session. Signing in opens one: a successful
//! `authenticate` creates a session for the user, and the request is answered
//! with its token.

use concord_core::{
    action::ActionRef,
    pattern::Template,
    sync::{SyncRule, SyncSet, SyncSpec},
    template,
};

use super::common::{Reply, error_response, success_response};
use crate::{authentication::UserAuthentication, requesting::Requesting, session::Session};

const REGISTER_PATH: &str = "/UserAuthentication/register";
const AUTHENTICATE_PATH: &str = "/UserAuthentication/authenticate";

/// Every authentication sync.
#[must_use]
pub fn all() -> SyncSet {
    let mut syncs = SyncSet::new();
    syncs.extend([
        forward("RequestRegister", REGISTER_PATH, UserAuthentication::REGISTER),
        success_response(
            "RegisterResponse",
            REGISTER_PATH,
            UserAuthentication::REGISTER,
            "user",
            Reply::Field("user"),
        ),
        error_response("RegisterErrorResponse", REGISTER_PATH, UserAuthentication::REGISTER),
        forward("RequestAuthenticate", AUTHENTICATE_PATH, UserAuthentication::AUTHENTICATE),
        open_session(),
        success_response(
            "AuthenticateResponse",
            AUTHENTICATE_PATH,
            Session::CREATE,
            "session",
            Reply::Field("session"),
        ),
        error_response("AuthenticateErrorResponse", AUTHENTICATE_PATH, UserAuthentication::AUTHENTICATE),
    ]);
    syncs
}

/// Passes the credentials of a request straight to `action`.
fn forward(name: &str, path: &'static str, action: ActionRef) -> SyncRule {
    SyncRule::new(name, |v| {
        let (username, password) = (v.var("username"), v.var("password"));
        SyncSpec::when(Requesting::REQUEST, template! { path: path, username, password }, Template::new())
            .then(action, template! { username, password })
    })
}

fn open_session() -> SyncRule {
    SyncRule::new("AuthenticateOpensSession", |v| {
        let user = v.var("user");
        SyncSpec::when(Requesting::REQUEST, template! { path: AUTHENTICATE_PATH }, Template::new())
            .and_when(UserAuthentication::AUTHENTICATE, Template::new(), template! { user })
            .then(Session::CREATE, template! { user })
    })
}
