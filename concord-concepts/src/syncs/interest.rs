//! Syncs exposing the UserInterest concept through requests.

use concord_core::{
    action::ActionRef,
    sync::{SyncRule, SyncSet, SyncSpec},
    template,
};

use super::common::{
    Reply, authenticated, error_response, input_guard, query_response, request_input, session_guard,
    success_response, title, vars,
};
use crate::{interest::UserInterest, requesting::Requesting};

struct Operation {
    path: &'static str,
    action: ActionRef,
    /// The request field passed on to the action with the signed-in user.
    field: &'static str,
    output: &'static str,
    reply: Reply,
}

const OPERATIONS: [Operation; 4] = [
    Operation {
        path: "/UserInterest/addPersonalInterest",
        action: UserInterest::ADD_PERSONAL_INTEREST,
        field: "tag",
        output: "personalInterest",
        reply: Reply::Field("personalInterest"),
    },
    Operation {
        path: "/UserInterest/removePersonalInterest",
        action: UserInterest::REMOVE_PERSONAL_INTEREST,
        field: "tag",
        output: "personalInterest",
        reply: Reply::Success,
    },
    Operation {
        path: "/UserInterest/addItemInterest",
        action: UserInterest::ADD_ITEM_INTEREST,
        field: "item",
        output: "itemInterest",
        reply: Reply::Field("itemInterest"),
    },
    Operation {
        path: "/UserInterest/removeItemInterest",
        action: UserInterest::REMOVE_ITEM_INTEREST,
        field: "item",
        output: "itemInterest",
        reply: Reply::Success,
    },
];

const PERSONAL_PATH: &str = "/UserInterest/_getPersonalInterests";
const ITEMS_PATH: &str = "/UserInterest/_getItemInterests";
const INTERESTED_PATH: &str = "/UserInterest/_getUsersInterestedInItems";

/// Every interest sync.
#[must_use]
pub fn all() -> SyncSet {
    let mut syncs = SyncSet::new();
    for operation in &OPERATIONS {
        syncs.extend(signed_in(operation));
    }
    syncs.extend([
        query_response(
            "RequestGetPersonalInterests",
            PERSONAL_PATH,
            &[],
            UserInterest::GET_PERSONAL_INTERESTS,
            &[("user", "user")],
        ),
        session_guard("GetPersonalInterestsGuardResponse", PERSONAL_PATH, &[]),
        query_response(
            "RequestGetItemInterests",
            ITEMS_PATH,
            &[],
            UserInterest::GET_ITEM_INTERESTS,
            &[("user", "user")],
        ),
        session_guard("GetItemInterestsGuardResponse", ITEMS_PATH, &[]),
        query_response(
            "RequestGetUsersInterestedInItems",
            INTERESTED_PATH,
            &["item"],
            UserInterest::GET_USERS_INTERESTED_IN_ITEMS,
            &[("item", "item")],
        ),
        session_guard("GetUsersInterestedInItemsGuardResponse", INTERESTED_PATH, &["item"]),
        input_guard(
            "GetUsersInterestedInItemsInputGuardResponse",
            INTERESTED_PATH,
            &["item"],
            UserInterest::GET_USERS_INTERESTED_IN_ITEMS,
            &[("item", "item")],
        ),
    ]);
    syncs
}

/// Request, guard and response syncs of an action performed on behalf of
/// the signed-in user.
fn signed_in(operation: &Operation) -> [SyncRule; 4] {
    let title = title(operation.action.name);
    [
        SyncRule::new(format!("Request{title}"), |v| {
            let (request, session, user) = (v.var("request"), v.var("session"), v.var("user"));
            let fields = vars(v, &[operation.field]);
            let input = fields
                .iter()
                .fold(template! { user: &user }, |template, (name, symbol)| template.field(*name, symbol));
            let (where_session, where_user) = (session.clone(), user);
            SyncSpec::when(
                Requesting::REQUEST,
                request_input(operation.path, &session, &fields),
                template! { request },
            )
            .where_clause(move |registry, frames| {
                let (session, user) = (where_session.clone(), where_user.clone());
                async move { authenticated(&registry, frames, &session, &user).await }
            })
            .then(operation.action, input)
        }),
        session_guard(&format!("{title}GuardResponse"), operation.path, &[operation.field]),
        success_response(
            &format!("{title}Response"),
            operation.path,
            operation.action,
            operation.output,
            operation.reply,
        ),
        error_response(&format!("{title}ErrorResponse"), operation.path, operation.action),
    ]
}
