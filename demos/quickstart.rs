//! Quickstart: event scheduling driven entirely by syncs.
//!
//! Run with `cargo run --example quickstart [config.toml]`. Set `RUST_LOG=debug`
//! to watch the engine evaluate each generation.

use concord::{EngineConfig, Record};
use concord_concepts::App;
use serde_json::{Value, json};

fn fields(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

async fn show(app: &App, path: &str, body: Value) -> Result<Record, Box<dyn std::error::Error>> {
    let response = app.request(path, fields(body)).await?;
    println!("{path}\n  -> {}", Value::Object(response.clone()));
    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };
    let app = App::new(config)?;

    let credentials = json!({ "username": "alice", "password": "correct horse" });
    show(&app, "/UserAuthentication/register", credentials.clone()).await?;
    let signed_in = show(&app, "/UserAuthentication/authenticate", credentials).await?;
    let alice = signed_in.get("session").and_then(Value::as_str).unwrap_or_default().to_string();
    let bob = app.session().create("bob").await;

    let created = show(
        &app,
        "/Event/createEvent",
        json!({
            "session": alice,
            "name": "Rust meetup",
            "date": "2099-06-01T18:00:00Z",
            "duration": 120,
            "location": "Community hall",
            "description": "Talks and pizza",
        }),
    )
    .await?;
    let event = created.get("event").cloned().unwrap_or(Value::Null);

    show(&app, "/UserInterest/addItemInterest", json!({ "session": bob, "item": event })).await?;
    show(&app, "/Event/_getAllEvents", json!({ "session": bob })).await?;

    // Only the organizer may cancel; bob is turned away.
    show(&app, "/Event/cancelEvent", json!({ "session": bob, "event": event })).await?;
    show(&app, "/Event/cancelEvent", json!({ "session": "forged", "event": event })).await?;

    // Deleting cascades to everyone's interests.
    show(&app, "/Event/deleteEvent", json!({ "session": alice, "event": event })).await?;
    show(
        &app,
        "/UserInterest/_getUsersInterestedInItems",
        json!({ "session": bob, "item": event }),
    )
    .await?;

    tracing::info!(entries = app.engine().log().len(), "done");
    Ok(())
}
