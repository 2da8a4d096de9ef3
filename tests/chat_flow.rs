//! End-to-end chat scenarios through the HTTP layer.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use tower::ServiceExt;

use campus_carpool::chat::ChatService;
use campus_carpool::dialogue::DialogueEngine;
use campus_carpool::dialogue::time::FormatTimeParser;
use campus_carpool::directions::NoDirections;
use campus_carpool::http::routes;
use campus_carpool::matching::MatchingWorkflow;
use campus_carpool::notify::NotificationDeriver;
use campus_carpool::session::SessionStore;
use campus_carpool::store::{MemoryRepository, Repository};

fn app() -> (Router, Arc<MemoryRepository>) {
    let repo = Arc::new(MemoryRepository::new());
    let shared: Arc<dyn Repository> = repo.clone();
    let sessions = Arc::new(SessionStore::new());
    let engine = DialogueEngine::new(shared.clone(), Arc::new(FormatTimeParser::new()));
    let matching = MatchingWorkflow::new(shared.clone(), Arc::new(NoDirections));
    let notifier = NotificationDeriver::new(shared.clone());
    let chat = Arc::new(ChatService::new(sessions, engine, matching, notifier));
    (routes(chat), repo)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn welcome(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(Request::get("/welcome").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    json["token"].as_str().unwrap().to_string()
}

/// Send one chat turn; returns (status, reply message).
async fn say(app: &Router, token: &str, message: &str) -> (StatusCode, String) {
    let request = Request::post("/chat")
        .header(header::AUTHORIZATION, token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({ "message": message }).to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let json = body_json(response).await;
    (status, json["message"].as_str().unwrap_or_default().to_string())
}

/// Run a user through login and the whole create flow.
async fn create_offer(app: &Router, guc_id: &str, name: &str, seats: &str) -> String {
    let token = welcome(app).await;
    let (status, _) = say(app, &token, &format!("{guc_id}:{name}")).await;
    assert_eq!(status, StatusCode::OK);
    for message in [
        "I'd like to offer a ride",
        "I'm leaving campus",
        "latitude 29.98 and longitude 31.44",
        "Jan 2, 2033 at 3:04pm",
    ] {
        let (status, _) = say(app, &token, message).await;
        assert_eq!(status, StatusCode::OK, "step '{message}' failed");
    }
    let (status, reply) = say(app, &token, seats).await;
    assert_eq!(status, StatusCode::OK);
    assert!(reply.contains("Your offer is complete!"));
    token
}

#[tokio::test]
async fn rejects_missing_or_stale_token() {
    let (app, _) = app();

    let request = Request::post("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"message": "hi"}"#))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (status, reply) = say(&app, "stale-token", "hi").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(reply.contains("session has expired"));
}

#[tokio::test]
async fn greeting_then_identity_then_offer() {
    let (app, repo) = app();
    let token = welcome(&app).await;

    // Anything but an identity pair is rejected until we know the user.
    let (status, _) = say(&app, &token, "create").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, reply) = say(&app, &token, "34-1111:Amer").await;
    assert_eq!(status, StatusCode::OK);
    assert!(reply.contains("Hello Amer!"));

    let (_, reply) = say(&app, &token, "I'd like to offer a ride").await;
    assert!(reply.contains("create a carpool"));
    for message in [
        "leaving",
        "latitude 29.98 and longitude 31.44",
        "Jan 2, 2033 at 3:04pm",
    ] {
        let (status, _) = say(&app, &token, message).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (_, reply) = say(&app, &token, "2 please").await;
    assert!(reply.contains("Your offer is complete!"));

    let offers = repo.list_offers().await.unwrap();
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].guc_id, "34-1111");
    assert_eq!(offers[0].seats_remaining, 2);
}

#[tokio::test]
async fn accept_then_reject_scenario() {
    let (app, repo) = app();
    let owner = create_offer(&app, "34-1111", "Amer", "2 seats").await;

    // User B requests a ride and picks the offer.
    let rider = welcome(&app).await;
    say(&app, &rider, "55-2222:Sara").await;
    let (status, reply) = say(&app, &rider, "choose 1").await;
    assert_eq!(status, StatusCode::OK, "{reply}");

    // Owner sees the candidate and accepts.
    let (_, digest) = say(&app, &owner, "updates").await;
    assert!(digest.contains("Sara (55-2222) is awaiting your decision"));
    let (status, _) = say(&app, &owner, "accept 55-2222").await;
    assert_eq!(status, StatusCode::OK);

    let offer = repo.get_offer(1).await.unwrap().unwrap();
    assert_eq!(offer.current_passengers, vec!["55-2222".to_string()]);
    assert_eq!(offer.seats_remaining, 1);

    // Then changes their mind.
    let (status, _) = say(&app, &owner, "reject 55-2222").await;
    assert_eq!(status, StatusCode::OK);
    let offer = repo.get_offer(1).await.unwrap().unwrap();
    assert!(offer.current_passengers.is_empty());
    assert_eq!(offer.seats_remaining, 2);

    // B hears about it exactly once.
    let (_, digest) = say(&app, &rider, "updates").await;
    assert_eq!(digest.matches("declined").count(), 1);
    let (_, digest) = say(&app, &rider, "updates").await;
    assert!(!digest.contains("declined"));
}

#[tokio::test]
async fn choosing_own_offer_conflicts() {
    let (app, repo) = app();
    let owner = create_offer(&app, "34-1111", "Amer", "3").await;

    let (status, reply) = say(&app, &owner, "choose 1").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(reply.contains("your own carpool"));
    assert!(repo.requests_by_identity("34-1111").await.unwrap().is_empty());
}

#[tokio::test]
async fn request_flow_lists_matches() {
    let (app, _) = app();
    create_offer(&app, "34-1111", "Amer", "2").await;

    let rider = welcome(&app).await;
    say(&app, &rider, "55-2222:Sara").await;
    for message in [
        "find me a ride",
        "I'm leaving campus too",
        "my latitude is 29.97 and my longitude is 31.43",
    ] {
        let (status, _) = say(&app, &rider, message).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (_, reply) = say(&app, &rider, "Jan 2, 2033 at 9:00pm").await;
    assert!(reply.contains("Your request is complete!"));

    // A plain message after completion browses matching offers.
    let (_, listing) = say(&app, &rider, "so what now?").await;
    assert!(listing.contains("Offer #1"));
    assert!(listing.contains("choose <id>"));
}

#[tokio::test]
async fn relogin_migrates_the_session() {
    let (app, _) = app();
    let token = welcome(&app).await;
    say(&app, &token, "34-1111:Amer").await;
    say(&app, &token, "create").await;
    say(&app, &token, "leaving").await;

    // Same identity, fresh token: the flow continues mid-question.
    let second = welcome(&app).await;
    let (_, reply) = say(&app, &second, "34-1111:Amer").await;
    assert!(reply.contains("Welcome back"));
    let (status, reply) = say(&app, &second, "latitude 29.98 and longitude 31.44").await;
    assert_eq!(status, StatusCode::OK, "{reply}");

    // The old token is dead.
    let (status, _) = say(&app, &token, "hello?").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn edit_keeps_the_same_offer_id() {
    let (app, repo) = app();
    let owner = create_offer(&app, "34-1111", "Amer", "2").await;

    let (_, reply) = say(&app, &owner, "edit").await;
    assert!(reply.contains("update your carpool"));
    for message in [
        "going to guc this time",
        "latitude 30.01 and longitude 31.50",
        "Jan 3, 2033 at 8:00am",
    ] {
        let (status, reply) = say(&app, &owner, message).await;
        assert_eq!(status, StatusCode::OK, "{reply}");
    }
    let (_, reply) = say(&app, &owner, "3").await;
    assert!(reply.contains("Your offer is updated!"));

    let offers = repo.list_offers().await.unwrap();
    assert_eq!(offers.len(), 1, "edit must not create a second offer");
    assert_eq!(offers[0].id, 1);
    assert!(!offers[0].from_campus);
    assert_eq!(offers[0].seats_total, 3);
}
