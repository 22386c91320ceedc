#[cfg(test)]
mod tests {
    use super::super::{
        core::{AppConfig, AppState},
        router::router_with_state,
    };
    use axum::{body::Body, http::Request, http::StatusCode};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_app() -> (axum::Router, AppState) {
        let config = AppConfig::default();
        let state = AppState::new(&config).unwrap();
        (router_with_state(state.clone(), &config), state)
    }

    fn user(id: i64) -> Value {
        json!({
            "id": id,
            "userName": format!("user_{id}"),
            "firstName": "Test",
            "lastName": "User",
            "photoURL": "",
        })
    }

    async fn send(
        app: &axum::Router,
        method: &str,
        uri: &str,
        caller: Option<&Value>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(caller) = caller {
            builder = builder.header("x-user", caller.to_string());
        }
        let request = builder
            .body(Body::from(
                body.map(|value| value.to_string()).unwrap_or_default(),
            ))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create_channel(app: &axum::Router, caller: &Value, body: Value) -> Value {
        let (status, channel) = send(app, "POST", "/v1/channels", Some(caller), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        channel
    }

    async fn post_message(app: &axum::Router, caller: &Value, channel_id: &str, body: &str) -> Value {
        let (status, message) = send(
            app,
            "POST",
            &format!("/v1/channels/{channel_id}"),
            Some(caller),
            Some(json!({"body": body})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        message
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (app, _) = test_app();
        let (status, body) = send(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn requests_without_identity_are_rejected() {
        let (app, state) = test_app();

        let (status, body) = send(&app, "GET", "/v1/channels", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthenticated");

        let request = Request::builder()
            .method("GET")
            .uri("/v1/channels")
            .header("x-user", "not json")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // The identity check wins over body parsing: no header plus a
        // malformed body is still 401, not 400.
        let request = Request::builder()
            .method("POST")
            .uri("/v1/channels")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        assert!(state.publisher.recorded().await.is_empty());
    }

    #[tokio::test]
    async fn created_channels_default_to_public_and_empty() {
        let (app, state) = test_app();
        let alice = user(1);

        let channel = create_channel(&app, &alice, json!({"name":"general","description":null})).await;
        assert_eq!(channel["name"], "general");
        assert_eq!(channel["private"], false);
        assert_eq!(channel["members"], json!([]));
        assert_eq!(channel["creator"]["id"], 1);
        assert_eq!(channel["editedAt"], Value::Null);
        assert!(channel["channelID"].as_str().is_some());
        assert!(channel["createdAt"].as_i64().is_some());

        let recorded = state.publisher.recorded().await;
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0]["type"], "channel-new");
        assert_eq!(recorded[0]["userIDs"], json!([]));
        assert_eq!(recorded[0]["payload"]["channelID"], channel["channelID"]);
    }

    #[tokio::test]
    async fn blank_channel_names_are_rejected_without_side_effects() {
        let (app, state) = test_app();
        let alice = user(1);

        let (status, body) = send(
            &app,
            "POST",
            "/v1/channels",
            Some(&alice),
            Some(json!({"name":"   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");

        let (status, listed) = send(&app, "GET", "/v1/channels", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed, json!([]));
        assert!(state.publisher.recorded().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_channels_return_not_found() {
        let (app, _) = test_app();
        let alice = user(1);
        let missing = ulid::Ulid::new().to_string();

        let (status, body) = send(
            &app,
            "GET",
            &format!("/v1/channels/{missing}"),
            Some(&alice),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn private_channels_are_hidden_from_non_members() {
        let (app, _) = test_app();
        let alice = user(1);
        let bob = user(2);
        let carol = user(3);

        let channel = create_channel(
            &app,
            &alice,
            json!({"name":"ops","description":"on call","private":true,"members":[user(2)]}),
        )
        .await;
        let channel_id = channel["channelID"].as_str().unwrap();

        let (status, listed) = send(&app, "GET", "/v1/channels", Some(&bob), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let (status, listed) = send(&app, "GET", "/v1/channels", Some(&carol), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed, json!([]));

        let (status, body) = send(
            &app,
            "GET",
            &format!("/v1/channels/{channel_id}"),
            Some(&carol),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");

        let (status, _) = send(
            &app,
            "POST",
            &format!("/v1/channels/{channel_id}"),
            Some(&carol),
            Some(json!({"body":"let me in"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, page) = send(
            &app,
            "GET",
            &format!("/v1/channels/{channel_id}"),
            Some(&bob),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page, json!([]));
    }

    #[tokio::test]
    async fn message_lifecycle_enforces_ownership() {
        let (app, state) = test_app();
        let alice = user(1);
        let bob = user(2);
        let carol = user(3);

        let channel = create_channel(&app, &alice, json!({"name":"general"})).await;
        let channel_id = channel["channelID"].as_str().unwrap().to_owned();

        let message = post_message(&app, &bob, &channel_id, "hello").await;
        let message_id = message["messageID"].as_str().unwrap().to_owned();
        assert_eq!(message["channelID"], channel["channelID"]);
        assert_eq!(message["creator"]["id"], 2);
        assert_eq!(message["editedAt"], Value::Null);

        let (status, body) = send(
            &app,
            "PATCH",
            &format!("/v1/messages/{message_id}"),
            Some(&carol),
            Some(json!({"body":"hijacked"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");

        let (status, edited) = send(
            &app,
            "PATCH",
            &format!("/v1/messages/{message_id}"),
            Some(&bob),
            Some(json!({"body":"hello again"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(edited["body"], "hello again");
        assert!(edited["editedAt"].as_i64().is_some());

        let (status, _) = send(
            &app,
            "DELETE",
            &format!("/v1/messages/{message_id}"),
            Some(&carol),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, deleted) = send(
            &app,
            "DELETE",
            &format!("/v1/messages/{message_id}"),
            Some(&bob),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["status"], "deleted message");

        let kinds: Vec<String> = state
            .publisher
            .recorded()
            .await
            .iter()
            .map(|envelope| envelope["type"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(
            kinds,
            vec!["channel-new", "message-new", "message-update", "message-delete"]
        );
    }

    #[tokio::test]
    async fn deleting_a_channel_cascades_to_its_messages() {
        let (app, state) = test_app();
        let alice = user(1);
        let bob = user(2);

        let channel = create_channel(&app, &alice, json!({"name":"general"})).await;
        let channel_id = channel["channelID"].as_str().unwrap().to_owned();
        post_message(&app, &bob, &channel_id, "one").await;
        post_message(&app, &bob, &channel_id, "two").await;

        let (status, _) = send(
            &app,
            "DELETE",
            &format!("/v1/channels/{channel_id}"),
            Some(&bob),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            "DELETE",
            &format!("/v1/channels/{channel_id}"),
            Some(&alice),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "deleted channel and associated messages");

        let (status, _) = send(
            &app,
            "GET",
            &format!("/v1/channels/{channel_id}"),
            Some(&alice),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(state.messages.read().await.is_empty());

        let last = state.publisher.recorded().await.pop().unwrap();
        assert_eq!(last["type"], "channel-delete");
        assert_eq!(last["payload"], channel["channelID"]);
    }

    #[tokio::test]
    async fn membership_changes_are_creator_only_and_append() {
        let (app, state) = test_app();
        let alice = user(1);
        let bob = user(2);

        let channel = create_channel(&app, &alice, json!({"name":"ops","private":true})).await;
        let channel_id = channel["channelID"].as_str().unwrap().to_owned();

        let (status, _) = send(
            &app,
            "POST",
            &format!("/v1/channels/{channel_id}/members"),
            Some(&bob),
            Some(user(2)),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            "POST",
            &format!("/v1/channels/{channel_id}/members"),
            Some(&alice),
            Some(user(2)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "user 2 added to members");

        // Adding the same user twice appends a second entry.
        let (status, _) = send(
            &app,
            "POST",
            &format!("/v1/channels/{channel_id}/members"),
            Some(&alice),
            Some(user(2)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let last = state.publisher.recorded().await.pop().unwrap();
        assert_eq!(last["type"], "channel-update");
        assert_eq!(last["userIDs"], json!(["2", "2"]));

        let (status, body) = send(
            &app,
            "DELETE",
            &format!("/v1/channels/{channel_id}/members"),
            Some(&alice),
            Some(json!({"id": 2})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "user 2 removed from members");
        let last = state.publisher.recorded().await.pop().unwrap();
        assert_eq!(last["userIDs"], json!(["2"]));

        // Removing an absent member succeeds but is a no-op: nothing
        // is persisted and no event goes out.
        let before = state.publisher.recorded().await.len();
        let (status, _) = send(
            &app,
            "DELETE",
            &format!("/v1/channels/{channel_id}/members"),
            Some(&alice),
            Some(json!({"id": 99})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(state.publisher.recorded().await.len(), before);
    }

    #[tokio::test]
    async fn channel_updates_require_the_creator() {
        let (app, _) = test_app();
        let alice = user(1);
        let bob = user(2);

        let channel = create_channel(&app, &alice, json!({"name":"general"})).await;
        let channel_id = channel["channelID"].as_str().unwrap().to_owned();

        let (status, _) = send(
            &app,
            "PATCH",
            &format!("/v1/channels/{channel_id}"),
            Some(&bob),
            Some(json!({"name":"mine now"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            "PATCH",
            &format!("/v1/channels/{channel_id}"),
            Some(&alice),
            Some(json!({"name":"  "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, updated) = send(
            &app,
            "PATCH",
            &format!("/v1/channels/{channel_id}"),
            Some(&alice),
            Some(json!({"name":"announcements","description":"read only"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], "announcements");
        assert_eq!(updated["description"], "read only");
        assert!(updated["editedAt"].as_i64().is_some());
    }

    #[tokio::test]
    async fn history_is_newest_first_with_a_cursor() {
        let (app, _) = test_app();
        let alice = user(1);

        let channel = create_channel(&app, &alice, json!({"name":"general"})).await;
        let channel_id = channel["channelID"].as_str().unwrap().to_owned();

        let mut ids = Vec::new();
        for n in 0..3 {
            ids.push(
                post_message(&app, &alice, &channel_id, &format!("m{n}")).await["messageID"]
                    .as_str()
                    .unwrap()
                    .to_owned(),
            );
            // Message ids order within a second; keep them in distinct
            // milliseconds.
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let (status, page) = send(
            &app,
            "GET",
            &format!("/v1/channels/{channel_id}"),
            Some(&alice),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let bodies: Vec<&str> = page
            .as_array()
            .unwrap()
            .iter()
            .map(|message| message["body"].as_str().unwrap())
            .collect();
        assert_eq!(bodies, vec!["m2", "m1", "m0"]);

        let (status, page) = send(
            &app,
            "GET",
            &format!("/v1/channels/{channel_id}?before={}", ids[1]),
            Some(&alice),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let bodies: Vec<&str> = page
            .as_array()
            .unwrap()
            .iter()
            .map(|message| message["body"].as_str().unwrap())
            .collect();
        assert_eq!(bodies, vec!["m0"]);

        let missing = ulid::Ulid::new().to_string();
        let (status, _) = send(
            &app,
            "GET",
            &format!("/v1/channels/{channel_id}?before={missing}"),
            Some(&alice),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // A cursor from another channel is rejected.
        let other = create_channel(&app, &alice, json!({"name":"random"})).await;
        let other_id = other["channelID"].as_str().unwrap();
        let stray = post_message(&app, &alice, other_id, "elsewhere").await["messageID"]
            .as_str()
            .unwrap()
            .to_owned();
        let (status, _) = send(
            &app,
            "GET",
            &format!("/v1/channels/{channel_id}?before={stray}"),
            Some(&alice),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn history_pages_are_capped_at_one_hundred() {
        let (app, _) = test_app();
        let alice = user(1);

        let channel = create_channel(&app, &alice, json!({"name":"firehose"})).await;
        let channel_id = channel["channelID"].as_str().unwrap().to_owned();
        for n in 0..105 {
            post_message(&app, &alice, &channel_id, &format!("m{n}")).await;
        }

        let (status, page) = send(
            &app,
            "GET",
            &format!("/v1/channels/{channel_id}"),
            Some(&alice),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page.as_array().unwrap().len(), 100);
    }

    #[tokio::test]
    async fn failed_message_cascade_reports_partial_failure() {
        let (app, state) = test_app();
        let alice = user(1);

        let channel = create_channel(&app, &alice, json!({"name":"general"})).await;
        let channel_id = channel["channelID"].as_str().unwrap().to_owned();
        post_message(&app, &alice, &channel_id, "orphan-to-be").await;

        state
            .fail_message_cascade
            .store(true, std::sync::atomic::Ordering::Relaxed);
        let (status, body) = send(
            &app,
            "DELETE",
            &format!("/v1/channels/{channel_id}"),
            Some(&alice),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "cascade_incomplete");

        // The channel mutation itself committed: the channel is gone,
        // its deletion event went out, and the orphaned message stays.
        state
            .fail_message_cascade
            .store(false, std::sync::atomic::Ordering::Relaxed);
        let (status, _) = send(
            &app,
            "GET",
            &format!("/v1/channels/{channel_id}"),
            Some(&alice),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(state.messages.read().await.len(), 1);

        let last = state.publisher.recorded().await.pop().unwrap();
        assert_eq!(last["type"], "channel-delete");
        assert_eq!(last["payload"], channel["channelID"]);
    }

    #[tokio::test]
    async fn flush_without_brokers_is_a_no_op() {
        let (app, state) = test_app();
        let alice = user(1);

        create_channel(&app, &alice, json!({"name":"general"})).await;
        state.publisher.flush(Duration::from_secs(1)).unwrap();
        assert_eq!(state.publisher.recorded().await.len(), 1);
    }

    #[tokio::test]
    async fn oversized_message_bodies_are_rejected() {
        let (app, _) = test_app();
        let alice = user(1);

        let channel = create_channel(&app, &alice, json!({"name":"general"})).await;
        let channel_id = channel["channelID"].as_str().unwrap().to_owned();

        let oversized = "x".repeat(strand_core::MAX_MESSAGE_BODY_CHARS + 1);
        let (status, body) = send(
            &app,
            "POST",
            &format!("/v1/channels/{channel_id}"),
            Some(&alice),
            Some(json!({"body": oversized})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");
    }
}
