//! SlackClient against a local stub of the Slack Web API

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use chat_search::api::{self, ChatApi, ConversationKind, HistoryWindow, RawHit, SlackClient};
use chat_search::config::{SearchSettings, SlackConfig};
use chat_search::enrich::{Enricher, HitOutcome};
use chat_search::identity::IdentityCache;
use chat_search::scope::TargetFilter;
use chat_search::SearchError;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    params: HashMap<String, String>,
    authorization: Option<String>,
}

type Calls = Arc<Mutex<Vec<Recorded>>>;

fn user(id: &str, display: &str, email: &str) -> Value {
    json!({
        "ok": true,
        "user": {
            "id": id,
            "name": display.to_lowercase(),
            "real_name": format!("{} Example", display),
            "profile": { "display_name": display, "email": email }
        }
    })
}

fn messages(list: Value) -> Value {
    json!({ "ok": true, "messages": list })
}

/// Top-level messages `(ts, user)` of the channels served with real history
/// semantics
fn channel_log(channel: &str) -> Option<Vec<(u64, &'static str)>> {
    match channel {
        // Ten messages by Ann; Zed only wrote the one at 90
        "CW" => Some(
            (1..=10)
                .map(|i| (i * 10, if i == 9 { "U9" } else { "U1" }))
                .collect(),
        ),
        "CBIG" => Some((1..=450).map(|i| (i, "U1")).collect()),
        _ => None,
    }
}

/// `conversations.history` the way Slack pages it: newest first, `limit`
/// counted back from `latest` (or now), `next_cursor` for the older rest
fn paged_history(log: Vec<(u64, &'static str)>, params: &HashMap<String, String>) -> Value {
    let bound = |name: &str| params.get(name).and_then(|v| v.parse::<f64>().ok());
    let inclusive = params.get("inclusive").map(String::as_str) == Some("true");
    let (oldest, latest) = (bound("oldest"), bound("latest"));

    let mut log: Vec<(u64, &str)> = log
        .into_iter()
        .filter(|(ts, _)| {
            let ts = *ts as f64;
            let above = oldest.map_or(true, |o| if inclusive { ts >= o } else { ts > o });
            let below = latest.map_or(true, |l| if inclusive { ts <= l } else { ts < l });
            above && below
        })
        .collect();
    log.sort_by(|a, b| b.0.cmp(&a.0));

    let offset: usize = params.get("cursor").and_then(|c| c.parse().ok()).unwrap_or(0);
    let limit: usize = params.get("limit").and_then(|l| l.parse().ok()).unwrap_or(100);
    let page: Vec<Value> = log
        .iter()
        .skip(offset)
        .take(limit)
        .map(|(ts, user)| json!({ "ts": format!("{}.000000", ts), "user": user, "text": "status" }))
        .collect();
    let next = if offset + limit < log.len() {
        (offset + limit).to_string()
    } else {
        String::new()
    };

    json!({
        "ok": true,
        "messages": page,
        "has_more": !next.is_empty(),
        "response_metadata": { "next_cursor": next }
    })
}

async fn slack_stub(
    State(calls): State<Calls>,
    Path(method): Path<String>,
    headers: HeaderMap,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    calls.lock().unwrap().push(Recorded {
        method: method.clone(),
        params: params.clone(),
        authorization,
    });

    let param = |name: &str| params.get(name).cloned().unwrap_or_default();

    let body = match method.as_str() {
        "auth.test" => json!({ "ok": true, "user_id": "UME" }),
        "search.messages" => {
            if param("query").contains("explode") {
                return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
            }
            json!({
                "ok": true,
                "messages": {
                    "matches": [
                        { "ts": "1.000100", "text": "the *launch* plan", "channel": { "id": "C1", "name": "general" } },
                        { "ts": "2.000200", "text": "launch again", "channel": { "id": "D1" } }
                    ]
                }
            })
        }
        "users.info" => user(&param("user"), "Ann", "a@x.com"),
        "users.lookupByEmail" => {
            if param("email") == "a@x.com" {
                user("U1", "Ann", "a@x.com")
            } else {
                json!({ "ok": false, "error": "users_not_found" })
            }
        }
        "conversations.history" => {
            if let Some(log) = channel_log(&param("channel")) {
                paged_history(log, &params)
            } else if param("latest") == "1.000100" && param("oldest") == "1.000100" {
                messages(json!([{ "ts": "1.000100", "user": "U1", "text": "the launch plan" }]))
            } else {
                messages(json!([]))
            }
        }
        "conversations.replies" => match param("ts").as_str() {
            "5.000500" => messages(json!([
                { "ts": "5.000000", "user": "U2", "text": "root", "thread_ts": "5.000000", "reply_count": 1 },
                { "ts": "5.000500", "user": "U1", "text": "reply", "thread_ts": "5.000000" }
            ])),
            "5.000000" => messages(json!([
                { "ts": "5.000000", "user": "U2", "text": "root", "thread_ts": "5.000000", "reply_count": 2 },
                { "ts": "5.000500", "user": "U1", "text": "reply", "thread_ts": "5.000000" },
                { "ts": "5.000900", "user": "U2", "text": "second reply", "thread_ts": "5.000000" }
            ])),
            _ => json!({ "ok": false, "error": "thread_not_found" }),
        },
        "conversations.members" => {
            if param("cursor") == "page2" {
                json!({ "ok": true, "members": ["U3"], "response_metadata": { "next_cursor": "" } })
            } else {
                json!({ "ok": true, "members": ["U1", "U2"], "response_metadata": { "next_cursor": "page2" } })
            }
        }
        "conversations.info" => match param("channel").as_str() {
            "D1" => json!({ "ok": true, "channel": { "id": "D1", "is_im": true } }),
            "G1" => json!({ "ok": true, "channel": { "id": "G1", "name": "mpdm-a--b-1", "is_mpim": true } }),
            other => json!({ "ok": true, "channel": { "id": other, "name": "general" } }),
        },
        "conversations.open" => json!({ "ok": true, "channel": { "id": "G1" } }),
        "chat.getPermalink" => json!({
            "ok": true,
            "permalink": format!(
                "https://example.slack.com/archives/{}/p{}",
                param("channel"),
                param("message_ts").replace('.', "")
            )
        }),
        _ => json!({ "ok": false, "error": "unknown_method" }),
    };

    Json(body).into_response()
}

async fn start_stub() -> (SlackClient, Calls) {
    let calls = Calls::default();
    let app = Router::new()
        .route("/api/:method", post(slack_stub))
        .with_state(calls.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = SlackConfig {
        api_base: format!("http://{}/api/", addr),
        token: Some("xoxp-test".to_string()),
        timeout_seconds: 5,
    };
    (SlackClient::new(&config).unwrap(), calls)
}

fn recorded(calls: &Calls, method: &str) -> Vec<Recorded> {
    calls
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.method == method)
        .cloned()
        .collect()
}

#[tokio::test]
async fn test_search_sends_query_and_token() {
    let (client, calls) = start_stub().await;

    let hits = client.search_messages("in:<@U1> launch", 7).await.unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].channel_id, "C1");
    assert_eq!(hits[0].ts, "1.000100");
    assert_eq!(hits[1].channel_id, "D1");

    let sent = recorded(&calls, "search.messages");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].params["query"], "in:<@U1> launch");
    assert_eq!(sent[0].params["count"], "7");
    assert_eq!(sent[0].params["sort"], "timestamp");
    assert_eq!(sent[0].authorization.as_deref(), Some("Bearer xoxp-test"));
}

#[tokio::test]
async fn test_error_envelope_becomes_api_error() {
    let (client, _) = start_stub().await;

    let err = client.user_by_email("nobody@x.com").await.unwrap_err();
    match err {
        SearchError::Api { method, error } => {
            assert_eq!(method, "users.lookupByEmail");
            assert_eq!(error, "users_not_found");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_http_failure_is_reported() {
    let (client, _) = start_stub().await;

    let err = client.search_messages("explode", 5).await.unwrap_err();
    assert!(matches!(err, SearchError::Api { ref error, .. } if error.contains("500")));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_whoami_and_profiles() {
    let (client, _) = start_stub().await;

    assert_eq!(client.whoami().await.unwrap(), "UME");

    let profile = client.user_by_id("U9").await.unwrap();
    assert_eq!(profile.id, "U9");
    assert_eq!(profile.preferred_name(), "Ann");
    assert_eq!(profile.email.as_deref(), Some("a@x.com"));
}

#[tokio::test]
async fn test_message_from_history_then_replies() {
    let (client, calls) = start_stub().await;

    let top = client.message("C1", "1.000100").await.unwrap().unwrap();
    assert_eq!(top.text, "the launch plan");
    assert!(recorded(&calls, "conversations.replies").is_empty());

    let reply = client.message("C1", "5.000500").await.unwrap().unwrap();
    assert_eq!(reply.thread_root(), Some("5.000000"));
    assert_eq!(reply.user.as_deref(), Some("U1"));

    assert!(client.message("C1", "9.000900").await.unwrap().is_none());
}

#[tokio::test]
async fn test_replies_respect_limit() {
    let (client, _) = start_stub().await;

    let thread = client.replies("C1", "5.000000", 2).await.unwrap();
    let ts: Vec<&str> = thread.iter().map(|m| m.ts.as_str()).collect();
    assert_eq!(ts, vec!["5.000000", "5.000500"]);
}

#[tokio::test]
async fn test_history_window_params() {
    let (client, calls) = start_stub().await;

    client
        .history("C1", HistoryWindow::after("3.000300", 2).with_cursor("abc"))
        .await
        .unwrap();

    let sent = recorded(&calls, "conversations.history");
    assert_eq!(sent[0].params["oldest"], "3.000300");
    assert_eq!(sent[0].params["limit"], "2");
    assert_eq!(sent[0].params["inclusive"], "false");
    assert_eq!(sent[0].params["cursor"], "abc");
    assert!(!sent[0].params.contains_key("latest"));
}

#[tokio::test]
async fn test_history_page_is_newest_first_with_cursor() {
    let (client, _) = start_stub().await;

    let page = client
        .history("CW", HistoryWindow::after("30.000000", 2))
        .await
        .unwrap();
    let ts: Vec<&str> = page.messages.iter().map(|m| m.ts.as_str()).collect();
    assert_eq!(ts, vec!["100.000000", "90.000000"]);
    assert_eq!(page.next_cursor.as_deref(), Some("2"));
}

#[tokio::test]
async fn test_messages_after_anchor_are_adjacent() {
    let (client, calls) = start_stub().await;

    let after = api::messages_after(&client, "CW", "30.000000", 2).await.unwrap();
    let ts: Vec<&str> = after.iter().map(|m| m.ts.as_str()).collect();
    assert_eq!(ts, vec!["40.000000", "50.000000"]);

    let after = api::messages_after(&client, "CBIG", "5.000000", 2).await.unwrap();
    let ts: Vec<&str> = after.iter().map(|m| m.ts.as_str()).collect();
    assert_eq!(ts, vec!["6.000000", "7.000000"]);

    let big: Vec<Recorded> = recorded(&calls, "conversations.history")
        .into_iter()
        .filter(|c| c.params["channel"] == "CBIG")
        .collect();
    assert_eq!(big.len(), 3);
    assert!(!big[0].params.contains_key("cursor"));
    assert_eq!(big[2].params["cursor"], "400");
}

#[tokio::test]
async fn test_channel_window_uses_adjacent_messages() {
    let (client, _) = start_stub().await;
    let client = Arc::new(client);
    let settings = SearchSettings::default();
    let cache = IdentityCache::new(client.clone());
    let enricher = Enricher::new(client.as_ref(), &cache, &settings);

    let anchor = RawHit {
        ts: "30.000000".to_string(),
        channel_id: "CW".to_string(),
        text: "status".to_string(),
    };

    // Zed's message at 90 is far from the anchor
    let zed = TargetFilter::Participants(vec!["U9".to_string()]);
    assert!(matches!(
        enricher.enrich_one(&anchor, &zed).await,
        HitOutcome::Filtered
    ));

    let ann = TargetFilter::Participants(vec!["U1".to_string()]);
    let HitOutcome::Kept(message) = enricher.enrich_one(&anchor, &ann).await else {
        panic!("expected hit to be kept");
    };
    let window: Vec<&str> = message.context.iter().map(|m| m.ts.as_str()).collect();
    assert_eq!(
        window,
        vec!["10.000000", "20.000000", "30.000000", "40.000000", "50.000000"]
    );
}

#[tokio::test]
async fn test_members_follow_cursor() {
    let (client, calls) = start_stub().await;

    let members = client.members("G1").await.unwrap();
    assert_eq!(members, vec!["U1", "U2", "U3"]);
    assert_eq!(recorded(&calls, "conversations.members").len(), 2);
}

#[tokio::test]
async fn test_conversation_kinds() {
    let (client, _) = start_stub().await;

    assert_eq!(
        client.conversation_info("D1").await.unwrap().kind,
        ConversationKind::Direct
    );

    let group = client.conversation_info("G1").await.unwrap();
    assert_eq!(group.kind, ConversationKind::Group);
    assert_eq!(group.name.as_deref(), Some("mpdm-a--b-1"));

    let channel = client.conversation_info("C1").await.unwrap();
    assert_eq!(channel.kind, ConversationKind::Channel);
    assert_eq!(channel.name.as_deref(), Some("general"));
}

#[tokio::test]
async fn test_open_conversation_and_permalink() {
    let (client, calls) = start_stub().await;

    let id = client
        .open_conversation(&["U1".to_string(), "U2".to_string()])
        .await
        .unwrap();
    assert_eq!(id, "G1");
    assert_eq!(recorded(&calls, "conversations.open")[0].params["users"], "U1,U2");

    let link = client.permalink("C1", "1.000100").await.unwrap();
    assert_eq!(link, "https://example.slack.com/archives/C1/p1000100");
}
