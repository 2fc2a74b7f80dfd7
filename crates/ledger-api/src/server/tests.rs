use super::*;

use contracts::TrustTier;
use ledger_core::{ManualClock, MemoryLedger, SequenceSampler, UniformRelevance};

fn deterministic_api(config: ServiceConfig, clock: Arc<ManualClock>) -> LedgerApi {
    LedgerApi::with_stores(
        config,
        MemoryLedger::new().stores(),
        Box::new(UniformRelevance::new(Box::new(SequenceSampler::new([0.5])))),
        Box::new(SequenceSampler::new([0.5])),
        clock,
    )
}

#[derive(Debug, Default)]
struct RecordingReply {
    sent: std::sync::Mutex<Vec<(String, String)>>,
}

impl ReplyTransport for RecordingReply {
    fn send_reply(&self, user_id: &str, text: &str) -> Result<(), crate::UpstreamError> {
        self.sent
            .lock()
            .expect("reply lock")
            .push((user_id.to_string(), text.to_string()));
        Ok(())
    }
}

#[test]
fn required_rejects_blank_values() {
    assert_eq!(required(Some(" x ".into()), "q").expect("trimmed"), "x");
    assert!(required(Some("   ".into()), "q").is_err());
    assert!(required(None, "q").is_err());
}

#[test]
fn append_click_id_respects_existing_query_string() {
    assert_eq!(
        append_click_id("https://a.example/p", "c1"),
        "https://a.example/p?vai_click_id=c1"
    );
    assert_eq!(
        append_click_id("https://a.example/p?ref=x", "c1"),
        "https://a.example/p?ref=x&vai_click_id=c1"
    );
}

#[test]
fn booking_url_escapes_its_parts() {
    let advertiser = Advertiser {
        id: "shop one".into(),
        name: "Shop".into(),
        url: "https://a.example/?x=1&y=2".into(),
        cpc_bid: 5,
        ad_balance: 10,
    };

    let url = booking_url("http://127.0.0.1:8080", &advertiser, "u/1");
    assert!(url.starts_with("http://127.0.0.1:8080/click?shop_id=shop%20one&target="));
    assert!(url.contains("https%3A%2F%2Fa.example%2F%3Fx%3D1%26y%3D2"));
    assert!(url.ends_with("&user_id=u%2F1"));
}

#[tokio::test]
async fn click_redirect_bills_once_and_forwards() {
    let clock = Arc::new(ManualClock::at(0));
    let api = deterministic_api(ServiceConfig::default(), clock);
    let id = api
        .upsert_advertiser(None, "inn".into(), "https://inn.example".into(), 50)
        .expect("register");
    api.credit_balance(&id, 100).expect("credit");
    let state = AppState::new(api);

    let response = click_redirect(
        State(state.clone()),
        Query(ClickQuery {
            shop_id: Some(id.clone()),
            target: Some("https://inn.example/offer".into()),
            user_id: Some("u1".into()),
            click_id: None,
        }),
    )
    .await
    .expect("redirect");

    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response
        .headers()
        .get(LOCATION)
        .expect("location")
        .to_str()
        .expect("ascii");
    assert!(location.starts_with("https://inn.example/offer?vai_click_id="));

    let api = state.inner.lock().await;
    let balance = api
        .advertiser(&id)
        .expect("get")
        .expect("present")
        .ad_balance;
    assert_eq!(balance, 50);
}

#[tokio::test]
async fn click_redirect_rejects_relative_targets() {
    let state = AppState::in_memory(ServiceConfig::default());
    let result = click_redirect(
        State(state),
        Query(ClickQuery {
            shop_id: Some("a".into()),
            target: Some("/local/path".into()),
            user_id: None,
            click_id: None,
        }),
    )
    .await;

    let err = result.expect_err("relative target");
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
    assert_eq!(err.error.error_code, ErrorCode::InvalidRequest);
}

#[tokio::test]
async fn spin_surfaces_dwell_details() {
    let clock = Arc::new(ManualClock::at(0));
    let api = deterministic_api(ServiceConfig::default(), clock.clone());
    let id = api
        .upsert_advertiser(None, "inn".into(), "https://inn.example".into(), 1)
        .expect("register");
    api.credit_balance(&id, 5).expect("credit");
    let issued = api.issue_click(&id, Some("u1"), None).expect("click");
    let state = AppState::new(api);

    clock.set(2_000);
    let err = spin_reward(
        State(state.clone()),
        Json(SpinRequest {
            click_id: Some(issued.click.id.clone()),
            user_id: Some("u1".into()),
        }),
    )
    .await
    .expect_err("dwell gate");
    assert_eq!(err.error.error_code, ErrorCode::DwellNotMet);

    clock.set(10_000);
    let payout = spin_reward(
        State(state),
        Json(SpinRequest {
            click_id: Some(issued.click.id),
            user_id: Some("u1".into()),
        }),
    )
    .await
    .expect("spin");
    assert_eq!(payout.0.tier, TrustTier::Base);
    assert_eq!(payout.0.points_won, 1);
}

#[tokio::test]
async fn payment_webhook_credits_known_advertisers() {
    let state = AppState::in_memory(ServiceConfig::default());
    let id = {
        let api = state.inner.lock().await;
        api.upsert_advertiser(None, "inn".into(), "https://inn.example".into(), 10)
            .expect("register")
    };

    let payload = json!({
        "meta": {
            "event_name": "order_created",
            "custom_data": { "shop_id": id }
        },
        "data": { "attributes": { "total": 2500 } }
    });

    let body = payment_webhook(State(state.clone()), Json(payload))
        .await
        .expect("webhook");
    assert_eq!(body, "Webhook OK");

    let api = state.inner.lock().await;
    let balance = api
        .advertiser(&id)
        .expect("get")
        .expect("present")
        .ad_balance;
    assert_eq!(balance, 2500);
}

#[tokio::test]
async fn payment_webhook_requires_shop_id() {
    let state = AppState::in_memory(ServiceConfig::default());
    let payload = json!({
        "meta": { "event_name": "order_created" },
        "data": { "attributes": { "total": 2500 } }
    });

    let err = payment_webhook(State(state), Json(payload))
        .await
        .expect_err("missing shop_id");
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn payment_webhook_ignores_other_events() {
    let state = AppState::in_memory(ServiceConfig::default());
    let payload = json!({
        "meta": { "event_name": "subscription_cancelled" }
    });

    let body = payment_webhook(State(state), Json(payload))
        .await
        .expect("acknowledged");
    assert_eq!(body, "Webhook OK");
}

#[tokio::test]
async fn messaging_webhook_replies_per_event() {
    let clock = Arc::new(ManualClock::at(0));
    let api = deterministic_api(ServiceConfig::default(), clock);
    let id = api
        .upsert_advertiser(None, "inn".into(), "https://inn.example".into(), 10)
        .expect("register");
    api.credit_balance(&id, 100).expect("credit");

    let reply = Arc::new(RecordingReply::default());
    let state = AppState::with_reply(api, reply.clone());

    let body = messaging_webhook(
        State(state),
        Json(MessagingWebhookRequest {
            events: vec![
                MessagingEvent {
                    user_id: "u1".into(),
                    text: "inn near the gate".into(),
                },
                MessagingEvent {
                    user_id: String::new(),
                    text: "anything".into(),
                },
            ],
        }),
    )
    .await
    .expect("webhook");
    assert_eq!(body, "OK");

    let sent = reply.sent.lock().expect("reply lock");
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].0, "u1");
    assert!(sent[0].1.contains("inn"));
    assert_eq!(sent[1].0, ANONYMOUS_USER_ID);
}
