#[derive(Debug, Deserialize)]
struct MessagingWebhookRequest {
    #[serde(default)]
    events: Vec<MessagingEvent>,
}

#[derive(Debug, Deserialize)]
struct MessagingEvent {
    user_id: String,
    text: String,
}

/// Payment provider webhook. Only `order_created` events carry a credit;
/// everything else is acknowledged and dropped.
async fn payment_webhook(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<&'static str, HttpApiError> {
    let event_name = payload
        .pointer("/meta/event_name")
        .and_then(Value::as_str)
        .unwrap_or_default();

    if event_name != "order_created" {
        tracing::info!(event_name, "payment webhook ignored");
        return Ok("Webhook OK");
    }

    let Some(shop_id) = payload
        .pointer("/meta/custom_data/shop_id")
        .and_then(Value::as_str)
        .filter(|candidate| !candidate.trim().is_empty())
    else {
        return Err(HttpApiError::invalid_request("Missing shop_id", None));
    };

    let amount = payload
        .pointer("/data/attributes/total")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    if amount <= 0 {
        return Err(HttpApiError::invalid_request(
            "total must be a positive amount",
            Some(format!("total={amount}")),
        ));
    }

    let api = state.inner.lock().await;
    let credited = api
        .credit_balance(shop_id, amount)
        .map_err(|err| HttpApiError::storage(Some(err.to_string())))?;

    if credited {
        tracing::info!(shop_id, amount, "advertiser balance topped up");
    } else {
        tracing::warn!(shop_id, amount, "payment for unknown advertiser dropped");
    }

    Ok("Webhook OK")
}

/// Inbound messaging webhook. Each event runs a search and replies through
/// the transport; a delivery failure is logged and never fails the request.
async fn messaging_webhook(
    State(state): State<AppState>,
    Json(request): Json<MessagingWebhookRequest>,
) -> Result<&'static str, HttpApiError> {
    for event in &request.events {
        let user_id = if event.user_id.trim().is_empty() {
            ANONYMOUS_USER_ID
        } else {
            event.user_id.as_str()
        };

        let reply_text = {
            let mut api = state.inner.lock().await;
            let origin = api.config().public_origin.clone();
            let ranked = api
                .search(&event.text)
                .map_err(|err| HttpApiError::storage(Some(err.to_string())))?;
            compose_reply(&origin, &ranked, user_id)
        };

        if let Err(err) = state.reply.send_reply(user_id, &reply_text) {
            tracing::warn!(user_id, error = %err, "reply delivery failed");
        }
    }

    Ok("OK")
}
