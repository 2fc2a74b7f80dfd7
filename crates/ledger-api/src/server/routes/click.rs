#[derive(Debug, Deserialize)]
struct ClickQuery {
    shop_id: Option<String>,
    target: Option<String>,
    user_id: Option<String>,
    click_id: Option<String>,
}

/// Billable redirect. The visitor is always forwarded when the target is
/// sane; billing problems are logged, never surfaced to the visitor.
async fn click_redirect(
    State(state): State<AppState>,
    Query(query): Query<ClickQuery>,
) -> Result<Response, HttpApiError> {
    let shop_id = required(query.shop_id, "shop_id")?;
    let target = required(query.target, "target")?;

    if !target.starts_with("http://") && !target.starts_with("https://") {
        return Err(HttpApiError::invalid_request(
            "target must be an absolute http(s) url",
            Some(format!("target={target}")),
        ));
    }

    let api = state.inner.lock().await;
    let issued = api
        .issue_click(
            &shop_id,
            query.user_id.as_deref(),
            query.click_id.as_deref(),
        )
        .map_err(|err| HttpApiError::storage(Some(err.to_string())))?;

    match issued.debit {
        Some(DebitOutcome::Applied { new_balance }) => {
            tracing::info!(
                shop_id,
                click_id = issued.click.id,
                new_balance,
                "click billed"
            );
        }
        Some(DebitOutcome::InsufficientBalance) => {
            tracing::warn!(shop_id, click_id = issued.click.id, "click not billed: balance below bid");
        }
        Some(DebitOutcome::UnknownAdvertiser) => {
            tracing::warn!(shop_id, click_id = issued.click.id, "click not billed: unknown advertiser");
        }
        None => {
            tracing::info!(shop_id, click_id = issued.click.id, "click id reused, not billed again");
        }
    }

    let location = append_click_id(&target, &issued.click.id);
    redirect_found(&location)
}
