#[derive(Debug, Deserialize)]
struct MicroConversionRequest {
    click_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpinRequest {
    click_id: Option<String>,
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct SpinResponse {
    points_won: i64,
    total_points: i64,
    tier: contracts::TrustTier,
}

/// Dwell beacon from the landing page. Unknown click ids are acknowledged
/// the same as known ones so the beacon cannot be used as an oracle.
async fn track_micro_conversion(
    State(state): State<AppState>,
    Json(request): Json<MicroConversionRequest>,
) -> Result<&'static str, HttpApiError> {
    let click_id = required(request.click_id, "click_id")?;

    let api = state.inner.lock().await;
    let outcome = api
        .record_conversion(&click_id)
        .map_err(|err| HttpApiError::storage(Some(err.to_string())))?;

    match outcome {
        ledger_core::ConversionOutcome::Recorded { user_id } => {
            tracing::info!(click_id, user_id, "micro-conversion recorded");
        }
        ledger_core::ConversionOutcome::UnknownClick => {
            tracing::warn!(click_id, "micro-conversion for unknown click");
        }
    }

    Ok("OK")
}

async fn spin_reward(
    State(state): State<AppState>,
    Json(request): Json<SpinRequest>,
) -> Result<Json<SpinResponse>, HttpApiError> {
    let click_id = required(request.click_id, "click_id")?;
    let user_id = request
        .user_id
        .filter(|candidate| !candidate.trim().is_empty())
        .unwrap_or_else(|| ANONYMOUS_USER_ID.to_string());

    let mut api = state.inner.lock().await;
    let payout = api
        .spin_reward(&click_id, &user_id)
        .map_err(HttpApiError::from_ledger)?;

    tracing::info!(
        click_id,
        user_id,
        points_won = payout.points_won,
        "reward settled"
    );

    Ok(Json(SpinResponse {
        points_won: payout.points_won,
        total_points: payout.total_points,
        tier: payout.tier,
    }))
}
