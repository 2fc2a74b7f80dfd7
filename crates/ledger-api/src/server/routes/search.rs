#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: Option<String>,
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct SearchResult {
    id: String,
    name: String,
    url: String,
    booking_url: String,
    score: f64,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    query: String,
    results: Vec<SearchResult>,
}

async fn search_placements(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, HttpApiError> {
    let q = required(query.q, "q")?;
    let user_id = query
        .user_id
        .filter(|candidate| !candidate.trim().is_empty())
        .unwrap_or_else(|| ANONYMOUS_USER_ID.to_string());

    let mut api = state.inner.lock().await;
    let origin = api.config().public_origin.clone();
    let ranked = api
        .search(&q)
        .map_err(|err| HttpApiError::storage(Some(err.to_string())))?;

    let results = ranked
        .into_iter()
        .map(|placement| SearchResult {
            booking_url: booking_url(&origin, &placement.advertiser, &user_id),
            id: placement.advertiser.id,
            name: placement.advertiser.name,
            url: placement.advertiser.url,
            score: placement.score,
        })
        .collect();

    Ok(Json(SearchResponse { query: q, results }))
}
