#[derive(Debug, Deserialize)]
struct ShopQuery {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpsertShopRequest {
    id: Option<String>,
    name: Option<String>,
    url: Option<String>,
    cpc_bid: Option<i64>,
}

#[derive(Debug, Serialize)]
struct UpsertShopResponse {
    success: bool,
    id: String,
}

// TODO: gate these behind an admin token once the deploy story settles;
// today the route trusts the network boundary.
async fn get_shop(
    State(state): State<AppState>,
    Query(query): Query<ShopQuery>,
) -> Result<Json<Advertiser>, HttpApiError> {
    let id = required(query.id, "id")?;

    let api = state.inner.lock().await;
    let advertiser = api
        .advertiser(&id)
        .map_err(|err| HttpApiError::storage(Some(err.to_string())))?;

    match advertiser {
        Some(advertiser) => Ok(Json(advertiser)),
        None => Err(HttpApiError::not_found(
            "advertiser does not exist",
            Some(format!("id={id}")),
        )),
    }
}

async fn upsert_shop(
    State(state): State<AppState>,
    Json(request): Json<UpsertShopRequest>,
) -> Result<Json<UpsertShopResponse>, HttpApiError> {
    let name = required(request.name, "name")?;
    let url = required(request.url, "url")?;
    let Some(cpc_bid) = request.cpc_bid else {
        return Err(HttpApiError::invalid_request("cpc_bid is required", None));
    };
    if cpc_bid <= 0 {
        return Err(HttpApiError::invalid_request(
            "cpc_bid must be positive",
            Some(format!("cpc_bid={cpc_bid}")),
        ));
    }

    let api = state.inner.lock().await;
    let id = api
        .upsert_advertiser(request.id, name, url, cpc_bid)
        .map_err(|err| HttpApiError::storage(Some(err.to_string())))?;

    tracing::info!(id, "advertiser listing upserted");
    Ok(Json(UpsertShopResponse { success: true, id }))
}
