fn apply_cors_headers(headers: &mut axum::http::HeaderMap) {
    headers.insert(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-max-age"),
        HeaderValue::from_static("3600"),
    );
}

fn required(value: Option<String>, field: &str) -> Result<String, HttpApiError> {
    value
        .map(|candidate| candidate.trim().to_string())
        .filter(|candidate| !candidate.is_empty())
        .ok_or_else(|| {
            HttpApiError::invalid_request(
                format!("{field} is required"),
                Some(format!("field={field}")),
            )
        })
}

/// Tracked booking url for a placement, routed through the click endpoint.
fn booking_url(origin: &str, advertiser: &Advertiser, user_id: &str) -> String {
    format!(
        "{origin}/click?shop_id={}&target={}&user_id={}",
        urlencoding::encode(&advertiser.id),
        urlencoding::encode(&advertiser.url),
        urlencoding::encode(user_id),
    )
}

fn append_click_id(target: &str, click_id: &str) -> String {
    let separator = if target.contains('?') { '&' } else { '?' };
    format!(
        "{target}{separator}{CLICK_ID_PARAM}={}",
        urlencoding::encode(click_id)
    )
}

fn redirect_found(location: &str) -> Result<Response, HttpApiError> {
    let value = HeaderValue::from_str(location).map_err(|_| {
        HttpApiError::invalid_request(
            "target produces an invalid redirect location",
            Some(format!("location={location}")),
        )
    })?;

    let mut response = Response::new(axum::body::Body::empty());
    *response.status_mut() = StatusCode::FOUND;
    response.headers_mut().insert(LOCATION, value);
    Ok(response)
}

fn compose_reply(origin: &str, ranked: &[RankedPlacement], user_id: &str) -> String {
    if ranked.is_empty() {
        return "No sponsored places matched your search.".to_string();
    }

    let mut lines = vec!["Here is what I found:".to_string()];
    for placement in ranked {
        lines.push(format!(
            "{}: {}",
            placement.advertiser.name,
            booking_url(origin, &placement.advertiser, user_id)
        ));
    }
    lines.join("\n")
}
