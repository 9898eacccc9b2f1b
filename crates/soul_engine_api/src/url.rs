/// Websocket host used when nothing is configured.
pub const DEFAULT_WS_HOST: &str = "ws://localhost:4000";
/// Path of the token issuance endpoint.
pub const AUTH_TOKEN_PATH: &str = "/auth/token";

/// Strips every trailing `/`.
#[must_use]
pub fn trim_trailing_slash(value: &str) -> &str {
    value.trim_end_matches('/')
}

/// Resolves the HTTP host for token requests.
///
/// Resolution rules:
/// 1) an explicit, non-blank `http_host` wins (trailing slashes trimmed)
/// 2) `wss://` maps to `https://` and `ws://` maps to `http://`
/// 3) any other websocket host is used verbatim
#[must_use]
pub fn resolve_http_host(ws_host: &str, http_host: Option<&str>) -> String {
    if let Some(http_host) = http_host.map(str::trim).filter(|value| !value.is_empty()) {
        return trim_trailing_slash(http_host).to_string();
    }

    let normalized = trim_trailing_slash(ws_host.trim());
    if let Some(rest) = normalized.strip_prefix("wss://") {
        return format!("https://{rest}");
    }
    if let Some(rest) = normalized.strip_prefix("ws://") {
        return format!("http://{rest}");
    }

    normalized.to_string()
}

/// Websocket endpoint for an organization's experience channel.
#[must_use]
pub fn experience_url(ws_host: &str, organization: &str) -> String {
    format!("{}/{organization}/experience", trim_trailing_slash(ws_host.trim()))
}

#[must_use]
pub fn auth_token_url(http_host: &str) -> String {
    format!("{}{AUTH_TOKEN_PATH}", trim_trailing_slash(http_host.trim()))
}
