use crate::types::{AggregatorError, Result};
use url::{form_urlencoded, Url};

const DEFAULT_PORTS: &[(&str, u16)] = &[("http", 80), ("https", 443)];

/// Canonical form of an article URL, used as the article identity.
///
/// Host is lower-cased with one leading `www.` removed, default ports are
/// dropped, trailing slashes are trimmed from non-root paths, `utm_*` query
/// parameters are removed and the rest sorted, and the fragment is discarded.
/// Userinfo is kept as-is.
pub fn canonicalize(raw_url: &str) -> Result<String> {
    if raw_url.is_empty() {
        return Err(invalid(raw_url, "URL is empty"));
    }

    let parsed = Url::parse(raw_url).map_err(|e| invalid(raw_url, &e.to_string()))?;

    let host = match parsed.host_str() {
        Some(host) if !host.is_empty() => host.to_lowercase(),
        _ => return Err(invalid(raw_url, "URL must include a scheme and host")),
    };
    let host = host.strip_prefix("www.").map(str::to_string).unwrap_or(host);

    let scheme = parsed.scheme();
    let default_port = DEFAULT_PORTS
        .iter()
        .find(|(name, _)| *name == scheme)
        .map(|(_, port)| *port);
    let port_segment = match parsed.port() {
        Some(port) if Some(port) != default_port => format!(":{}", port),
        _ => String::new(),
    };

    let mut userinfo = String::new();
    if !parsed.username().is_empty() {
        userinfo.push_str(parsed.username());
        if let Some(password) = parsed.password() {
            userinfo.push(':');
            userinfo.push_str(password);
        }
        userinfo.push('@');
    }

    let path = canonical_path(parsed.path());

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !key.to_lowercase().starts_with("utm_"))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    pairs.sort();
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter())
        .finish();

    let mut canonical = format!("{}://{}{}{}{}", scheme, userinfo, host, port_segment, path);
    if !query.is_empty() {
        canonical.push('?');
        canonical.push_str(&query);
    }
    Ok(canonical)
}

fn canonical_path(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_string();
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn invalid(raw_url: &str, reason: &str) -> AggregatorError {
    AggregatorError::InvalidUrl {
        url: raw_url.to_string(),
        reason: reason.to_string(),
    }
}
