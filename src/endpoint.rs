//! Shared configuration helpers for the Azure REST clients.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

/// Characters to percent-encode in a single URL path segment.
const SEGMENT_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'/')
    .add(b'?')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'@')
    .add(b'[')
    .add(b']')
    .add(b';')
    .add(b'=');

pub(crate) fn encode_segment(s: &str) -> String {
    utf8_percent_encode(s, SEGMENT_ENCODE_SET).to_string()
}

#[derive(Clone)]
pub(crate) struct ApiKey(String);

impl ApiKey {
    pub(crate) fn new(key: &str) -> Self {
        Self(key.trim().to_string())
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Look up a variable, treating blank values as unset.
pub(crate) fn non_empty(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Resolve a service base URL.
///
/// An explicit endpoint variable wins; otherwise the service name variable is
/// expanded to `https://<name>.<host_suffix>`. The result has no trailing slash.
pub(crate) fn resolve_base_url(
    lookup: &impl Fn(&str) -> Option<String>,
    endpoint_var: &str,
    service_var: &str,
    host_suffix: &str,
) -> Option<String> {
    let raw = match non_empty(lookup, endpoint_var) {
        Some(endpoint) => endpoint,
        None => format!("https://{}.{host_suffix}", non_empty(lookup, service_var)?),
    };
    let parsed = url::Url::parse(&raw).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host().is_none() {
        return None;
    }
    Some(raw.trim_end_matches('/').to_string())
}

#[cfg(test)]
pub(crate) fn lookup_from<'a>(
    vars: &'a [(&'a str, &'a str)],
) -> impl Fn(&str) -> Option<String> + 'a {
    move |name| {
        vars.iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.to_string())
    }
}
