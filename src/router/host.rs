//! Host header parsing: which view a request addresses

use std::net::IpAddr;

/// Strip an optional `:port` suffix
fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}

/// View name addressed by `host`, if any.
///
/// - the bare gateway hostname addresses no view
/// - `<view>.<hostname>` addresses `<view>`
/// - any other dotted host addresses its first label
/// - single-label hosts and IP literals address no view
///
/// The result is not validated; an invalid name simply has no route.
pub fn parse_view_name(hostname: &str, host: &str) -> Option<String> {
    if host.starts_with('[') {
        return None;
    }
    let host = strip_port(host.trim()).trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() || host.parse::<IpAddr>().is_ok() {
        return None;
    }
    let hostname = hostname.to_ascii_lowercase();
    if host == hostname {
        return None;
    }

    if let Some(view) = host
        .strip_suffix(hostname.as_str())
        .and_then(|rest| rest.strip_suffix('.'))
    {
        return (!view.is_empty()).then(|| view.to_string());
    }

    match host.split_once('.') {
        Some((label, rest)) if !label.is_empty() && !rest.is_empty() => Some(label.to_string()),
        _ => None,
    }
}
