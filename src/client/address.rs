//! Connection address assembly.
//!
//! The base address may use an HTTP scheme; it is mapped to the matching
//! WebSocket scheme. A sub-path is appended to the base path and query pairs
//! are URL-encoded onto the result.
//!
//! | Base scheme | Connection scheme |
//! |-------------|-------------------|
//! | `http`, `ws` | `ws` |
//! | `https`, `wss` | `wss` |

use url::{Host, Url};

use crate::error::{Error, Result};

/// Builds the connection URL.
///
/// # Errors
///
/// - [`Error::Url`] if `base` does not parse
/// - [`Error::Config`] if the scheme is not HTTP or WebSocket, or there is
///   no host
pub(crate) fn connection_url(
    base: &str,
    path: Option<&str>,
    query: &[(String, String)],
) -> Result<Url> {
    let mut url = Url::parse(base)?;

    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => {
            return Err(Error::config(format!(
                "unsupported scheme '{other}' in {base}, expected ws, wss, http or https"
            )));
        }
    };
    if url.scheme() != scheme && url.set_scheme(scheme).is_err() {
        return Err(Error::config(format!("cannot switch {base} to {scheme}")));
    }

    if url.host().is_none() {
        return Err(Error::config(format!("no host in {base}")));
    }

    if let Some(path) = path {
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
    }

    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    url.set_fragment(None);

    Ok(url)
}

/// Returns `true` if the endpoint is encrypted or on this machine.
pub(crate) fn is_trusted_endpoint(url: &Url) -> bool {
    if matches!(url.scheme(), "wss" | "https") {
        return true;
    }

    match url.host() {
        Some(Host::Domain(domain)) => {
            domain.eq_ignore_ascii_case("localhost") || domain.to_ascii_lowercase().ends_with(".localhost")
        }
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}
