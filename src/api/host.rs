//! Base URL of this instance as seen by the caller
//!
//! Reverse proxies may report the original scheme, port and context path
//! in `X-Forwarded-*` headers (some send underscores instead of dashes).

use actix_web::http::header::HeaderMap;
use actix_web::HttpRequest;

fn forwarded<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let underscored = name.replace('-', "_");
    let found = [name, underscored.as_str()]
        .into_iter()
        .filter_map(|key| headers.get(key))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty());
    found
}

/// Resolve the base URL from the connection scheme, the `Host` value and
/// any forwarding headers. Default ports are omitted.
pub fn resolve_host_url(scheme: &str, host: &str, headers: &HeaderMap) -> String {
    let (server_name, host_port) = split_host(host);

    let mut scheme = scheme.to_string();
    let mut port = host_port.unwrap_or(if scheme == "https" { 443 } else { 80 });

    if let Some(forwarded_port) = forwarded(headers, "X-Forwarded-Port").and_then(|p| p.parse().ok()) {
        port = forwarded_port;
    }
    if let Some(forwarded_scheme) = forwarded(headers, "X-Forwarded-Proto") {
        scheme = forwarded_scheme.to_ascii_lowercase();
        // https proxy in front of a plain listener that did not send its port
        if scheme == "https" && port == 80 {
            port = 443;
        }
    }

    let context = forwarded(headers, "X-Forwarded-Context")
        .unwrap_or("")
        .trim_end_matches('/');

    let mut url = format!("{}://{}", scheme, server_name);
    let default_port = (scheme == "http" && port == 80) || (scheme == "https" && port == 443);
    if !default_port {
        url.push_str(&format!(":{}", port));
    }
    if !context.is_empty() {
        if !context.starts_with('/') {
            url.push('/');
        }
        url.push_str(context);
    }
    url
}

/// Base URL for `req`, unless a canonical URL is configured
pub fn host_url(req: &HttpRequest, canonical_url: Option<&str>) -> String {
    if let Some(canonical) = canonical_url.map(str::trim).filter(|url| !url.is_empty()) {
        return canonical.trim_end_matches('/').to_string();
    }
    let info = req.connection_info();
    resolve_host_url(info.scheme(), info.host(), req.headers())
}

fn split_host(host: &str) -> (&str, Option<u16>) {
    // bracketed IPv6 literals contain colons of their own
    if let Some(end) = host.rfind(']') {
        let (name, rest) = host.split_at(end + 1);
        return (name, rest.strip_prefix(':').and_then(|p| p.parse().ok()));
    }
    match host.rsplit_once(':') {
        Some((name, port)) => match port.parse() {
            Ok(port) => (name, Some(port)),
            Err(_) => (host, None),
        },
        None => (host, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut request = TestRequest::default();
        for pair in pairs {
            request = request.insert_header(*pair);
        }
        request.to_http_request().headers().clone()
    }

    #[test]
    fn test_plain_request() {
        assert_eq!(
            resolve_host_url("http", "git.example.com", &headers(&[])),
            "http://git.example.com"
        );
        assert_eq!(
            resolve_host_url("http", "git.example.com:8080", &headers(&[])),
            "http://git.example.com:8080"
        );
        assert_eq!(
            resolve_host_url("https", "git.example.com:443", &headers(&[])),
            "https://git.example.com"
        );
    }

    #[test]
    fn test_forwarded_headers() {
        let forwarded = headers(&[
            ("X-Forwarded-Proto", "https"),
            ("X-Forwarded-Context", "/gitblit/"),
        ]);
        assert_eq!(
            resolve_host_url("http", "git.example.com", &forwarded),
            "https://git.example.com/gitblit"
        );

        let with_port = headers(&[("X-Forwarded-Proto", "https"), ("X-Forwarded-Port", "8443")]);
        assert_eq!(
            resolve_host_url("http", "git.example.com:8080", &with_port),
            "https://git.example.com:8443"
        );
    }

    #[test]
    fn test_underscore_variants() {
        let forwarded = headers(&[("X_Forwarded_Proto", "https"), ("X_Forwarded_Port", "9443")]);
        assert_eq!(
            resolve_host_url("http", "git.example.com", &forwarded),
            "https://git.example.com:9443"
        );
    }

    #[test]
    fn test_ipv6_host() {
        assert_eq!(
            resolve_host_url("http", "[::1]:8080", &headers(&[])),
            "http://[::1]:8080"
        );
    }

    #[test]
    fn test_canonical_url_wins() {
        let req = TestRequest::default()
            .insert_header(("X-Forwarded-Proto", "https"))
            .to_http_request();
        assert_eq!(
            host_url(&req, Some("https://public.example.com/")),
            "https://public.example.com"
        );
    }
}
