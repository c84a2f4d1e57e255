//! Federation link construction and URL helpers

use crate::models::{FederationRequest, FederationToken};

/// Path of the federation endpoint
pub const FEDERATION_PATH: &str = "/federation";

/// Path prefix of repository clone URLs
pub const GIT_PATH: &str = "/git/";

/// Link for pulling from a source instance
pub fn as_pull_link(source_url: &str, token: &str, req: Option<FederationRequest>) -> String {
    as_federation_link(source_url, None, token, req, None)
}

/// Full federation link.
///
/// A trailing slash on `remote_url` is dropped and a missing request kind
/// means `pull_repositories`.
pub fn as_federation_link(
    remote_url: &str,
    token_type: Option<FederationToken>,
    token: &str,
    req: Option<FederationRequest>,
    my_url: Option<&str>,
) -> String {
    let base = remote_url.strip_suffix('/').unwrap_or(remote_url);
    let req = req.unwrap_or(FederationRequest::PullRepositories);

    let mut link = format!(
        "{}{}?req={}&token={}",
        base,
        FEDERATION_PATH,
        req.as_str(),
        token
    );
    if let Some(tier) = token_type {
        link.push_str("&tokenType=");
        link.push_str(tier.as_str());
    }
    if let Some(url) = my_url {
        link.push_str("&url=");
        link.push_str(&urlencoding::encode(url));
    }
    link
}

/// Clone URL of a repository served by the instance at `host_url`
pub fn clone_url(host_url: &str, repository: &str) -> String {
    let base = host_url.strip_suffix('/').unwrap_or(host_url);
    format!("{}{}{}", base, GIT_PATH, repository)
}

/// Undo HTML entity escaping applied to URL parameters
pub fn decode_from_html(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
