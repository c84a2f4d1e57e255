//! Client for talking to a remote federation endpoint

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::link::as_federation_link;
use crate::models::{
    FederationError, FederationRequest, FederationResult, FederationToken, RepositoryModel,
    StatusReport, UserModel,
};

/// How a remote answered a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalResult {
    Accepted,
    /// The remote does not take proposals
    NotAllowed,
    /// The remote rejected the snapshot as malformed
    MissingData,
    Error(u16),
}

/// HTTP client for pulling from, proposing to, and reporting to peers
#[derive(Clone)]
pub struct FederationClient {
    http_client: reqwest::Client,
}

impl FederationClient {
    pub fn new(timeout: Duration) -> FederationResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FederationError::NetworkError(e.to_string()))?;

        Ok(Self { http_client })
    }

    /// Repositories offered by a source, keyed by clone URL
    pub async fn pull_repositories(
        &self,
        source_url: &str,
        token: &str,
    ) -> FederationResult<BTreeMap<String, RepositoryModel>> {
        self.pull(source_url, token, FederationRequest::PullRepositories).await
    }

    pub async fn pull_users(&self, source_url: &str, token: &str) -> FederationResult<Vec<UserModel>> {
        self.pull(source_url, token, FederationRequest::PullUsers).await
    }

    pub async fn pull_settings(
        &self,
        source_url: &str,
        token: &str,
    ) -> FederationResult<BTreeMap<String, String>> {
        self.pull(source_url, token, FederationRequest::PullSettings).await
    }

    async fn pull<T: DeserializeOwned>(
        &self,
        source_url: &str,
        token: &str,
        req: FederationRequest,
    ) -> FederationResult<T> {
        let url = as_federation_link(source_url, None, token, Some(req), None);
        debug!("Federation {} from {}", req, source_url);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| FederationError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(pull_error(source_url, req, status));
        }
        response
            .json()
            .await
            .map_err(|e| FederationError::NetworkError(e.to_string()))
    }

    /// Ask `remote_url` to register this instance as a source
    pub async fn propose(
        &self,
        remote_url: &str,
        token_type: FederationToken,
        token: &str,
        my_url: &str,
        repositories: &BTreeMap<String, RepositoryModel>,
    ) -> FederationResult<ProposalResult> {
        let url = as_federation_link(
            remote_url,
            Some(token_type),
            token,
            Some(FederationRequest::Proposal),
            Some(my_url),
        );

        let response = self
            .http_client
            .post(&url)
            .json(repositories)
            .send()
            .await
            .map_err(|e| FederationError::NetworkError(e.to_string()))?;

        let result = proposal_result(response.status());
        if result != ProposalResult::Accepted {
            warn!("Proposal to {} was not accepted: {:?}", remote_url, result);
        }
        Ok(result)
    }

    /// Report the outcome of a pull cycle back to the source
    pub async fn send_status(
        &self,
        source_url: &str,
        token: &str,
        my_url: &str,
        report: &StatusReport,
    ) -> FederationResult<()> {
        let url = as_federation_link(
            source_url,
            None,
            token,
            Some(FederationRequest::Status),
            Some(my_url),
        );

        let response = self
            .http_client
            .post(&url)
            .json(report)
            .send()
            .await
            .map_err(|e| FederationError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FederationError::NetworkError(format!(
                "Status report to {} failed: {}",
                source_url,
                response.status()
            )));
        }
        Ok(())
    }
}

fn pull_error(source_url: &str, req: FederationRequest, status: StatusCode) -> FederationError {
    match status {
        StatusCode::FORBIDDEN => {
            FederationError::Unauthorized(format!("{} refused {}", source_url, req))
        }
        status => FederationError::NetworkError(format!(
            "{} answered {} with {}",
            source_url, req, status
        )),
    }
}

fn proposal_result(status: StatusCode) -> ProposalResult {
    match status {
        status if status.is_success() => ProposalResult::Accepted,
        StatusCode::METHOD_NOT_ALLOWED => ProposalResult::NotAllowed,
        StatusCode::BAD_REQUEST => ProposalResult::MissingData,
        status => ProposalResult::Error(status.as_u16()),
    }
}

impl std::fmt::Debug for FederationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationClient").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;

    /// Answer one request with `status_line` and `body`; yields the raw request
    async fn answer_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = tx.send(request);
        });

        (format!("http://{}", addr), rx)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&data).into_owned();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if data.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).into_owned()
    }

    fn client() -> FederationClient {
        FederationClient::new(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_proposal_result_mapping() {
        assert_eq!(proposal_result(StatusCode::OK), ProposalResult::Accepted);
        assert_eq!(proposal_result(StatusCode::NO_CONTENT), ProposalResult::Accepted);
        assert_eq!(proposal_result(StatusCode::METHOD_NOT_ALLOWED), ProposalResult::NotAllowed);
        assert_eq!(proposal_result(StatusCode::BAD_REQUEST), ProposalResult::MissingData);
        assert_eq!(proposal_result(StatusCode::BAD_GATEWAY), ProposalResult::Error(502));
    }

    #[test]
    fn test_pull_error_mapping() {
        assert!(matches!(
            pull_error("https://peer", FederationRequest::PullUsers, StatusCode::FORBIDDEN),
            FederationError::Unauthorized(_)
        ));
        assert!(matches!(
            pull_error("https://peer", FederationRequest::PullUsers, StatusCode::NOT_FOUND),
            FederationError::NetworkError(_)
        ));
    }

    #[tokio::test]
    async fn test_pull_settings_decodes_payload() {
        let (base, request) = answer_once("200 OK", r#"{"git.federation": "on"}"#).await;

        let settings = client().pull_settings(&base, "tok").await.unwrap();
        assert_eq!(settings.get("git.federation").map(String::as_str), Some("on"));

        let request = request.await.unwrap();
        assert!(request.starts_with("GET /federation?req=pull_settings&token=tok "));
    }

    #[tokio::test]
    async fn test_pull_refused_is_unauthorized() {
        let (base, _request) = answer_once("403 Forbidden", "").await;

        let result = client().pull_users(&base, "tok").await;
        assert!(matches!(result, Err(FederationError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_propose_reports_refusal() {
        let (base, request) = answer_once("405 Method Not Allowed", "").await;

        let result = client()
            .propose(
                &base,
                FederationToken::All,
                "tok",
                "https://me.example.com",
                &BTreeMap::new(),
            )
            .await
            .unwrap();
        assert_eq!(result, ProposalResult::NotAllowed);

        let request = request.await.unwrap();
        assert!(request.starts_with(
            "POST /federation?req=proposal&token=tok&tokenType=all&url=https%3A%2F%2Fme.example.com "
        ));
        assert!(request.ends_with("{}"));
    }

    #[tokio::test]
    async fn test_send_status_fails_on_error_status() {
        let (base, _request) = answer_once("500 Internal Server Error", "").await;
        let report = StatusReport {
            name: "mirror".to_string(),
            url: "https://me.example.com".to_string(),
            frequency: "60 mins".to_string(),
            statuses: Vec::new(),
        };

        let result = client()
            .send_status(&base, "tok", "https://me.example.com", &report)
            .await;
        assert!(matches!(result, Err(FederationError::NetworkError(_))));
    }
}
