//! HTTP client for the relay endpoint.

use crate::negotiator::{NegotiationError, Relay, SessionDescription};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, instrument};

/// Media type of a session description body.
pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Posts the offer to a relay URL and reads the answer from the response body.
#[derive(Clone, Debug)]
pub struct HttpRelay {
    client: reqwest::Client,
    url: String,
}

impl HttpRelay {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Relay for HttpRelay {
    #[instrument(skip_all, fields(url = %self.url))]
    async fn exchange(
        &self,
        offer: &SessionDescription,
    ) -> Result<SessionDescription, NegotiationError> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, SDP_CONTENT_TYPE)
            .body(offer.sdp.clone())
            .send()
            .await
            .map_err(NegotiationError::RelayUnreachable)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NegotiationError::RelayStatus {
                status: status.as_u16(),
                body,
            });
        }

        let answer = response
            .text()
            .await
            .map_err(NegotiationError::RelayUnreachable)?;
        debug!(sdp_bytes = answer.len(), "Received answer from relay");
        SessionDescription::answer(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::HeaderMap, http::StatusCode, routing::post};
    use std::net::SocketAddr;

    const ANSWER: &str = "v=0\r\no=- 42 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    async fn echo_answer(headers: HeaderMap, body: String) -> (StatusCode, String) {
        let sdp_type = headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if sdp_type != SDP_CONTENT_TYPE || !body.starts_with("v=0") {
            return (StatusCode::BAD_REQUEST, "expected an SDP offer".to_string());
        }
        (StatusCode::OK, ANSWER.to_string())
    }

    #[tokio::test]
    async fn exchange_returns_answer() {
        let addr = serve(Router::new().route("/rtc-connect", post(echo_answer))).await;
        let relay = HttpRelay::new(format!("http://{}/rtc-connect", addr));

        let answer = relay
            .exchange(&SessionDescription::offer("v=0\r\ns=offer\r\n"))
            .await
            .unwrap();
        assert_eq!(answer, SessionDescription::answer(ANSWER).unwrap());
    }

    #[tokio::test]
    async fn non_success_status_fails() {
        let router = Router::new().route(
            "/rtc-connect",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream refused") }),
        );
        let addr = serve(router).await;
        let relay = HttpRelay::new(format!("http://{}/rtc-connect", addr));

        let err = relay
            .exchange(&SessionDescription::offer("v=0\r\n"))
            .await
            .unwrap_err();
        match err {
            NegotiationError::RelayStatus { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "upstream refused");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn non_sdp_body_is_malformed() {
        let router = Router::new().route("/rtc-connect", post(|| async { "<html>hello</html>" }));
        let addr = serve(router).await;
        let relay = HttpRelay::new(format!("http://{}/rtc-connect", addr));

        let err = relay
            .exchange(&SessionDescription::offer("v=0\r\n"))
            .await
            .unwrap_err();
        assert!(matches!(err, NegotiationError::MalformedAnswer(_)));
    }

    #[tokio::test]
    async fn unreachable_relay_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let relay = HttpRelay::new(format!("http://{}/rtc-connect", addr));

        let err = relay
            .exchange(&SessionDescription::offer("v=0\r\n"))
            .await
            .unwrap_err();
        assert!(matches!(err, NegotiationError::RelayUnreachable(_)));
    }
}
