//! External hand actuator behind the `showFingers` tool.

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, instrument};

/// The highest finger count a hand can show.
pub const MAX_FINGERS: u8 = 5;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HandActuator: Send + Sync {
    /// Raises `count` fingers, resolving once the hand has acknowledged.
    async fn show_fingers(&self, count: u8) -> anyhow::Result<()>;
}

#[derive(Serialize)]
struct FingerCommand {
    fingers: u8,
}

/// A hand controller reachable over HTTP that accepts `{"fingers": n}`.
#[derive(Clone, Debug)]
pub struct HttpHand {
    client: reqwest::Client,
    url: String,
}

impl HttpHand {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl HandActuator for HttpHand {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn show_fingers(&self, count: u8) -> anyhow::Result<()> {
        self.client
            .post(&self.url)
            .json(&FingerCommand { fingers: count })
            .send()
            .await
            .context("Hand controller unreachable")?
            .error_for_status()
            .context("Hand controller rejected the command")?;
        debug!("Hand acknowledged");
        Ok(())
    }
}
