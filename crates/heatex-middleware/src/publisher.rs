//! Temperature publisher.
//!
//! [`PublishClient`] pushes a reading into the hosted channel by POSTing
//! `{temp1..temp4}` to `{pubsub_url}/publish`.  The service wraps it in a
//! `temperature_message` envelope (see [`crate::protocol`]) and fans it out
//! to every subscriber, including this dashboard when it runs in realtime
//! mode.

use heatex_types::{DashboardError, Reading};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Serialize)]
struct PublishBody {
    temp1: f64,
    temp2: f64,
    temp3: f64,
    temp4: f64,
}

impl From<&Reading> for PublishBody {
    fn from(reading: &Reading) -> Self {
        let [temp1, temp2, temp3, temp4] = reading.as_array();
        Self {
            temp1,
            temp2,
            temp3,
            temp4,
        }
    }
}

/// HTTP client for the publish endpoint.  Construct once and reuse.
pub struct PublishClient {
    base_url: String,
    access_key: Option<String>,
    client: reqwest::Client,
}

impl PublishClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_key: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_access_key(mut self, access_key: impl Into<String>) -> Self {
        let key = access_key.into();
        self.access_key = (!key.is_empty()).then_some(key);
        self
    }

    /// Publish one reading to every subscriber.
    ///
    /// # Errors
    ///
    /// [`DashboardError::Config`] when no service URL is configured,
    /// [`DashboardError::Transport`] when the request fails or is rejected.
    pub async fn publish(&self, reading: &Reading) -> Result<(), DashboardError> {
        let base = self.base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(DashboardError::Config("realtime channel URL not configured".into()));
        }
        let url = format!("{base}/publish");
        let mut request = self.client.post(&url).json(&PublishBody::from(reading));
        if let Some(key) = &self.access_key {
            request = request.bearer_auth(key);
        }

        request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DashboardError::Transport(format!("publish failed: {e}")))?;
        debug!(url = %url, "reading published");
        Ok(())
    }
}
