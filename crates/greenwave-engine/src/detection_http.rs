//! HTTP detection source: polls a detector sidecar for object summaries.
//!
//! [`HttpDetectionSource`] implements the [`DetectionSource`] trait by
//! issuing a blocking `GET` against a detector endpoint that serves a
//! JSON array of detected-object summaries. It is driven by the detect
//! crate's poll loop, which runs on a dedicated blocking thread -- the
//! HTTP client is therefore built lazily on that thread, never on the
//! async runtime.

use std::time::Duration;

use greenwave_detect::{DetectionError, DetectionSource};
use greenwave_types::DetectedObject;

/// Detection source backed by an HTTP detector endpoint.
pub struct HttpDetectionSource {
    url: String,
    timeout: Duration,
    client: Option<reqwest::blocking::Client>,
}

impl HttpDetectionSource {
    /// Create a source for the given endpoint URL.
    ///
    /// The request timeout bounds each poll; an expired poll is logged by
    /// the poll loop and the feed keeps its last known value.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            client: None,
        }
    }

    /// The HTTP client, built on first use (on the poll thread).
    fn client(&mut self) -> Result<&reqwest::blocking::Client, DetectionError> {
        if self.client.is_none() {
            let client = reqwest::blocking::Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| DetectionError::Source {
                    message: format!("failed to build HTTP client: {e}"),
                })?;
            self.client = Some(client);
        }
        self.client.as_ref().ok_or_else(|| DetectionError::Source {
            message: String::from("HTTP client unavailable"),
        })
    }
}

impl DetectionSource for HttpDetectionSource {
    fn fetch(&mut self) -> Result<Vec<DetectedObject>, DetectionError> {
        let url = self.url.clone();
        let response = self
            .client()?
            .get(&url)
            .send()
            .map_err(|e| DetectionError::Source {
                message: format!("GET {url} failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DetectionError::Source {
                message: format!("detector returned {status}"),
            });
        }

        response
            .json::<Vec<DetectedObject>>()
            .map_err(|e| DetectionError::Decode {
                message: format!("malformed detection payload: {e}"),
            })
    }
}
