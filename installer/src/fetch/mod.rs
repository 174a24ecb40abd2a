//! HTTP retrieval with bounded retries.
//!
//! # Sub-modules
//!
//! - [`policy`] - Backoff schedule and status classification.
//! - [`transport`] - Single-request transport trait and `ureq` implementation.

pub mod policy;
pub mod transport;

use log::warn;
use policy::{BackoffSchedule, ResponseClassifier, StatusClass};
use transport::{HttpRequest, HttpResponse, HttpTransport, TransportError, redact_query};

use crate::clock::Sleeper;

/// The outcome of a fetch: the last response and how it was classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    class: StatusClass,
    response: HttpResponse,
}

impl FetchResult {
    /// Returns the status classification.
    #[must_use]
    pub fn class(&self) -> StatusClass {
        self.class
    }

    /// Returns the HTTP status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.response.status
    }

    /// Returns true for a `200 OK` response.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.class == StatusClass::Success
    }

    /// Returns the response body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.response.body
    }

    /// Consumes the result and returns the response body.
    #[must_use]
    pub fn into_body(self) -> Vec<u8> {
        self.response.body
    }
}

/// Performs HTTP requests with a fixed retry budget.
///
/// Every attempt but the last is guarded: a retryable status or a transport
/// error is logged, followed by the throttling pause (for 500/503) and the
/// backoff delay. The final attempt's outcome is returned unchanged, whether
/// that is a failing status or a transport error.
pub struct RetryingFetcher<'a> {
    transport: &'a dyn HttpTransport,
    sleeper: &'a dyn Sleeper,
    schedule: BackoffSchedule,
    classifier: ResponseClassifier,
}

impl<'a> RetryingFetcher<'a> {
    /// Creates a fetcher with the default status classifier.
    #[must_use]
    pub fn new(
        transport: &'a dyn HttpTransport,
        sleeper: &'a dyn Sleeper,
        schedule: BackoffSchedule,
    ) -> Self {
        Self {
            transport,
            sleeper,
            schedule,
            classifier: ResponseClassifier::default(),
        }
    }

    /// Replaces the status classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: ResponseClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Sends `request` until it succeeds or the attempt budget is spent.
    ///
    /// # Errors
    ///
    /// Returns the transport error raised by the final attempt. Earlier
    /// transport errors are logged and retried.
    pub fn fetch(&self, request: &HttpRequest) -> Result<FetchResult, TransportError> {
        let attempts = self.schedule.attempts();
        for attempt in 1..attempts {
            match self.send(request) {
                Ok(response) => {
                    let class = self.classifier.classify(response.status);
                    if !class.is_retryable() {
                        return Ok(FetchResult { class, response });
                    }
                    warn!(
                        "attempt {attempt}/{attempts}: unexpected response code {} from {}",
                        response.status,
                        redact_query(&request.url)
                    );
                    let pause = self.classifier.pause_for(class);
                    if !pause.is_zero() {
                        self.sleeper.sleep(pause);
                    }
                }
                Err(err) => warn!("attempt {attempt}/{attempts}: {err}"),
            }
            self.sleeper.sleep(self.schedule.delay_for(attempt));
        }

        let response = self.send(request)?;
        let class = self.classifier.classify(response.status);
        Ok(FetchResult { class, response })
    }

    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.transport
            .send(request)
            .map_err(TransportError::redacted)
    }
}

#[cfg(test)]
#[path = "fetch_tests.rs"]
mod tests;
