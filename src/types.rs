/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Shared public types used across all layers.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Options forwarded to the in-page serializer, shared by every page of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FreezeOptions {
    /// Maximum time in seconds the serializer may wait for the page to settle.
    pub wait: f64,
    /// Scroll through the page first, to trigger lazy-loaded content.
    pub should_scroll: bool,
}

impl FreezeOptions {
    /// Build options, rejecting a negative or non-finite `wait`.
    pub fn new(wait: f64, should_scroll: bool) -> Result<Self, FreezeError> {
        if !wait.is_finite() || wait < 0.0 {
            return Err(FreezeError::InvalidOptions(format!(
                "wait must be a non-negative number of seconds, got {wait}"
            )));
        }
        Ok(Self {
            wait,
            should_scroll,
        })
    }
}

impl Default for FreezeOptions {
    fn default() -> Self {
        Self {
            wait: 2.0,
            should_scroll: false,
        }
    }
}

/// The one request shape the injected serializer understands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FreezeRequest {
    Freeze { options: FreezeOptions },
}

/// Settings for a batch that are not forwarded to the page.
#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// Content-area width in pixels (default: 1024).
    pub viewport_width: u32,
    /// Content-area height in pixels (default: 768).
    pub viewport_height: u32,
    /// Page shown in a fresh window before any real page loads.
    pub placeholder_url: String,
    /// Address a freshly created tab shows before navigation starts (default: `about:blank`).
    pub blank_url: String,
    /// How long to wait for a tab to finish loading (default: 5 s).
    pub ready_timeout: Duration,
    /// Extra time allowed for injection and for the serializer's reply, on
    /// top of [`FreezeOptions::wait`] (default: 30 s).
    pub response_timeout: Duration,
}

pub const DEFAULT_PLACEHOLDER_URL: &str =
    "data:text/html,<!DOCTYPE html><html><head><title>Freezing...</title></head><body></body></html>";

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            viewport_width: 1024,
            viewport_height: 768,
            placeholder_url: DEFAULT_PLACEHOLDER_URL.to_string(),
            blank_url: "about:blank".to_string(),
            ready_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(30),
        }
    }
}

/// Load status of a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabStatus {
    Loading,
    Complete,
}

impl fmt::Display for TabStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TabStatus::Loading => f.write_str("loading"),
            TabStatus::Complete => f.write_str("complete"),
        }
    }
}

/// A snapshot of a tab as last reported by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Tab<T> {
    pub id: T,
    pub status: TabStatus,
    pub url: String,
}

impl<T> Tab<T> {
    /// Finished loading a real page, not the transient blank page every new tab starts on.
    pub fn is_complete(&self, blank_url: &str) -> bool {
        self.status == TabStatus::Complete && self.url != blank_url
    }
}

/// Window dimensions reported by the measurement script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowMeasurement {
    pub outer_width: u32,
    pub outer_height: u32,
    pub inner_width: u32,
    pub inner_height: u32,
}

impl WindowMeasurement {
    /// Outer window size whose content area is `width` x `height`.
    pub fn outer_size_for(&self, width: u32, height: u32) -> (u32, u32) {
        (
            self.outer_width.saturating_sub(self.inner_width) + width,
            self.outer_height.saturating_sub(self.inner_height) + height,
        )
    }
}

/// What happened to one requested page.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Frozen {
        url: String,
        document: String,
        /// Where the sink put the document.
        location: String,
    },
    Failed {
        url: String,
        error: FreezeError,
    },
}

impl CaptureOutcome {
    pub fn url(&self) -> &str {
        match self {
            CaptureOutcome::Frozen { url, .. } | CaptureOutcome::Failed { url, .. } => url,
        }
    }

    pub fn is_frozen(&self) -> bool {
        matches!(self, CaptureOutcome::Frozen { .. })
    }
}

/// Outcomes of a batch, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub outcomes: Vec<CaptureOutcome>,
}

impl BatchReport {
    pub fn frozen_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_frozen()).count()
    }

    /// `(url, error)` for every failed page, in input order.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &FreezeError)> {
        self.outcomes.iter().filter_map(|o| match o {
            CaptureOutcome::Failed { url, error } => Some((url.as_str(), error)),
            CaptureOutcome::Frozen { .. } => None,
        })
    }

    /// The lines shown in the error panel.
    pub fn error_lines(&self) -> Vec<String> {
        self.failures()
            .map(|(url, error)| error_line(url, error))
            .collect()
    }
}

/// Format the human-readable report line for a failed page.
pub fn error_line(url: &str, error: &FreezeError) -> String {
    format!("Error while freezing {url}: {error}")
}

/// An error reported by the browsing host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostError(pub String);

impl HostError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for HostError {}

/// Errors that can occur while freezing a page.
#[derive(Debug, Clone, PartialEq)]
pub enum FreezeError {
    /// Options supplied by the user are unusable.
    InvalidOptions(String),
    /// The requested address is not a URL.
    InvalidUrl(String),
    /// The capture window could not be set up.
    Environment(String),
    /// The tab never finished loading a real page.
    ReadinessTimeout { status: TabStatus, url: String },
    /// The serializer could not be injected.
    InjectionRejected(String),
    /// No usable reply came back from the serializer.
    MessagingFailure(String),
    /// The window could not be measured or resized.
    Measurement(String),
    /// The sink could not store the document.
    Persistence(String),
    /// Any other host call failed.
    Host(HostError),
}

impl FreezeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FreezeError::ReadinessTimeout { .. })
    }
}

impl fmt::Display for FreezeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FreezeError::InvalidOptions(msg) => write!(f, "invalid options: {msg}"),
            FreezeError::InvalidUrl(msg) => write!(f, "invalid URL: {msg}"),
            FreezeError::Environment(msg) => write!(f, "capture window unavailable: {msg}"),
            FreezeError::ReadinessTimeout { status, url } => write!(
                f,
                "Timeout: tab never reached the \"complete\" state, just {status} on {url}"
            ),
            FreezeError::InjectionRejected(msg) => write!(f, "script injection failed: {msg}"),
            FreezeError::MessagingFailure(msg) => write!(f, "no usable reply from serializer: {msg}"),
            FreezeError::Measurement(msg) => write!(f, "window measurement failed: {msg}"),
            FreezeError::Persistence(msg) => write!(f, "could not save document: {msg}"),
            FreezeError::Host(e) => write!(f, "host error: {e}"),
        }
    }
}

impl std::error::Error for FreezeError {}

impl From<HostError> for FreezeError {
    fn from(e: HostError) -> Self {
        FreezeError::Host(e)
    }
}
