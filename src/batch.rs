/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Running a batch of pages through one capture window.

use log::{debug, info, warn};
use tokio::time::timeout;

use crate::host::Host;
use crate::readiness::await_ready;
use crate::scripts::DEFAULT_SERIALIZER_SCRIPT;
use crate::sink::Sink;
use crate::types::{
    BatchReport, BatchSettings, CaptureOutcome, FreezeError, FreezeOptions, Tab, error_line,
};
use crate::viewport::set_viewport_size;

/// Split newline-delimited input into page addresses, dropping blank lines.
pub fn parse_page_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Receives batch progress: the error panel and the trigger control.
pub trait Reporter {
    /// Clear previous errors and disable the trigger.
    fn batch_started(&mut self) {}

    fn page_failed(&mut self, url: &str, error: &FreezeError);

    fn page_frozen(&mut self, _url: &str, _location: &str) {}

    /// Re-enable the trigger. Called once per batch, whatever happened.
    fn batch_finished(&mut self, _report: &BatchReport) {}
}

/// In-memory error panel plus the enabled state of the trigger.
#[derive(Debug, Clone)]
pub struct ErrorPanel {
    pub lines: Vec<String>,
    pub trigger_enabled: bool,
}

impl Default for ErrorPanel {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            trigger_enabled: true,
        }
    }
}

impl Reporter for ErrorPanel {
    fn batch_started(&mut self) {
        self.lines.clear();
        self.trigger_enabled = false;
    }

    fn page_failed(&mut self, url: &str, error: &FreezeError) {
        self.lines.push(error_line(url, error));
    }

    fn batch_finished(&mut self, _report: &BatchReport) {
        self.trigger_enabled = true;
    }
}

/// Freezes pages one at a time inside a host-controlled window.
pub struct Freezer<H, S> {
    pub(crate) host: H,
    pub(crate) sink: S,
    pub(crate) settings: BatchSettings,
    pub(crate) serializer: String,
}

impl<H: Host, S: Sink> Freezer<H, S> {
    /// Create a freezer using the built-in serializer.
    pub fn new(host: H, sink: S, settings: BatchSettings) -> Self {
        Self {
            host,
            sink,
            settings,
            serializer: DEFAULT_SERIALIZER_SCRIPT.to_string(),
        }
    }

    /// Inject `source` instead of the built-in serializer.
    pub fn with_serializer(mut self, source: impl Into<String>) -> Self {
        self.serializer = source.into();
        self
    }

    pub fn into_host(self) -> H {
        self.host
    }

    /// Freeze every page in `urls`, strictly in order.
    ///
    /// Never fails: every page yields exactly one outcome, in input order,
    /// and a failing page does not stop the pages after it. The capture
    /// window is removed once at the end; errors doing so are ignored.
    pub async fn freeze_all<R: Reporter>(
        &self,
        urls: &[String],
        options: &FreezeOptions,
        reporter: &mut R,
    ) -> BatchReport {
        reporter.batch_started();
        info!("Freezing {} page(s)", urls.len());

        let response_timeout = self.settings.response_timeout;
        let created = match timeout(
            response_timeout,
            self.host.create_window(&self.settings.placeholder_url),
        )
        .await
        {
            Ok(created) => created.map_err(|e| FreezeError::Environment(e.to_string())),
            Err(_) => Err(FreezeError::Environment(format!(
                "no window after {response_timeout:?}"
            ))),
        };

        let report = match created {
            Ok((window, placeholder)) => {
                let report = self
                    .freeze_in_window(&window, placeholder, urls, options, reporter)
                    .await;
                self.close_window(&window).await;
                report
            }
            Err(error) => fail_all(urls, &error, reporter),
        };

        info!(
            "Froze {} of {} page(s)",
            report.frozen_count(),
            report.outcomes.len()
        );
        reporter.batch_finished(&report);
        report
    }

    async fn freeze_in_window<R: Reporter>(
        &self,
        window: &H::WindowId,
        placeholder: Tab<H::TabId>,
        urls: &[String],
        options: &FreezeOptions,
        reporter: &mut R,
    ) -> BatchReport {
        // Nothing can be injected until the placeholder has loaded.
        let placeholder = match await_ready(
            &self.host,
            placeholder,
            &self.settings.blank_url,
            self.settings.ready_timeout,
        )
        .await
        {
            Ok(tab) => tab,
            Err(e) => {
                let error = FreezeError::Environment(e.to_string());
                return fail_all(urls, &error, reporter);
            }
        };

        if let Err(e) = set_viewport_size(
            &self.host,
            window,
            &placeholder,
            self.settings.viewport_width,
            self.settings.viewport_height,
        )
        .await
        {
            warn!("Continuing at the current window size: {e}");
        }

        let mut report = BatchReport::default();
        for (index, url) in urls.iter().enumerate() {
            let outcome = match self.freeze_page(window, index, url, options).await {
                Ok((document, location)) => {
                    debug!("Froze {url} to {location}");
                    reporter.page_frozen(url, &location);
                    CaptureOutcome::Frozen {
                        url: url.clone(),
                        document,
                        location,
                    }
                }
                Err(error) => {
                    debug!("{}", error_line(url, &error));
                    reporter.page_failed(url, &error);
                    CaptureOutcome::Failed {
                        url: url.clone(),
                        error,
                    }
                }
            };
            report.outcomes.push(outcome);
        }
        report
    }

    async fn close_window(&self, window: &H::WindowId) {
        // The user may already have closed it.
        if let Err(e) = self.host.remove_window(window).await {
            warn!("Ignoring failure to close capture window {window:?}: {e}");
        }
    }
}

fn fail_all<R: Reporter>(urls: &[String], error: &FreezeError, reporter: &mut R) -> BatchReport {
    let outcomes = urls
        .iter()
        .map(|url| {
            reporter.page_failed(url, error);
            CaptureOutcome::Failed {
                url: url.clone(),
                error: error.clone(),
            }
        })
        .collect();
    BatchReport { outcomes }
}
