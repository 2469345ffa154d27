/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Freezing a single page: open, wait, inject, ask, store, close.

use std::time::Duration;

use log::{debug, warn};
use serde_json::Value;
use tokio::time::timeout;
use url::Url;

use crate::batch::Freezer;
use crate::host::Host;
use crate::readiness::await_ready;
use crate::sink::Sink;
use crate::types::{FreezeError, FreezeOptions, FreezeRequest, Tab, TabStatus};

impl<H: Host, S: Sink> Freezer<H, S> {
    /// Freeze `url` in a fresh tab of `window`, returning the document and
    /// where the sink stored it.
    ///
    /// The tab is removed before returning, whether or not the page froze.
    /// Opening the tab is bounded by the readiness deadline too, for hosts
    /// that only hand a tab back once it has loaded.
    /// Redirects and modal dialogs usually surface here as a readiness
    /// timeout or a messaging failure.
    pub async fn freeze_page(
        &self,
        window: &H::WindowId,
        index: usize,
        url: &str,
        options: &FreezeOptions,
    ) -> Result<(String, String), FreezeError> {
        Url::parse(url).map_err(|e| FreezeError::InvalidUrl(format!("{url}: {e}")))?;

        let tab = match timeout(self.settings.ready_timeout, self.host.create_tab(window, url)).await
        {
            Ok(tab) => tab?,
            // Anything the host left behind goes with the window.
            Err(_) => {
                return Err(FreezeError::ReadinessTimeout {
                    status: TabStatus::Loading,
                    url: url.to_string(),
                });
            }
        };
        debug!("Opened tab {:?} for {url}", tab.id);
        let tab_id = tab.id.clone();

        let result = self.freeze_tab(tab, index, url, options).await;

        if let Err(e) = self.host.remove_tab(&tab_id).await {
            warn!("Failed to close tab {tab_id:?} for {url}: {e}");
        }
        result
    }

    async fn freeze_tab(
        &self,
        tab: Tab<H::TabId>,
        index: usize,
        url: &str,
        options: &FreezeOptions,
    ) -> Result<(String, String), FreezeError> {
        let tab = await_ready(
            &self.host,
            tab,
            &self.settings.blank_url,
            self.settings.ready_timeout,
        )
        .await?;
        if tab.url != url {
            debug!("{url} settled on {}", tab.url);
        }

        let response_timeout = self.settings.response_timeout;
        match timeout(
            response_timeout,
            self.host.execute_script(&tab.id, &self.serializer),
        )
        .await
        {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(FreezeError::InjectionRejected(e.to_string())),
            Err(_) => {
                return Err(FreezeError::InjectionRejected(format!(
                    "no answer after {response_timeout:?}"
                )));
            }
        }

        let request = serde_json::to_value(FreezeRequest::Freeze { options: *options })
            .map_err(|e| FreezeError::MessagingFailure(format!("unencodable request: {e}")))?;
        let reply_timeout =
            response_timeout + Duration::try_from_secs_f64(options.wait).unwrap_or_default();
        let reply = match timeout(reply_timeout, self.host.send_message(&tab.id, &request)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(FreezeError::MessagingFailure(e.to_string())),
            Err(_) => {
                return Err(FreezeError::MessagingFailure(format!(
                    "no reply after {reply_timeout:?}"
                )));
            }
        };

        let document = match reply {
            Value::String(document) => document,
            Value::Null => return Err(FreezeError::MessagingFailure("empty reply".to_string())),
            other => {
                return Err(FreezeError::MessagingFailure(format!(
                    "expected a document, got {}",
                    json_kind(&other)
                )));
            }
        };

        let location = self.sink.store(index, url, &document).await?;
        Ok((document, location))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
