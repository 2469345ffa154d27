/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! [`ChromeHost`]: a [`Host`] driving Chromium over the DevTools protocol.
//!
//! Each capture window is its own browser context, so removing the window
//! disposes every tab opened in it. Tab updates are derived from load and
//! navigation events; the load status comes from `document.readyState`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    Bounds, BrowserContextId, GetWindowForTargetParams, SetWindowBoundsParams, WindowState,
};
use chromiumoxide::cdp::browser_protocol::page::{EventFrameNavigated, EventLoadEventFired};
use chromiumoxide::cdp::browser_protocol::target::{
    CloseTargetParams, CreateBrowserContextParams, CreateTargetParams,
    DisposeBrowserContextParams, TargetId,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::host::{Host, TabWatch, WatchId};
use crate::scripts::MESSAGE_HANDLER;
use crate::types::{HostError, Tab, TabStatus};

/// `document.readyState` blocks while a modal dialog is open.
const STATUS_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Tabs open here and navigate from a script, so creating one never waits
/// for the real page to load.
const BLANK_URL: &str = "about:blank";

/// Every DevTools command is cut off after 30 s, so a long serializer run is
/// awaited by polling instead of in one evaluation.
const REPLY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Global the pending serializer reply is parked under between polls.
const REPLY_SLOT: &str = "__pageFreezerReply";

/// Options for launching the browser.
#[derive(Debug, Clone)]
pub struct ChromeOptions {
    /// Run without a visible window (default: true).
    pub headless: bool,
    /// Chrome/Chromium binary; found on `PATH` when unset.
    pub executable: Option<PathBuf>,
    /// Initial window width in pixels (default: 1024).
    pub width: u32,
    /// Initial window height in pixels (default: 768).
    pub height: u32,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            width: 1024,
            height: 768,
        }
    }
}

/// A capture window: a browser context plus the tab it was opened with.
#[derive(Debug, Clone)]
pub struct ChromeWindow {
    context: BrowserContextId,
    anchor: TargetId,
}

struct OpenTab {
    page: Page,
    context: BrowserContextId,
}

pub struct ChromeHost {
    browser: Browser,
    handler_task: JoinHandle<()>,
    tabs: Mutex<HashMap<String, OpenTab>>,
    watches: Mutex<HashMap<WatchId, JoinHandle<()>>>,
    next_watch: AtomicU64,
}

fn cdp_error(context: &'static str) -> impl FnOnce(CdpError) -> HostError {
    move |e| HostError(format!("{context}: {e}"))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn evaluate_params(expression: String) -> Result<EvaluateParams, HostError> {
    EvaluateParams::builder()
        .expression(expression)
        .await_promise(true)
        .return_by_value(true)
        .build()
        .map_err(HostError)
}

async fn snapshot(page: &Page) -> Result<Tab<TargetId>, HostError> {
    let url = page
        .url()
        .await
        .map_err(cdp_error("reading tab address"))?
        .unwrap_or_default();
    let status = match timeout(STATUS_PROBE_TIMEOUT, page.evaluate("document.readyState")).await {
        Ok(Ok(result)) if result.value().and_then(Value::as_str) == Some("complete") => {
            TabStatus::Complete
        }
        _ => TabStatus::Loading,
    };
    Ok(Tab {
        id: page.target_id().clone(),
        status,
        url,
    })
}

impl ChromeHost {
    /// Launch a browser process.
    pub async fn launch(options: &ChromeOptions) -> Result<Self, HostError> {
        let mut builder = BrowserConfig::builder().window_size(options.width, options.height);
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &options.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(HostError)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(cdp_error("launching browser"))?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser event error: {e}");
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
            tabs: Mutex::new(HashMap::new()),
            watches: Mutex::new(HashMap::new()),
            next_watch: AtomicU64::new(1),
        })
    }

    /// Shut the browser down.
    pub async fn close(mut self) -> Result<(), HostError> {
        for (_, task) in lock(&self.watches).drain() {
            task.abort();
        }
        let closed = self.browser.close().await.map(|_| ());
        if let Err(e) = self.browser.wait().await {
            warn!("Browser process did not exit cleanly: {e}");
        }
        self.handler_task.abort();
        closed.map_err(cdp_error("closing browser"))
    }

    fn page(&self, tab: &TargetId) -> Result<Page, HostError> {
        lock(&self.tabs)
            .get(tab.as_ref())
            .map(|open| open.page.clone())
            .ok_or_else(|| HostError(format!("no such tab: {}", tab.as_ref())))
    }

    /// `new_page` resolves only once the page has loaded, so callers pass a
    /// page that cannot hang.
    async fn open_page(&self, params: CreateTargetParams) -> Result<Page, HostError> {
        let context = params.browser_context_id.clone().ok_or_else(|| {
            HostError::new("tabs must be opened inside a capture window")
        })?;
        let page = self
            .browser
            .new_page(params)
            .await
            .map_err(cdp_error("opening tab"))?;
        lock(&self.tabs).insert(
            page.target_id().as_ref().to_string(),
            OpenTab {
                page: page.clone(),
                context,
            },
        );
        Ok(page)
    }

    async fn close_target(&self, tab: &TargetId) -> Result<(), HostError> {
        self.browser
            .execute(CloseTargetParams::new(tab.clone()))
            .await
            .map_err(cdp_error("closing tab"))?;
        lock(&self.tabs).remove(tab.as_ref());
        Ok(())
    }
}

/// Outcome of one poll of the parked serializer reply.
#[derive(Debug, Deserialize)]
struct ReplyState {
    done: bool,
    #[serde(default)]
    value: Value,
    error: Option<String>,
}

/// `None` while the serializer is still running.
fn settled_reply(poll: Value) -> Result<Option<Value>, HostError> {
    let state: ReplyState = serde_json::from_value(poll)
        .map_err(|e| HostError(format!("unexpected reply state: {e}")))?;
    match (state.done, state.error) {
        (false, _) => Ok(None),
        (true, Some(error)) => Err(HostError(error)),
        (true, None) => Ok(Some(state.value)),
    }
}

fn start_message_script(message: &Value) -> String {
    format!(
        "(() => {{ \
            const handler = globalThis.{MESSAGE_HANDLER}; \
            if (typeof handler !== 'function') {{ \
                throw new Error('No matching message handler'); \
            }} \
            const slot = {{ done: false }}; \
            globalThis.{REPLY_SLOT} = slot; \
            Promise.resolve() \
                .then(() => handler({message})) \
                .then( \
                    (value) => {{ slot.done = true; slot.value = value === undefined ? null : value; }}, \
                    (error) => {{ slot.done = true; slot.error = String((error && error.message) || error); }}, \
                ); \
            return true; \
        }})()"
    )
}

fn poll_reply_script() -> String {
    format!(
        "(() => {{ \
            const slot = globalThis.{REPLY_SLOT}; \
            if (!slot) {{ \
                throw new Error('The page navigated away before replying'); \
            }} \
            return slot; \
        }})()"
    )
}

impl Host for ChromeHost {
    type WindowId = ChromeWindow;
    type TabId = TargetId;

    async fn create_window(
        &self,
        placeholder_url: &str,
    ) -> Result<(ChromeWindow, Tab<TargetId>), HostError> {
        let context = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(cdp_error("creating browser context"))?
            .result
            .browser_context_id;
        let params = CreateTargetParams::builder()
            .url(placeholder_url)
            .browser_context_id(context.clone())
            .new_window(true)
            .build()
            .map_err(HostError)?;
        let page = self.open_page(params).await?;
        let tab = snapshot(&page).await?;
        let window = ChromeWindow {
            context,
            anchor: tab.id.clone(),
        };
        Ok((window, tab))
    }

    async fn create_tab(&self, window: &ChromeWindow, url: &str) -> Result<Tab<TargetId>, HostError> {
        let params = CreateTargetParams::builder()
            .url(BLANK_URL)
            .browser_context_id(window.context.clone())
            .build()
            .map_err(HostError)?;
        let page = self.open_page(params).await?;

        // `Page.navigate` would be tracked until the load event; assigning
        // the location returns as soon as navigation starts.
        let target = serde_json::to_string(url).map_err(|e| HostError(e.to_string()))?;
        let navigate = evaluate_params(format!("location.href = {target}"))?;
        if let Err(e) = page.evaluate_expression(navigate).await {
            let id = page.target_id().clone();
            if let Err(close) = self.close_target(&id).await {
                warn!("Failed to close tab {id:?} after a failed navigation: {close}");
            }
            return Err(cdp_error("navigating tab")(e));
        }
        snapshot(&page).await
    }

    async fn get_tab(&self, tab: &TargetId) -> Result<Tab<TargetId>, HostError> {
        snapshot(&self.page(tab)?).await
    }

    async fn watch_tab(&self, tab: &TargetId) -> Result<TabWatch<TargetId>, HostError> {
        let page = self.page(tab)?;
        let mut loads = page
            .event_listener::<EventLoadEventFired>()
            .await
            .map_err(cdp_error("listening for loads"))?;
        let mut navigations = page
            .event_listener::<EventFrameNavigated>()
            .await
            .map_err(cdp_error("listening for navigations"))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            loop {
                let fired = tokio::select! {
                    event = loads.next() => event.is_some(),
                    event = navigations.next() => event.is_some(),
                };
                if !fired {
                    break;
                }
                match snapshot(&page).await {
                    Ok(tab) => {
                        if tx.send(tab).is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!("Skipping tab update: {e}"),
                }
            }
        });

        let id = WatchId(self.next_watch.fetch_add(1, Ordering::Relaxed));
        lock(&self.watches).insert(id, task);
        Ok(TabWatch { id, updates: rx })
    }

    fn unwatch_tab(&self, watch: WatchId) {
        if let Some(task) = lock(&self.watches).remove(&watch) {
            task.abort();
        }
    }

    async fn execute_script(&self, tab: &TargetId, source: &str) -> Result<Value, HostError> {
        let page = self.page(tab)?;
        let result = page
            .evaluate_expression(evaluate_params(source.to_string())?)
            .await
            .map_err(cdp_error("injecting script"))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    /// Starts the handler, then polls for its reply until it settles. The
    /// caller bounds the overall wait.
    async fn send_message(&self, tab: &TargetId, message: &Value) -> Result<Value, HostError> {
        let page = self.page(tab)?;
        page.evaluate_expression(evaluate_params(start_message_script(message))?)
            .await
            .map_err(cdp_error("sending message"))?;

        loop {
            tokio::time::sleep(REPLY_POLL_INTERVAL).await;
            let poll = page
                .evaluate_expression(evaluate_params(poll_reply_script())?)
                .await
                .map_err(cdp_error("awaiting reply"))?;
            if let Some(reply) = settled_reply(poll.value().cloned().unwrap_or(Value::Null))? {
                return Ok(reply);
            }
        }
    }

    async fn update_window(
        &self,
        window: &ChromeWindow,
        width: u32,
        height: u32,
    ) -> Result<(), HostError> {
        let page = self.page(&window.anchor)?;
        let found = page
            .execute(
                GetWindowForTargetParams::builder()
                    .target_id(window.anchor.clone())
                    .build(),
            )
            .await
            .map_err(cdp_error("finding window"))?;
        let bounds = Bounds::builder()
            .width(i64::from(width))
            .height(i64::from(height))
            .window_state(WindowState::Normal)
            .build();
        page.execute(SetWindowBoundsParams::new(found.result.window_id.clone(), bounds))
            .await
            .map_err(cdp_error("resizing window"))?;
        Ok(())
    }

    /// Closes the target without running `beforeunload` handlers, which
    /// could stall behind a dialog.
    async fn remove_tab(&self, tab: &TargetId) -> Result<(), HostError> {
        self.page(tab)?;
        self.close_target(tab).await
    }

    async fn remove_window(&self, window: &ChromeWindow) -> Result<(), HostError> {
        lock(&self.tabs).retain(|_, open| open.context != window.context);
        self.browser
            .execute(DisposeBrowserContextParams::new(window.context.clone()))
            .await
            .map_err(cdp_error("disposing browser context"))?;
        Ok(())
    }
}
