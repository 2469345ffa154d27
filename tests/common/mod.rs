/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! A scripted, in-memory [`Host`] and [`Sink`] for driving the freezer
//! without a browser. Each URL gets a [`PageScript`] describing how its tab
//! loads and how the injected serializer behaves. Tests run on tokio's paused
//! clock, so scripted delays and deadlines elapse instantly and in order.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use page_freezer::{
    FreezeError, Host, HostError, MEASURE_WINDOW_SCRIPT, Sink, Tab, TabStatus, TabWatch, WatchId,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;

pub const BLANK: &str = "about:blank";
pub const PLACEHOLDER: &str = "data:text/html,placeholder";

/// How an injected script or message exchange answers.
#[derive(Debug, Clone)]
pub enum Reply {
    Value(Value),
    Fail(String),
    Hang,
}

/// One scripted change of a tab's status/address.
#[derive(Debug, Clone)]
pub struct Step {
    pub after: Duration,
    pub status: TabStatus,
    pub url: String,
    /// Whether listeners hear about it.
    pub notify: bool,
}

#[derive(Debug, Clone)]
pub struct PageScript {
    pub initial_status: TabStatus,
    pub initial_url: String,
    pub steps: Vec<Step>,
    pub inject: Reply,
    pub message: Reply,
    /// `create_tab` never returns, like a host that hands tabs back only once
    /// they have loaded, on a page whose load never finishes.
    pub hangs_on_create: bool,
}

impl PageScript {
    /// Starts on the blank page, navigates after 100 ms, completes after 300 ms,
    /// and freezes to `<html>frozen URL</html>`.
    pub fn loads(url: &str) -> Self {
        Self {
            initial_status: TabStatus::Loading,
            initial_url: BLANK.to_string(),
            steps: vec![
                step(100, TabStatus::Loading, url, true),
                step(300, TabStatus::Complete, url, true),
            ],
            inject: Reply::Value(Value::Null),
            message: Reply::Value(Value::String(document_for(url))),
            hangs_on_create: false,
        }
    }

    /// Already complete on `url` when the tab is created.
    pub fn already_complete(url: &str) -> Self {
        Self {
            initial_status: TabStatus::Complete,
            initial_url: url.to_string(),
            steps: Vec::new(),
            ..Self::loads(url)
        }
    }

    /// Complete on the blank page and never navigates.
    pub fn stuck_on_blank(url: &str) -> Self {
        Self {
            initial_status: TabStatus::Complete,
            initial_url: BLANK.to_string(),
            steps: Vec::new(),
            ..Self::loads(url)
        }
    }

    /// Starts loading `url` and never completes (e.g. a modal alert).
    pub fn never_completes(url: &str) -> Self {
        Self {
            initial_status: TabStatus::Loading,
            initial_url: url.to_string(),
            steps: Vec::new(),
            ..Self::loads(url)
        }
    }

    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_inject(mut self, reply: Reply) -> Self {
        self.inject = reply;
        self
    }

    pub fn with_message(mut self, reply: Reply) -> Self {
        self.message = reply;
        self
    }

    pub fn hanging_on_create(mut self) -> Self {
        self.hangs_on_create = true;
        self
    }
}

pub fn step(after_ms: u64, status: TabStatus, url: &str, notify: bool) -> Step {
    Step {
        after: Duration::from_millis(after_ms),
        status,
        url: url.to_string(),
        notify,
    }
}

pub fn document_for(url: &str) -> String {
    format!("<html>frozen {url}</html>")
}

#[derive(Debug, Default)]
pub struct State {
    pub scripts: HashMap<String, PageScript>,
    pub measurement: Option<Value>,
    pub fail_create_window: bool,
    pub hang_create_window: bool,
    pub fail_remove_window: bool,
    pub fail_resize: bool,

    next_id: u64,
    tabs: HashMap<u64, Tab<u64>>,
    page_tabs: Vec<u64>,
    watchers: HashMap<WatchId, (u64, mpsc::UnboundedSender<Tab<u64>>)>,

    pub events: Vec<String>,
    pub windows_created: usize,
    pub windows_removed: usize,
    pub resizes: Vec<(u32, u32)>,
    pub watches: usize,
    pub unwatches: usize,
    pub tabs_created: usize,
    pub tabs_removed: usize,
    pub max_live_page_tabs: usize,
    pub messages: Vec<Value>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn script_for(&self, url: &str) -> PageScript {
        self.scripts
            .get(url)
            .cloned()
            .unwrap_or_else(|| PageScript::loads(url))
    }

    fn tab(&self, id: u64) -> Result<Tab<u64>, HostError> {
        self.tabs
            .get(&id)
            .cloned()
            .ok_or_else(|| HostError::new(format!("no tab with id {id}")))
    }

    pub fn live_page_tabs(&self) -> usize {
        self.page_tabs.len()
    }

    pub fn live_watchers(&self) -> usize {
        self.watchers.len()
    }
}

#[derive(Clone, Default)]
pub struct FakeHost {
    state: Arc<Mutex<State>>,
    /// Script of each live page tab, by tab id.
    tab_scripts: Arc<Mutex<HashMap<u64, PageScript>>>,
}

impl FakeHost {
    pub fn new() -> Self {
        let host = Self::default();
        host.state().measurement = Some(json!({
            "outerWidth": 1040,
            "outerHeight": 900,
            "innerWidth": 1024,
            "innerHeight": 800,
        }));
        host
    }

    pub fn script(&self, url: &str, script: PageScript) -> &Self {
        self.state().scripts.insert(url.to_string(), script);
        self
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn schedule(&self, id: u64, steps: Vec<Step>) {
        for step in steps {
            let state = self.state.clone();
            tokio::spawn(async move {
                tokio::time::sleep(step.after).await;
                let mut state = state.lock().unwrap();
                let Some(tab) = state.tabs.get_mut(&id) else {
                    return;
                };
                tab.status = step.status;
                tab.url = step.url.clone();
                let tab = tab.clone();
                if step.notify {
                    for (watched, tx) in state.watchers.values() {
                        if *watched == id {
                            let _ = tx.send(tab.clone());
                        }
                    }
                }
            });
        }
    }

    fn tab_script(&self, id: u64) -> Result<PageScript, HostError> {
        self.tab_scripts
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| HostError::new(format!("no script for tab {id}")))
    }
}

async fn answer(reply: Reply) -> Result<Value, HostError> {
    match reply {
        Reply::Value(value) => Ok(value),
        Reply::Fail(msg) => Err(HostError::new(msg)),
        Reply::Hang => std::future::pending().await,
    }
}

impl Host for FakeHost {
    type WindowId = u64;
    type TabId = u64;

    async fn create_window(&self, placeholder_url: &str) -> Result<(u64, Tab<u64>), HostError> {
        let mut state = self.state();
        state.events.push("create_window".to_string());
        if state.fail_create_window {
            return Err(HostError::new("window creation refused"));
        }
        if state.hang_create_window {
            drop(state);
            return std::future::pending().await;
        }
        state.windows_created += 1;
        let window = state.next_id();
        let id = state.next_id();
        let script = state
            .scripts
            .get(placeholder_url)
            .cloned()
            .unwrap_or_else(|| PageScript::already_complete(placeholder_url));
        let tab = Tab {
            id,
            status: script.initial_status,
            url: script.initial_url.clone(),
        };
        state.tabs.insert(id, tab.clone());
        drop(state);
        self.tab_scripts.lock().unwrap().insert(id, script.clone());
        self.schedule(id, script.steps);
        Ok((window, tab))
    }

    async fn create_tab(&self, _window: &u64, url: &str) -> Result<Tab<u64>, HostError> {
        let mut state = self.state();
        state.events.push(format!("create_tab {url}"));
        state.tabs_created += 1;
        let script = state.script_for(url);
        if script.hangs_on_create {
            drop(state);
            return std::future::pending().await;
        }
        let id = state.next_id();
        let tab = Tab {
            id,
            status: script.initial_status,
            url: script.initial_url.clone(),
        };
        state.tabs.insert(id, tab.clone());
        state.page_tabs.push(id);
        state.max_live_page_tabs = state.max_live_page_tabs.max(state.page_tabs.len());
        drop(state);
        self.tab_scripts.lock().unwrap().insert(id, script.clone());
        self.schedule(id, script.steps);
        Ok(tab)
    }

    async fn get_tab(&self, tab: &u64) -> Result<Tab<u64>, HostError> {
        self.state().tab(*tab)
    }

    async fn watch_tab(&self, tab: &u64) -> Result<TabWatch<u64>, HostError> {
        let mut state = self.state();
        state.tab(*tab)?;
        state.watches += 1;
        let id = WatchId(state.next_id());
        state.events.push(format!("watch {tab}"));
        let (tx, rx) = mpsc::unbounded_channel();
        state.watchers.insert(id, (*tab, tx));
        Ok(TabWatch { id, updates: rx })
    }

    fn unwatch_tab(&self, watch: WatchId) {
        let mut state = self.state();
        if let Some((tab, _)) = state.watchers.remove(&watch) {
            state.unwatches += 1;
            state.events.push(format!("unwatch {tab}"));
        }
    }

    async fn execute_script(&self, tab: &u64, source: &str) -> Result<Value, HostError> {
        let reply = {
            let mut state = self.state();
            let current = state.tab(*tab)?;
            if current.url == BLANK {
                return Err(HostError::new("Missing host permission for the tab"));
            }
            if source == MEASURE_WINDOW_SCRIPT {
                state.events.push(format!("measure {tab}"));
                return Ok(state.measurement.clone().unwrap_or(Value::Null));
            }
            state.events.push(format!("inject {tab}"));
            drop(state);
            self.tab_script(*tab)?.inject
        };
        answer(reply).await
    }

    async fn send_message(&self, tab: &u64, message: &Value) -> Result<Value, HostError> {
        let reply = {
            let mut state = self.state();
            state.tab(*tab)?;
            state.events.push(format!("message {tab}"));
            state.messages.push(message.clone());
            drop(state);
            self.tab_script(*tab)?.message
        };
        answer(reply).await
    }

    async fn update_window(&self, _window: &u64, width: u32, height: u32) -> Result<(), HostError> {
        let mut state = self.state();
        if state.fail_resize {
            return Err(HostError::new("window is maximized"));
        }
        state.events.push(format!("resize {width}x{height}"));
        state.resizes.push((width, height));
        Ok(())
    }

    async fn remove_tab(&self, tab: &u64) -> Result<(), HostError> {
        let mut state = self.state();
        state.tab(*tab)?;
        state.events.push(format!("remove_tab {tab}"));
        state.tabs.remove(tab);
        state.page_tabs.retain(|id| id != tab);
        state.tabs_removed += 1;
        drop(state);
        self.tab_scripts.lock().unwrap().remove(tab);
        Ok(())
    }

    async fn remove_window(&self, _window: &u64) -> Result<(), HostError> {
        let mut state = self.state();
        state.events.push("remove_window".to_string());
        state.windows_removed += 1;
        if state.fail_remove_window {
            return Err(HostError::new("No window with id"));
        }
        state.tabs.clear();
        state.page_tabs.clear();
        Ok(())
    }
}

/// Keeps documents in memory.
#[derive(Clone, Default)]
pub struct MemorySink {
    pub stored: Arc<Mutex<Vec<(usize, String, String)>>>,
    pub fail_for: Option<String>,
}

impl MemorySink {
    pub fn failing_for(url: &str) -> Self {
        Self {
            fail_for: Some(url.to_string()),
            ..Self::default()
        }
    }

    pub fn stored(&self) -> Vec<(usize, String, String)> {
        self.stored.lock().unwrap().clone()
    }
}

impl Sink for MemorySink {
    async fn store(&self, index: usize, url: &str, document: &str) -> Result<String, FreezeError> {
        if self.fail_for.as_deref() == Some(url) {
            return Err(FreezeError::Persistence("disk full".to_string()));
        }
        self.stored
            .lock()
            .unwrap()
            .push((index, url.to_string(), document.to_string()));
        Ok(format!("memory:{index}"))
    }
}
