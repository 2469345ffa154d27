/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The browsing host: windows, tabs, injection and messaging.
//!
//! Everything the capture core needs from a browser goes through [`Host`].
//! [`ChromeHost`](crate::ChromeHost) drives a real Chromium; tests drive a
//! scripted in-memory host.

use std::fmt;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::types::{HostError, Tab};

/// Identifies one registered tab-update listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// A registered listener: the host pushes a fresh [`Tab`] snapshot whenever
/// the watched tab's status or address changes.
pub struct TabWatch<T> {
    pub id: WatchId,
    pub updates: mpsc::UnboundedReceiver<Tab<T>>,
}

#[allow(async_fn_in_trait)]
pub trait Host {
    type WindowId: Clone + fmt::Debug;
    type TabId: Clone + PartialEq + fmt::Debug;

    /// Open a new window showing `placeholder_url`, returning it and its only tab.
    async fn create_window(
        &self,
        placeholder_url: &str,
    ) -> Result<(Self::WindowId, Tab<Self::TabId>), HostError>;

    /// Open a new tab in `window`, navigating immediately to `url`.
    async fn create_tab(
        &self,
        window: &Self::WindowId,
        url: &str,
    ) -> Result<Tab<Self::TabId>, HostError>;

    /// Fresh snapshot of a tab.
    async fn get_tab(&self, tab: &Self::TabId) -> Result<Tab<Self::TabId>, HostError>;

    /// Register a listener for updates of `tab`.
    async fn watch_tab(&self, tab: &Self::TabId) -> Result<TabWatch<Self::TabId>, HostError>;

    /// Unregister a listener. Unknown ids are ignored.
    fn unwatch_tab(&self, watch: WatchId);

    /// Run a script in the tab, returning its completion value.
    async fn execute_script(&self, tab: &Self::TabId, source: &str) -> Result<Value, HostError>;

    /// Send one message to the script injected into the tab and await its reply.
    async fn send_message(&self, tab: &Self::TabId, message: &Value) -> Result<Value, HostError>;

    /// Resize the window's outer frame.
    async fn update_window(
        &self,
        window: &Self::WindowId,
        width: u32,
        height: u32,
    ) -> Result<(), HostError>;

    async fn remove_tab(&self, tab: &Self::TabId) -> Result<(), HostError>;

    async fn remove_window(&self, window: &Self::WindowId) -> Result<(), HostError>;
}
