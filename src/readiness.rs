/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Waiting for a tab to finish loading a real page.

use std::time::Duration;

use log::debug;
use tokio::time::{Instant, sleep_until};

use crate::host::{Host, TabWatch};
use crate::types::{FreezeError, Tab};

/// Unregisters its listener when dropped, so every exit path (including a
/// cancelled future) removes exactly the listener it added.
struct WatchGuard<'a, H: Host> {
    host: &'a H,
    watch: TabWatch<H::TabId>,
}

impl<H: Host> Drop for WatchGuard<'_, H> {
    fn drop(&mut self) {
        self.host.unwatch_tab(self.watch.id);
    }
}

/// Wait until `tab` is complete on an address other than `blank_url`.
///
/// New tabs report "complete" on the blank page before navigation to the
/// requested address begins, so that state does not count. A tab that is
/// already complete resolves without registering a listener. Otherwise the
/// first qualifying update wins; if `timeout` elapses first, the tab is
/// checked once more (it may have completed between the first check and the
/// listener registration) before giving up with
/// [`FreezeError::ReadinessTimeout`].
pub async fn await_ready<H: Host>(
    host: &H,
    tab: Tab<H::TabId>,
    blank_url: &str,
    timeout: Duration,
) -> Result<Tab<H::TabId>, FreezeError> {
    if tab.is_complete(blank_url) {
        return Ok(tab);
    }

    let deadline = Instant::now() + timeout;
    let mut guard = WatchGuard {
        host,
        watch: host.watch_tab(&tab.id).await?,
    };
    debug!("Watching tab {:?} ({} on {})", tab.id, tab.status, tab.url);

    let mut last = tab;
    let mut listening = true;
    while listening {
        tokio::select! {
            update = guard.watch.updates.recv() => match update {
                Some(update) if update.id == last.id => {
                    if update.is_complete(blank_url) {
                        return Ok(update);
                    }
                    last = update;
                }
                Some(_) => {}
                // The host dropped the listener; only the deadline is left.
                None => {
                    sleep_until(deadline).await;
                    listening = false;
                }
            },
            () = sleep_until(deadline) => listening = false,
        }
    }
    drop(guard);

    match host.get_tab(&last.id).await {
        Ok(fresh) if fresh.is_complete(blank_url) => {
            debug!("Tab {:?} completed just before the deadline", fresh.id);
            Ok(fresh)
        }
        Ok(fresh) => Err(FreezeError::ReadinessTimeout {
            status: fresh.status,
            url: fresh.url,
        }),
        Err(_) => Err(FreezeError::ReadinessTimeout {
            status: last.status,
            url: last.url,
        }),
    }
}
