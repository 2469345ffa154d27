/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Freeze a batch of web pages into self-contained documents, one at a time.
//!
//! A [`Freezer`] opens one capture window, sizes its content area, then for
//! each address opens a tab, waits for it to finish loading, injects a
//! serializer script, asks it for the document over a single message
//! exchange, hands the document to a [`Sink`], and closes the tab. A failing
//! page is recorded and the batch moves on; the window is removed at the end.
//!
//! The browser sits behind the [`Host`] trait. [`ChromeHost`] drives a real
//! Chromium over the DevTools protocol.
//!
//! # Example
//!
//! ```no_run
//! use page_freezer::{
//!     BatchSettings, ChromeHost, ChromeOptions, ErrorPanel, FileSink, FreezeOptions, Freezer,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let host = ChromeHost::launch(&ChromeOptions::default()).await?;
//! let freezer = Freezer::new(host, FileSink::new("frozen"), BatchSettings::default());
//! let urls = page_freezer::parse_page_list("https://example.com\n\nhttps://example.org\n");
//! let mut panel = ErrorPanel::default();
//! let report = freezer
//!     .freeze_all(&urls, &FreezeOptions::new(2.5, true)?, &mut panel)
//!     .await;
//! for line in report.error_lines() {
//!     eprintln!("{line}");
//! }
//! # Ok(())
//! # }
//! ```

mod batch;
mod chrome;
mod host;
mod readiness;
mod scripts;
mod sink;
mod types;
mod viewport;
mod worker;

pub use batch::{ErrorPanel, Freezer, Reporter, parse_page_list};
pub use chrome::{ChromeHost, ChromeOptions, ChromeWindow};
pub use host::{Host, TabWatch, WatchId};
pub use readiness::await_ready;
pub use scripts::{DEFAULT_SERIALIZER_SCRIPT, MEASURE_WINDOW_SCRIPT, MESSAGE_HANDLER};
pub use sink::{FileSink, Sink};
pub use types::{
    BatchReport, BatchSettings, CaptureOutcome, DEFAULT_PLACEHOLDER_URL, FreezeError,
    FreezeOptions, FreezeRequest, HostError, Tab, TabStatus, WindowMeasurement, error_line,
};
pub use viewport::set_viewport_size;
