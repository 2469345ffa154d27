/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Freeze a list of pages with headless Chromium.
//!
//! Thin wrapper around [`page_freezer::Freezer`].
//!
//! ```bash
//! page-freezer --out frozen https://example.com https://example.org
//! page-freezer --pages urls.txt --wait 2.5 --scroll --out frozen
//! ```

use std::io::Read;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use bpaf::Bpaf;
use log::error;
use page_freezer::{
    BatchReport, BatchSettings, ChromeHost, ChromeOptions, FileSink, FreezeError, FreezeOptions,
    Freezer, Reporter, error_line, parse_page_list,
};

// ---------------------------------------------------------------------------
// CLI parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Bpaf)]
#[bpaf(options, usage("page-freezer [OPTIONS] [URL]..."))]
struct FreezerConfig {
    /// Read newline-delimited URLs from a file ("-" for stdin)
    #[bpaf(long, short, argument("PATH"))]
    pages: Option<String>,

    /// Directory to write frozen pages into
    #[bpaf(long, short, argument("DIR"), fallback(PathBuf::from(".")))]
    out: PathBuf,

    /// Longest time the serializer may wait for a page to settle
    #[bpaf(long, argument("SECONDS"), fallback(2.0f64))]
    wait: f64,

    /// Scroll through each page before freezing it
    #[bpaf(long, short)]
    scroll: bool,

    /// Viewport width in pixels
    #[bpaf(long, argument("PIXELS"), fallback(1024u32))]
    width: u32,

    /// Viewport height in pixels
    #[bpaf(long, argument("PIXELS"), fallback(768u32))]
    height: u32,

    /// How long to wait for each page to finish loading
    #[bpaf(long, argument::<f64>("SECONDS"), parse(parse_seconds), fallback(Duration::from_secs(5)))]
    ready_timeout: Duration,

    /// Extra time allowed for injecting and answering, on top of --wait
    #[bpaf(long, argument::<f64>("SECONDS"), parse(parse_seconds), fallback(Duration::from_secs(30)))]
    response_timeout: Duration,

    /// Serializer script to inject instead of the built-in one
    #[bpaf(long, argument("PATH"))]
    serializer: Option<PathBuf>,

    /// Chrome/Chromium binary to launch
    #[bpaf(long, argument("PATH"))]
    chrome: Option<PathBuf>,

    /// Show the browser window
    #[bpaf(long)]
    headed: bool,

    /// URLs to freeze
    #[bpaf(positional::<String>("URL"), many)]
    urls: Vec<String>,
}

fn parse_seconds(seconds: f64) -> Result<Duration, String> {
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("Invalid duration: {e}"))
}

fn read_page_list(path: &str) -> std::io::Result<String> {
    if path == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        std::fs::read_to_string(path)
    }
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

/// Prints progress to stderr.
struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn page_failed(&mut self, url: &str, error: &FreezeError) {
        eprintln!("{}", error_line(url, error));
    }

    fn page_frozen(&mut self, url: &str, location: &str) {
        eprintln!("Froze {url} -> {location}");
    }

    fn batch_finished(&mut self, report: &BatchReport) {
        eprintln!(
            "{} of {} page(s) frozen.",
            report.frozen_count(),
            report.outcomes.len()
        );
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .filter_module("chromiumoxide::conn", log::LevelFilter::Warn)
        .filter_module("chromiumoxide::handler", log::LevelFilter::Warn)
        .format_target(false)
        .parse_default_env()
        .init();

    let config = freezer_config().run();

    let mut urls = config.urls.clone();
    if let Some(path) = &config.pages {
        match read_page_list(path) {
            Ok(text) => urls.extend(parse_page_list(&text)),
            Err(e) => {
                eprintln!("Error: failed to read page list {path}: {e}");
                process::exit(1);
            }
        }
    }
    urls.retain(|url| !url.trim().is_empty());
    if urls.is_empty() {
        eprintln!("Error: no URLs given");
        process::exit(1);
    }

    let options = FreezeOptions::new(config.wait, config.scroll).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        process::exit(1);
    });

    let serializer = match &config.serializer {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(source) => Some(source),
            Err(e) => {
                eprintln!("Error: failed to read serializer {}: {e}", path.display());
                process::exit(1);
            }
        },
        None => None,
    };

    let chrome_options = ChromeOptions {
        headless: !config.headed,
        executable: config.chrome.clone(),
        width: config.width,
        height: config.height,
    };
    let host = ChromeHost::launch(&chrome_options).await.unwrap_or_else(|e| {
        eprintln!("Error: failed to launch browser: {e}");
        process::exit(1);
    });

    let settings = BatchSettings {
        viewport_width: config.width,
        viewport_height: config.height,
        ready_timeout: config.ready_timeout,
        response_timeout: config.response_timeout,
        ..BatchSettings::default()
    };
    let mut freezer = Freezer::new(host, FileSink::new(&config.out), settings);
    if let Some(source) = serializer {
        freezer = freezer.with_serializer(source);
    }

    let report = freezer
        .freeze_all(&urls, &options, &mut ConsoleReporter)
        .await;

    if let Err(e) = freezer.into_host().close().await {
        error!("Failed to shut down browser: {e}");
    }

    if report.failures().next().is_some() {
        process::exit(1);
    }
}
