/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Scripts injected into pages.

/// Evaluates to `{outerWidth, outerHeight, innerWidth, innerHeight}`.
pub const MEASURE_WINDOW_SCRIPT: &str = include_str!("../scripts/measure_window.js");

/// Fallback serializer: installs a message handler that answers a freeze
/// request with the page's markup.
pub const DEFAULT_SERIALIZER_SCRIPT: &str = include_str!("../scripts/serializer.js");

/// Global the serializer installs its message handler under.
pub const MESSAGE_HANDLER: &str = "__pageFreezerOnMessage";
