/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use log::debug;

use crate::host::Host;
use crate::scripts::MEASURE_WINDOW_SCRIPT;
use crate::types::{FreezeError, Tab, WindowMeasurement};

/// Resize `window` so its content area is `width` x `height`.
///
/// Window metrics are only visible from inside a page, so they are measured
/// by injecting into `tab`. That tab must not be on the blank page: hosts
/// refuse injection there.
pub async fn set_viewport_size<H: Host>(
    host: &H,
    window: &H::WindowId,
    tab: &Tab<H::TabId>,
    width: u32,
    height: u32,
) -> Result<WindowMeasurement, FreezeError> {
    let raw = host
        .execute_script(&tab.id, MEASURE_WINDOW_SCRIPT)
        .await
        .map_err(|e| FreezeError::Measurement(e.to_string()))?;
    let sizes: WindowMeasurement = serde_json::from_value(raw)
        .map_err(|e| FreezeError::Measurement(format!("unexpected measurement: {e}")))?;

    let (outer_width, outer_height) = sizes.outer_size_for(width, height);
    debug!("Measured {sizes:?}; resizing window to {outer_width}x{outer_height}");
    host.update_window(window, outer_width, outer_height)
        .await
        .map_err(|e| FreezeError::Measurement(e.to_string()))?;
    Ok(sizes)
}
