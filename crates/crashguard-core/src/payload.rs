//! Recovery surface handoff payload
//!
//! The payload crosses a transport with a hard size ceiling (a single
//! process argument on the default process host), so the fault text is
//! truncated to a byte budget before handoff.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::component::ComponentId;

/// Default fault text budget (128 KiB - 1)
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 131_071;

/// Appended to fault text that had to be cut
pub const TRUNCATION_MARKER: &str = " [stack trace too large]";

/// Argument names used when the payload is passed on a command line
pub const ARG_FAULT_TEXT: &str = "--fault-text";
pub const ARG_RESTART_TARGET: &str = "--restart-target";
pub const ARG_SHOW_DETAILS: &str = "--show-details";
pub const ARG_ICON_ID: &str = "--icon-id";

/// Data handed from the crash supervisor to the recovery surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffPayload {
    /// What to relaunch on "restart"; `None` means offer "close" only
    pub restart_target: Option<ComponentId>,
    /// Whether the surface renders the full diagnostic text
    pub show_details: bool,
    /// Human-readable fault chain, within the byte budget
    pub fault_text: String,
    /// Presentation hint, opaque to the supervisor
    pub icon_id: i32,
}

impl HandoffPayload {
    /// Command-line form of the payload
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            ARG_FAULT_TEXT.to_string(),
            self.fault_text.clone(),
            ARG_SHOW_DETAILS.to_string(),
            self.show_details.to_string(),
            ARG_ICON_ID.to_string(),
            self.icon_id.to_string(),
        ];
        if let Some(ref target) = self.restart_target {
            args.push(ARG_RESTART_TARGET.to_string());
            args.push(target.to_string());
        }
        args
    }
}

/// Builds payloads from fault text under a fixed budget
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    max_bytes: usize,
    show_details: bool,
    icon_id: i32,
}

impl PayloadBuilder {
    pub fn new(max_bytes: usize, show_details: bool, icon_id: i32) -> Self {
        Self {
            max_bytes,
            show_details,
            icon_id,
        }
    }

    pub fn build(&self, fault_text: &str, restart_target: Option<ComponentId>) -> HandoffPayload {
        let clean = replace_nul(fault_text);
        let text = truncate_fault_text(&clean, self.max_bytes);
        if let Cow::Owned(_) = text {
            log::debug!(
                "Fault text truncated from {} to {} bytes",
                clean.len(),
                text.len()
            );
        }
        HandoffPayload {
            restart_target,
            show_details: self.show_details,
            fault_text: text.into_owned(),
            icon_id: self.icon_id,
        }
    }
}

/// Replace NUL bytes, which a process argument cannot carry
fn replace_nul(text: &str) -> Cow<'_, str> {
    if text.contains('\0') {
        Cow::Owned(text.replace('\0', "\u{FFFD}"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Fit `text` into `max_bytes`
///
/// Text within the budget is returned unchanged. Longer text is cut at the
/// last char boundary that leaves room for [`TRUNCATION_MARKER`] and the
/// marker is appended, so the result never exceeds `max_bytes` and equals
/// it exactly when the cut falls on a boundary (always, for ASCII).
///
/// A budget smaller than the marker cannot hold it; the text is then cut
/// to the budget without a marker.
pub fn truncate_fault_text(text: &str, max_bytes: usize) -> Cow<'_, str> {
    if text.len() <= max_bytes {
        return Cow::Borrowed(text);
    }

    let Some(room) = max_bytes.checked_sub(TRUNCATION_MARKER.len()) else {
        return Cow::Borrowed(&text[..floor_char_boundary(text, max_bytes)]);
    };

    let cut = floor_char_boundary(text, room);
    let mut out = String::with_capacity(cut + TRUNCATION_MARKER.len());
    out.push_str(&text[..cut]);
    out.push_str(TRUNCATION_MARKER);
    Cow::Owned(out)
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    (0..=index)
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0)
}
