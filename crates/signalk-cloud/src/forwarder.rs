//! Per-message rules for both relay directions.

use signalk_core::{Delta, Position, SELF_CONTEXT};

use crate::provenance::{is_cloud_origin, stamp_inbound, strip_outbound};

/// Prepare a local delta for the remote server.
///
/// Returns None for deltas that came from the cloud in the first place.
/// The `vessels.self` shorthand (or a missing context) becomes the full self
/// context, and local source annotations are removed.
pub fn prepare_outbound(mut delta: Delta, self_context: &str) -> Option<Delta> {
    if is_cloud_origin(&delta) {
        return None;
    }

    match delta.context.as_deref() {
        None | Some(SELF_CONTEXT) => delta.context = Some(self_context.to_string()),
        Some(_) => {}
    }

    delta.updates.iter_mut().for_each(strip_outbound);
    Some(delta)
}

/// Prepare a remote delta for the local bus.
///
/// Our own vessel echoed back and deltas without updates are ignored. So are
/// deltas without a context or with the `vessels.self` shorthand, which
/// would otherwise land on our own vessel locally. A delta that already
/// carries the cloud tag is an echo and is dropped as a whole.
pub fn prepare_inbound(mut delta: Delta, self_context: &str) -> Option<Delta> {
    if is_cloud_origin(&delta) {
        return None;
    }
    match delta.context.as_deref() {
        None | Some(SELF_CONTEXT) => return None,
        Some(context) if context == self_context => return None,
        Some(_) => {}
    }
    if delta.updates.is_empty() {
        return None;
    }

    delta.updates.iter_mut().for_each(stamp_inbound);
    Some(delta)
}

/// Our own position, if this outbound delta carries one.
pub fn self_position(delta: &Delta, self_context: &str) -> Option<Position> {
    if delta.context.as_deref() != Some(self_context) {
        return None;
    }
    delta
        .updates
        .iter()
        .filter_map(|u| u.value_of("navigation.position"))
        .find_map(Position::from_value)
}
