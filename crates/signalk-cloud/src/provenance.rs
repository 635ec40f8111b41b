//! Loop prevention.
//!
//! Every update that enters the local bus from a cloud server carries a source
//! starting with `cloud:`. The local bus may hand those updates back to the
//! outward subscription; a delta with any such update is never sent upstream.

use signalk_core::{Delta, Source, Update};

use crate::config::PLUGIN_ID;

/// Source prefix marking cloud-origin updates.
pub const CLOUD_TAG: &str = "cloud:";

/// Where an update came from, as far as the relay is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Local,
    Cloud,
}

impl Provenance {
    /// Classify an update by its source label and `$source`.
    ///
    /// Only a leading `cloud:` counts; a label merely containing it does not.
    pub fn of(update: &Update) -> Self {
        let label = update.source.as_ref().map(|s| s.label.as_str());
        let tagged = [label, update.source_ref.as_deref()]
            .into_iter()
            .flatten()
            .any(|s| s.starts_with(CLOUD_TAG));

        if tagged {
            Provenance::Cloud
        } else {
            Provenance::Local
        }
    }
}

/// True if any update in the delta came from the cloud.
pub fn is_cloud_origin(delta: &Delta) -> bool {
    delta
        .updates
        .iter()
        .any(|u| Provenance::of(u) == Provenance::Cloud)
}

fn tagged(label: &str) -> String {
    if label.starts_with(CLOUD_TAG) {
        label.to_string()
    } else {
        format!("{CLOUD_TAG}{label}")
    }
}

/// Mark an inbound update as cloud-origin.
///
/// An embedded source gets its label prefixed; otherwise `$source` is
/// prefixed, or set to `cloud:signalk-cloud` when absent.
pub fn stamp_inbound(update: &mut Update) {
    match update.source.as_mut() {
        Some(source) => source.label = tagged(&source.label),
        None => {
            let label = update.source_ref.as_deref().unwrap_or(PLUGIN_ID);
            update.source_ref = Some(tagged(label));
        }
    }
}

/// Remove local source bookkeeping before an update leaves the vessel.
pub fn strip_outbound(update: &mut Update) {
    update.source = None;
    update.source_ref = None;
}
