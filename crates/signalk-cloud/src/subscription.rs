//! Subscriptions in both directions.
//!
//! Locally the relay subscribes to its own vessel's paths selected by the
//! endpoint's data policy. Remotely it asks for every path of every vessel
//! within a radius of its own position.

use std::time::Duration;

use signalk_core::{Position, SELF_CONTEXT};
use signalk_protocol::{GeoContext, RemoteSubscribeRequest, SubscribeRequest, Subscription};

use crate::config::{DataPolicy, EndpointConfig};

fn millis(period: Duration) -> u64 {
    u64::try_from(period.as_millis()).unwrap_or(u64::MAX)
}

/// Local bus subscription for what an endpoint receives from us.
pub fn local_subscription(policy: DataPolicy, period: Duration) -> SubscribeRequest {
    let period = millis(period);
    SubscribeRequest {
        context: SELF_CONTEXT.to_string(),
        subscribe: policy
            .paths()
            .iter()
            .map(|path| Subscription::every(*path, period))
            .collect(),
    }
}

/// Remote subscription for vessels around `position`.
///
/// None when the endpoint does not fetch other vessels.
pub fn remote_subscription(
    config: &EndpointConfig,
    position: Position,
) -> Option<RemoteSubscribeRequest> {
    if !config.fetch_other_vessels {
        return None;
    }

    Some(RemoteSubscribeRequest {
        context: GeoContext {
            radius: config.other_vessels_radius,
            position,
        },
        subscribe: vec![Subscription::every("*", millis(config.inward_period()))],
    })
}
