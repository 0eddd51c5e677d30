//! Price feed provisioning.

use alloy_core::primitives::Address;

use crate::{
    DeploymentRegistry, Error, NetworkKind, NetworkProfile, Result, contracts::MOCK_V3_AGGREGATOR,
};

/// Resolve the price feed address to wire into `FundMe`.
///
/// On a development network the mock must already be in the registry: this
/// never deploys it, and fails with [`Error::MockNotFound`] instead. On a live
/// network the configured feed is returned without any I/O.
pub fn resolve_dependency(
    profile: &NetworkProfile,
    registry: &dyn DeploymentRegistry,
) -> Result<Address> {
    match profile.kind {
        NetworkKind::Development => locate_mock(profile, registry),
        NetworkKind::Live { price_feed } => {
            tracing::debug!(network = %profile.name, %price_feed, "Using live price feed");
            Ok(price_feed)
        }
    }
}

fn locate_mock(profile: &NetworkProfile, registry: &dyn DeploymentRegistry) -> Result<Address> {
    let record = registry
        .get(&profile.name, MOCK_V3_AGGREGATOR)?
        .ok_or_else(|| Error::MockNotFound {
            name: MOCK_V3_AGGREGATOR.to_string(),
            network: profile.name.clone(),
        })?;

    tracing::debug!(network = %profile.name, mock = %record.address, "Using mock price feed");
    Ok(record.address)
}
