//! Device identity
//!
//! Each device registers under a stable id. When the identity provider is
//! unreachable or hands back nothing, the device still joins as a demo
//! participant named after the current wall-clock time.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use crate::Result;
use crate::clock::Clock;

/// Source of the device's participant id
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn device_id(&self) -> Result<String>;
}

/// Provider with a fixed id
#[derive(Debug, Clone)]
pub struct StaticIdentity(pub String);

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn device_id(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Id used when no identity is available
pub fn demo_device_id(clock: &dyn Clock) -> String {
    format!("demo_user_{}", clock.wall_ms())
}

/// Resolve the device id, falling back to a demo id
///
/// Never fails: provider errors, timeouts and blank ids all yield
/// [`demo_device_id`].
pub async fn resolve_device_id(
    provider: &dyn IdentityProvider,
    clock: &dyn Clock,
    timeout: Duration,
) -> String {
    match tokio::time::timeout(timeout, provider.device_id()).await {
        Ok(Ok(id)) if !id.trim().is_empty() => {
            info!(device_id = %id, "Device identity resolved");
            id
        }
        Ok(Ok(_)) => {
            warn!("Identity provider returned an empty id, using demo identity");
            demo_device_id(clock)
        }
        Ok(Err(e)) => {
            warn!("Identity lookup failed, using demo identity: {}", e);
            demo_device_id(clock)
        }
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "Identity lookup timed out, using demo identity");
            demo_device_id(clock)
        }
    }
}
