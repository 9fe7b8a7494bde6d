use std::collections::HashMap;

use async_trait::async_trait;
use chime_core::OwnerId;

use crate::{error::ChannelError, types::OwnerProfile};

/// Looks up an owner's contact details for remote channels.
#[async_trait]
pub trait OwnerDirectory: Send + Sync {
    /// `Ok(None)` when the owner has no profile.
    async fn profile(&self, owner_id: &OwnerId) -> Result<Option<OwnerProfile>, ChannelError>;
}

/// Fixed in-memory directory for tests and single-tenant deployments.
#[derive(Debug, Default, Clone)]
pub struct StaticOwnerDirectory {
    profiles: HashMap<OwnerId, OwnerProfile>,
}

impl StaticOwnerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, owner_id: impl Into<OwnerId>, profile: OwnerProfile) -> Self {
        self.profiles.insert(owner_id.into(), profile);
        self
    }
}

#[async_trait]
impl OwnerDirectory for StaticOwnerDirectory {
    async fn profile(&self, owner_id: &OwnerId) -> Result<Option<OwnerProfile>, ChannelError> {
        Ok(self.profiles.get(owner_id).cloned())
    }
}
