//! In-memory tenant identity lookup.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::handoff::{
    domain::TenantId,
    ports::{TenantIdentity, TenantLookupError, TenantResult, TenantStanding},
};

/// Tenant table held in memory. Unlisted tenants resolve as unknown.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTenantIdentity {
    tenants: Arc<RwLock<HashMap<TenantId, TenantStanding>>>,
}

impl InMemoryTenantIdentity {
    /// Creates an empty tenant table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table where each given tenant is active.
    #[must_use]
    pub fn with_active(tenants: impl IntoIterator<Item = TenantId>) -> Self {
        let table = tenants
            .into_iter()
            .map(|tenant_id| (tenant_id, TenantStanding::ACTIVE))
            .collect();
        Self {
            tenants: Arc::new(RwLock::new(table)),
        }
    }

    /// Records a tenant's standing.
    ///
    /// # Errors
    ///
    /// Returns [`TenantLookupError`] if the internal lock is poisoned.
    pub fn insert(&self, tenant_id: TenantId, standing: TenantStanding) -> TenantResult<()> {
        let mut tenants = self
            .tenants
            .write()
            .map_err(|err| TenantLookupError::backend(std::io::Error::other(err.to_string())))?;
        tenants.insert(tenant_id, standing);
        Ok(())
    }
}

#[async_trait]
impl TenantIdentity for InMemoryTenantIdentity {
    async fn resolve_tenant(&self, tenant_id: TenantId) -> TenantResult<TenantStanding> {
        let tenants = self
            .tenants
            .read()
            .map_err(|err| TenantLookupError::backend(std::io::Error::other(err.to_string())))?;
        Ok(tenants
            .get(&tenant_id)
            .copied()
            .unwrap_or(TenantStanding::UNKNOWN))
    }
}
