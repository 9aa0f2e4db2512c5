//! Port for tenant identity lookups.

use crate::handoff::domain::TenantId;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for tenant lookups.
pub type TenantResult<T> = Result<T, TenantLookupError>;

/// Standing of a tenant as reported by the tenant collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantStanding {
    /// The tenant is known.
    pub exists: bool,
    /// The tenant is not suspended.
    pub is_active: bool,
}

impl TenantStanding {
    /// Standing of a known, active tenant.
    pub const ACTIVE: Self = Self {
        exists: true,
        is_active: true,
    };

    /// Standing of a known but suspended tenant.
    pub const SUSPENDED: Self = Self {
        exists: true,
        is_active: false,
    };

    /// Standing of an unknown tenant.
    pub const UNKNOWN: Self = Self {
        exists: false,
        is_active: false,
    };

    /// Returns `true` when handoffs may be created for the tenant.
    #[must_use]
    pub const fn accepts_handoffs(self) -> bool {
        self.exists && self.is_active
    }
}

/// Tenant identity contract.
#[async_trait]
pub trait TenantIdentity: Send + Sync {
    /// Resolves the standing of a tenant.
    async fn resolve_tenant(&self, tenant_id: TenantId) -> TenantResult<TenantStanding>;
}

/// Transient failure reaching the tenant collaborator.
#[derive(Debug, Clone, Error)]
#[error("tenant lookup failed: {0}")]
pub struct TenantLookupError(pub Arc<dyn std::error::Error + Send + Sync>);

impl TenantLookupError {
    /// Wraps a backend error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Arc::new(err))
    }
}
