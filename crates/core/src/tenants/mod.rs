mod tenants_model;
mod tenants_traits;

pub use tenants_model::Tenant;
pub use tenants_traits::TenantRepositoryTrait;
