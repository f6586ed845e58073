pub mod pool_registry;
pub use pool_registry::{PoolSettings, TenantPoolRegistry};
pub mod migrator;
pub mod company_repo;
pub use company_repo::CompanyRepository;
pub mod shift_repo;
pub use shift_repo::ShiftRepository;
pub mod authorization_repo;
pub use authorization_repo::AuthorizationRepository;
pub mod exchange_repo;
pub use exchange_repo::ExchangeRepository;
pub mod notification_repo;
pub use notification_repo::NotificationRepository;
pub mod erp_sync_repo;
pub use erp_sync_repo::ErpSyncRepository;
pub mod pos_repo;
pub use pos_repo::{PosRepository, PosTable};
