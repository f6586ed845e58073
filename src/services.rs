pub mod authorization_service;
pub mod erp_sync_service;
pub mod exchange_service;
pub mod ingestion_service;
pub mod notification_service;
pub mod provisioning_service;
pub mod realtime;
