pub mod authorizations;
pub mod companies;
pub mod exchanges;
pub mod health;
pub mod notifications;
pub mod realtime;
pub mod webhooks;
