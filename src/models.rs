pub mod auth;
pub mod authorization;
pub mod company;
pub mod erp;
pub mod exchange;
pub mod notification;
pub mod pos;
pub mod realtime;
pub mod shift;
pub mod webhook;
