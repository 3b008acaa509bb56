pub mod admins;
pub mod audit_logs;
pub mod auth;
pub mod guard;
pub mod health;
pub mod raffles;
