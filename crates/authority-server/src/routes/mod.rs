//! HTTP route modules, one per resource family.

pub mod attestations;
pub mod context;
pub mod dispatch;
pub mod forensic_log;
pub mod health;
pub mod leases;
pub mod proposals;
