//! HTTP handlers. Each one is a thin call into `dispensary-db`.

pub mod health;
pub mod medicines;
pub mod prescriptions;
