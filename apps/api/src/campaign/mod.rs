//! Interview call campaign orchestration: queue store, driver, status
//! poller and outcome classification.

pub mod classify;
pub mod driver;
pub mod handlers;
pub mod manager;
pub mod models;
pub mod phone;
pub mod prompt;
pub mod store;
