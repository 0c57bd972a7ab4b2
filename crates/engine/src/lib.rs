//! Notification dispatch and push-device lifecycle.
//!
//! Feed rows and push intents are written inside a [`unit_of_work::UnitOfWork`];
//! intents reach the [`dispatcher::PushDispatcher`] only after the transaction
//! commits. The [`sweeper::RetentionSweeper`] ages out dead devices.

pub mod bus;
pub mod dispatcher;
pub mod memory;
pub mod registry;
pub mod service;
pub mod store;
pub mod sweeper;
pub mod unit_of_work;
pub mod view_limiter;
