//! HTTP surface for device registration, the notification feed and
//! internal notification enqueueing.

pub mod middleware;
pub mod routes;
pub mod state;
