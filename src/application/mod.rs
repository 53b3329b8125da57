//! Application services: pagination, feed resolution, social writes, notifications and sessions.

pub mod error;
pub mod feed;
pub mod notifications;
pub mod pagination;
pub mod repos;
pub mod session;
pub mod social;
