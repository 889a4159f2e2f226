//! HTTP request handlers.

pub mod health;
pub mod members;
pub mod projects;
pub mod tasks;
pub mod users;
