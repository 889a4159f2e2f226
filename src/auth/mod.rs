//! Credentials, tokens and project-scoped authorization.

pub mod jwt;
pub mod password;
pub mod policy;

pub use policy::{authorize, Action, Decision, DenyReason, Principal, TaskScope};
