//! Kubernetes API helpers shared by the command units.

pub mod discovery;
pub mod openapi;
