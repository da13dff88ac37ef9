//! HTTP handlers for recipe-service.

pub mod ai;
pub mod health;
pub mod index;
pub mod recipes;

pub use health::{health_check, metrics_endpoint, readiness_check};
