// REST API surface.

pub mod auth;
pub mod client;
pub mod notifications;

pub use client::{ApiClient, ApiRequest, ApiResponse};
