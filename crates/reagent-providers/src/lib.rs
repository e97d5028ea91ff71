//! Model gateway layer for Reagent.
//!
//! # Architecture
//!
//! - [`traits::ModelGateway`] — trait the agent loop calls through
//! - [`http_gateway::HttpGateway`] — OpenAI-compatible HTTP client
//! - [`retry`] — attempt/backoff policy shared by gateway implementations
//! - [`error::GatewayError`] — transport / protocol failure taxonomy

pub mod error;
pub mod http_gateway;
pub mod retry;
pub mod traits;

pub use error::GatewayError;
pub use http_gateway::{create_gateway, HttpGateway};
pub use retry::RetryPolicy;
pub use traits::{GenerationConfig, ModelGateway};
