//! Dashboard AI platform provider.
//!
//! Maps provider-agnostic chat requests, embeddings, image generation, the
//! model catalog and vector collections onto the Dashboard REST API.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod state;
pub mod store;
pub mod stream;
pub mod transport;
pub mod vdb;

mod util;

pub use error::ProviderError;
pub use state::ProviderState;
