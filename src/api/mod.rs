//! Provider operations. Each takes the shared [`ProviderState`].

pub mod chat;
pub mod embeddings;
pub mod images;
pub mod models;
pub mod vdb;

pub use chat::{chat, chat_stream};
pub use embeddings::embeddings;
pub use images::{text_to_image, GeneratedImage, ImageRequest};
pub use models::{get_model_details, get_models, max_input_tokens, max_output_tokens};

use crate::state::ProviderState;

/// True when the provider has an organisation and a stored credential.
/// Does no network I/O.
#[must_use]
pub fn is_usable(state: &ProviderState) -> bool {
    if state.endpoints.organisation_id().trim().is_empty() {
        tracing::debug!("Dashboard provider unusable: no organisation id");
        return false;
    }
    if !state.authenticator.has_credential() {
        tracing::debug!("Dashboard provider unusable: no stored credential");
        return false;
    }
    true
}
