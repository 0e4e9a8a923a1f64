//! Vector collection model and the local long-id mapping table.
//!
//! Remote operations live in [`crate::api::vdb`].

pub mod mapping;
pub mod types;

use std::sync::LazyLock;

use regex_lite::Regex;

pub use mapping::{IdMapping, IdMappingTable};
pub use types::{
    clamp_query_limit, QueryInput, QueryMatch, VectorCollection, VectorDocument, LONG_ID_FIELD,
};

static COLLECTION_ID_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
    )
    .ok()
});

/// True when `name_or_id` already looks like a remote collection id and can
/// be used without a lookup.
#[must_use]
pub fn is_collection_id(name_or_id: &str) -> bool {
    COLLECTION_ID_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(name_or_id))
}
