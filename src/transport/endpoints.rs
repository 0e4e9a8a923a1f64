use url::Url;

use crate::config::DashboardConfig;
use crate::error::ProviderError;

/// URL builder for the Dashboard REST API of one organisation.
///
/// Every path segment is percent-encoded, so collection ids and the
/// organisation id can be passed through as-is.
#[derive(Debug, Clone)]
pub struct Endpoints {
    root: Url,
    organisation_id: String,
}

impl Endpoints {
    /// # Errors
    ///
    /// Returns [`ProviderError::Config`] when the base URL cannot be used as an
    /// API root or the organisation id is empty.
    pub fn new(config: &DashboardConfig) -> Result<Self, ProviderError> {
        let organisation_id = config.organisation_id.trim();
        if organisation_id.is_empty() {
            return Err(ProviderError::Config(
                "dashboard.organisation_id is not configured".to_string(),
            ));
        }
        let root = Url::parse(config.base_url.trim()).map_err(|err| {
            ProviderError::Config(format!("dashboard.base_url is not a valid URL: {err}"))
        })?;
        if root.cannot_be_a_base() || !matches!(root.scheme(), "http" | "https") {
            return Err(ProviderError::Config(format!(
                "dashboard.base_url '{root}' cannot be used as an API root"
            )));
        }
        Ok(Self {
            root,
            organisation_id: organisation_id.to_string(),
        })
    }

    #[must_use]
    pub fn organisation_id(&self) -> &str {
        &self.organisation_id
    }

    fn join<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.root.clone();
        url.set_query(None);
        url.set_fragment(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn ai<'a>(&'a self, tail: impl IntoIterator<Item = &'a str>) -> Url {
        self.join(
            ["api", "v3", "organisations", self.organisation_id.as_str(), "ai"]
                .into_iter()
                .chain(tail),
        )
    }

    #[must_use]
    pub fn chat(&self) -> Url {
        self.ai(["chat"])
    }

    #[must_use]
    pub fn chat_stream(&self) -> Url {
        self.ai(["chat", "stream"])
    }

    #[must_use]
    pub fn embeddings(&self) -> Url {
        self.ai(["embeddings"])
    }

    #[must_use]
    pub fn models(&self) -> Url {
        self.ai(["models"])
    }

    #[must_use]
    pub fn image_generation(&self) -> Url {
        self.ai(["image-generation"])
    }

    #[must_use]
    pub fn collections(&self) -> Url {
        self.ai(["vector-db", "collections"])
    }

    #[must_use]
    pub fn collection(&self, collection_id: &str) -> Url {
        self.ai(["vector-db", "collections", collection_id])
    }

    #[must_use]
    pub fn documents(&self, collection_id: &str) -> Url {
        self.ai(["vector-db", "collections", collection_id, "documents"])
    }

    #[must_use]
    pub fn documents_delete(&self, collection_id: &str) -> Url {
        self.ai([
            "vector-db",
            "collections",
            collection_id,
            "documents",
            "delete",
        ])
    }

    #[must_use]
    pub fn query(&self, collection_id: &str) -> Url {
        self.ai(["vector-db", "collections", collection_id, "query"])
    }

    #[must_use]
    pub fn oauth_authorize(&self) -> Url {
        self.join(["oauth", "authorize"])
    }

    #[must_use]
    pub fn oauth_token(&self) -> Url {
        self.join(["oauth", "token"])
    }
}
