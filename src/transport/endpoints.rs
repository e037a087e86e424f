//! URLs of the mod API resources used by the installer.

use url::Url;

use crate::collection::ModId;
use crate::error::{Error, Result};
use crate::transport::HttpRequest;

/// Builds requests against one game on the mod API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoints {
    base: Url,
    game_id: u64,
    api_key: String,
}

impl ApiEndpoints {
    pub fn new(base_url: &str, game_id: u64, api_key: impl Into<String>) -> Result<Self> {
        let base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            return Err(Error::ConfigValidation {
                field: "api.base_url".to_string(),
                message: format!("'{}' cannot be used as a base URL", base_url),
            });
        }
        Ok(Self {
            base,
            game_id,
            api_key: api_key.into(),
        })
    }

    pub fn game_id(&self) -> u64 {
        self.game_id
    }

    /// `GET {base}/games/{game}`
    pub fn game_info(&self) -> HttpRequest {
        let game = self.game_id.to_string();
        self.request(&["games", &game])
    }

    /// `GET {base}/games/{game}/mods/{mod}`
    pub fn mod_info(&self, id: ModId) -> HttpRequest {
        let game = self.game_id.to_string();
        let id = id.to_string();
        self.request(&["games", &game, "mods", &id])
    }

    fn request(&self, segments: &[&str]) -> HttpRequest {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.query_pairs_mut().append_pair("api_key", &self.api_key);
        HttpRequest::get(url).with_header("Accept", "application/json")
    }
}
