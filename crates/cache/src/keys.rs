//! Cache key derivation.

use chrono::NaiveDate;
use common::EntityId;

/// Tag grouping every cached card listing and search page.
pub const CARDS_PAGINATION_TAG: &str = "cards_pagination";

/// Key of a single cached entity, e.g. `card42`.
pub fn entity_key(prefix: &str, id: EntityId) -> String {
    format!("{prefix}{id}")
}

/// Key of an unfiltered page, e.g. `page:0:limit:5`.
pub fn page_key(page: u32, limit: u32) -> String {
    format!("page:{page}:limit:{limit}")
}

/// Key of a cached user profile.
pub fn profile_key(user_name: &str) -> String {
    format!("user_{user_name}")
}

/// Key of a user's cached favorite cards.
pub fn favorites_key(user_name: &str) -> String {
    format!("favorite-cards:{user_name}")
}

/// Parameters of a filtered search whose result page is cached.
#[derive(Debug, Clone, Default)]
pub struct SearchKey<'a> {
    pub query: &'a str,
    pub page: u32,
    pub limit: u32,
    pub created_on: Option<NaiveDate>,
    pub tags: &'a [String],
}

impl SearchKey<'_> {
    /// Builds the key; filters that are absent do not appear in it.
    pub fn to_key(&self) -> String {
        let mut key = format!("{}:query:{}", page_key(self.page, self.limit), self.query);
        if let Some(date) = self.created_on {
            key.push_str(&format!(":date:{date}"));
        }
        if !self.tags.is_empty() {
            key.push_str(&format!(":tags:{}", self.tags.join(",")));
        }
        key
    }
}
