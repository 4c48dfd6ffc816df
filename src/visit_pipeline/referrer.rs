//! Referrer construction (§4.7 step 5): either a search-engine URL carrying a
//! URL-encoded keyword, or a weighted pick from a referrer chain keyed by
//! domain. Template/keyword content is opaque by design (§2 non-goals).

use rand::Rng;
use std::collections::HashMap;

/// A single weighted referrer template for one domain. `template` must contain
/// no placeholder beyond being used verbatim as the `Referer` header value.
#[derive(Debug, Clone)]
pub struct ReferrerEntry {
    pub template: String,
    pub weight: u32,
}

/// Resolved referrer choice for one visit.
#[derive(Debug, Clone)]
pub enum ReferrerChoice {
    SearchEngine { base_url: String, keyword: String },
    Chain(String),
}

impl ReferrerChoice {
    #[must_use]
    pub fn into_url(self) -> String {
        match self {
            ReferrerChoice::SearchEngine { base_url, keyword } => {
                format!("{base_url}?q={}", urlencoding::encode(&keyword))
            }
            ReferrerChoice::Chain(url) => url,
        }
    }
}

/// How a visit picks a referrer, if any.
#[derive(Debug, Clone, Default)]
pub enum ReferrerPolicy {
    #[default]
    None,
    SearchEngine {
        base_url: String,
        keyword: String,
    },
    /// Domain (host, without scheme) -> weighted referrer chain.
    Chain(HashMap<String, Vec<ReferrerEntry>>),
}

impl ReferrerPolicy {
    #[must_use]
    pub fn none() -> Self {
        ReferrerPolicy::None
    }

    #[must_use]
    pub fn search_engine(base_url: impl Into<String>, keyword: impl Into<String>) -> Self {
        ReferrerPolicy::SearchEngine {
            base_url: base_url.into(),
            keyword: keyword.into(),
        }
    }

    #[must_use]
    pub fn chain(entries: HashMap<String, Vec<ReferrerEntry>>) -> Self {
        ReferrerPolicy::Chain(entries)
    }

    /// Resolves a referrer for `url`, or `None` for plain navigation.
    #[must_use]
    pub fn choose(&self, url: &str) -> Option<ReferrerChoice> {
        match self {
            ReferrerPolicy::None => None,
            ReferrerPolicy::SearchEngine { base_url, keyword } => Some(ReferrerChoice::SearchEngine {
                base_url: base_url.clone(),
                keyword: keyword.clone(),
            }),
            ReferrerPolicy::Chain(entries) => {
                let domain = url::Url::parse(url).ok()?.host_str()?.to_string();
                let candidates = entries.get(&domain)?;
                weighted_pick(candidates).map(|e| ReferrerChoice::Chain(e.template.clone()))
            }
        }
    }
}

fn weighted_pick(entries: &[ReferrerEntry]) -> Option<&ReferrerEntry> {
    let total: u32 = entries.iter().map(|e| e.weight).sum();
    if total == 0 {
        return entries.first();
    }
    let mut pick = rand::rng().random_range(0..total);
    for entry in entries {
        if pick < entry.weight {
            return Some(entry);
        }
        pick -= entry.weight;
    }
    entries.last()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_policy_never_chooses() {
        assert!(ReferrerPolicy::none().choose("http://example.com").is_none());
    }

    #[test]
    fn search_engine_keyword_is_url_encoded() {
        let policy = ReferrerPolicy::search_engine("https://search.example", "rust async runtime");
        let choice = policy.choose("http://example.com").unwrap();
        let url = choice.into_url();
        assert!(url.contains("rust%20async%20runtime") || url.contains("rust+async+runtime"));
    }

    #[test]
    fn chain_picks_from_matching_domain_only() {
        let mut entries = HashMap::new();
        entries.insert(
            "example.com".to_string(),
            vec![ReferrerEntry { template: "https://ref.example/a".into(), weight: 1 }],
        );
        let policy = ReferrerPolicy::chain(entries);
        assert!(policy.choose("http://example.com/page").is_some());
        assert!(policy.choose("http://other.com/page").is_none());
    }

    #[test]
    fn weighted_pick_prefers_nonzero_weight_when_single_candidate() {
        let entries = vec![ReferrerEntry { template: "https://only.example".into(), weight: 5 }];
        let picked = weighted_pick(&entries).unwrap();
        assert_eq!(picked.template, "https://only.example");
    }
}
