//! Credential matching for autofill.
//!
//! A request context is scored against stored credentials by a small, closed
//! set of strategies. Each strategy has a priority; the engine runs them from
//! highest to lowest and keeps the first score a credential receives.
//!
//! Strategies (priority order):
//! 1. **Domain** (100): web domain vs. stored site host (exact, subdomain, same root)
//! 2. **Package** (90): requesting app id vs. stored app association
//! 3. **Fuzzy** (50): text similarity between title/site/app id and the
//!    context's primary key, always available as the fallback
//!
//! Scores are on a 0-100 scale. Exact strategies score in the 75-100 band,
//! fuzzy matching never above [`FUZZY_SCORE_CAP`].

mod domain;
mod stop_words;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

pub use domain::{
    domains_match, extract_domain, extract_root_domain, is_app_package_name, normalize_host,
    relate_domains, relate_packages, DomainRelation, PackageRelation,
};
use stop_words::meaningful_words;

/// Matches below this score are never offered.
pub const DEFAULT_SCORE_THRESHOLD: u8 = 60;

/// Highest score the fuzzy strategy can produce.
pub const FUZZY_SCORE_CAP: u8 = 80;

/// The fuzzy strategy drops candidates below this score itself.
const FUZZY_MIN_SCORE: u8 = 60;

/// A stored credential as seen by the matcher. Secrets are not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PasswordEntry {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub username: String,
    /// Stored site URL or host (may be empty)
    #[serde(default)]
    pub website: String,
    /// Associated app id (may be empty)
    #[serde(default)]
    pub app_package_name: String,
}

impl PasswordEntry {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_website(mut self, website: impl Into<String>) -> Self {
        self.website = website.into();
        self
    }

    pub fn with_app(mut self, app_package_name: impl Into<String>) -> Self {
        self.app_package_name = app_package_name.into();
        self
    }
}

/// One fill request as reported by the OS callback.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AutofillContext {
    pub package_name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub app_label: Option<String>,
    #[serde(default)]
    pub is_web_view: bool,
    #[serde(default)]
    pub focused_field_id: Option<String>,
    #[serde(default)]
    pub detected_fields: Vec<String>,
}

impl AutofillContext {
    /// Native app request.
    pub fn for_app(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            ..Default::default()
        }
    }

    /// Web request rendered by `package_name` (a browser or web view host).
    pub fn for_web(package_name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            domain: Some(domain.into()),
            is_web_view: true,
            ..Default::default()
        }
    }

    pub fn with_focused_field(mut self, field_id: impl Into<String>) -> Self {
        self.focused_field_id = Some(field_id.into());
        self
    }

    pub fn with_app_label(mut self, label: impl Into<String>) -> Self {
        self.app_label = Some(label.into());
        self
    }

    /// Non-blank web domain, if any.
    pub fn web_domain(&self) -> Option<&str> {
        self.domain.as_deref().filter(|d| !d.trim().is_empty())
    }

    /// Key used for matching: the domain when present, otherwise the package.
    pub fn primary_key(&self) -> &str {
        self.web_domain().unwrap_or(&self.package_name)
    }

    pub fn display_name(&self) -> &str {
        if let Some(domain) = self.web_domain() {
            return domain;
        }
        match self.app_label.as_deref() {
            Some(label) if !label.trim().is_empty() => label,
            _ => &self.package_name,
        }
    }
}

/// How a credential matched, from most to least specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    ExactDomain,
    ExactPackage,
    Subdomain,
    SimilarPackage,
    Fuzzy,
}

impl MatchType {
    /// Higher is more specific; used as the first tie-break after score.
    pub fn specificity(self) -> u8 {
        match self {
            MatchType::ExactDomain => 4,
            MatchType::ExactPackage => 3,
            MatchType::Subdomain => 2,
            MatchType::SimilarPackage => 1,
            MatchType::Fuzzy => 0,
        }
    }

    pub fn is_exact(self) -> bool {
        matches!(self, MatchType::ExactDomain | MatchType::ExactPackage)
    }
}

/// A scored pairing of a candidate with the current request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordMatch {
    pub entry: Arc<PasswordEntry>,
    pub match_type: MatchType,
    pub score: u8,
}

impl PasswordMatch {
    pub fn new(entry: Arc<PasswordEntry>, match_type: MatchType, score: u8) -> Self {
        Self {
            entry,
            match_type,
            score,
        }
    }

    pub fn is_high_quality(&self) -> bool {
        self.match_type.is_exact() && self.score >= 80
    }
}

/// The closed set of matching rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingStrategy {
    Domain,
    Package,
    Fuzzy,
}

impl MatchingStrategy {
    /// All strategies, highest priority first.
    pub fn defaults() -> Vec<MatchingStrategy> {
        vec![
            MatchingStrategy::Domain,
            MatchingStrategy::Package,
            MatchingStrategy::Fuzzy,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            MatchingStrategy::Domain => "DomainMatcher",
            MatchingStrategy::Package => "PackageMatcher",
            MatchingStrategy::Fuzzy => "FuzzyMatcher",
        }
    }

    /// Higher runs first.
    pub fn priority(&self) -> i32 {
        match self {
            MatchingStrategy::Domain => 100,
            MatchingStrategy::Package => 90,
            MatchingStrategy::Fuzzy => 50,
        }
    }

    pub fn supports(&self, context: &AutofillContext) -> bool {
        match self {
            MatchingStrategy::Domain => context.web_domain().is_some(),
            MatchingStrategy::Package => {
                !context.package_name.trim().is_empty() && !context.is_web_view
            }
            MatchingStrategy::Fuzzy => true,
        }
    }

    /// Score every candidate and keep the ones this strategy accepts, best
    /// first. Candidates keep their input order among equal scores.
    pub fn match_candidates(
        &self,
        context: &AutofillContext,
        candidates: &[Arc<PasswordEntry>],
    ) -> Vec<PasswordMatch> {
        let mut matches: Vec<PasswordMatch> = candidates
            .iter()
            .filter_map(|entry| {
                self.evaluate(entry, context)
                    .map(|(match_type, score)| PasswordMatch::new(Arc::clone(entry), match_type, score))
            })
            .collect();
        matches.sort_by(|a, b| b.score.cmp(&a.score));
        matches
    }

    /// Score of `entry` under this strategy, 0 when it does not match.
    pub fn calculate_score(&self, entry: &PasswordEntry, context: &AutofillContext) -> u8 {
        self.evaluate(entry, context)
            .map(|(_, score)| score)
            .unwrap_or(0)
    }

    fn evaluate(&self, entry: &PasswordEntry, context: &AutofillContext) -> Option<(MatchType, u8)> {
        match self {
            MatchingStrategy::Domain => evaluate_domain(entry, context),
            MatchingStrategy::Package => evaluate_package(entry, context),
            MatchingStrategy::Fuzzy => evaluate_fuzzy(entry, context),
        }
    }
}

fn evaluate_domain(entry: &PasswordEntry, context: &AutofillContext) -> Option<(MatchType, u8)> {
    let requested = normalize_host(context.web_domain()?)?;
    let stored = extract_domain(&entry.website);

    match relate_domains(&requested, &stored)? {
        DomainRelation::Exact => Some((MatchType::ExactDomain, 100)),
        DomainRelation::Subdomain => Some((MatchType::Subdomain, 85)),
        DomainRelation::SameRoot => Some((MatchType::Subdomain, 75)),
    }
}

fn evaluate_package(entry: &PasswordEntry, context: &AutofillContext) -> Option<(MatchType, u8)> {
    match relate_packages(&context.package_name, &entry.app_package_name)? {
        PackageRelation::Exact => Some((MatchType::ExactPackage, 100)),
        PackageRelation::Variant => Some((MatchType::SimilarPackage, 80)),
    }
}

fn evaluate_fuzzy(entry: &PasswordEntry, context: &AutofillContext) -> Option<(MatchType, u8)> {
    let key = context.primary_key().trim().to_lowercase();
    if key.is_empty() {
        return None;
    }

    let best = [&entry.title, &entry.website, &entry.app_package_name]
        .iter()
        .map(|field| field.trim().to_lowercase())
        .filter(|field| !field.is_empty())
        .map(|field| text_similarity(&field, &key))
        .max()?;

    (best >= FUZZY_MIN_SCORE).then_some((MatchType::Fuzzy, best))
}

/// Similarity of two lower-cased strings in the fuzzy band (0-80).
fn text_similarity(text: &str, query: &str) -> u8 {
    if text == query {
        return FUZZY_SCORE_CAP;
    }

    let query_words = meaningful_words(query);
    if meaningful_words(text)
        .iter()
        .any(|word| query_words.contains(word))
    {
        return 75;
    }

    if text.len() >= 3 && query.len() >= 3 && (text.contains(query) || query.contains(text)) {
        return 70;
    }

    (strsim::normalized_levenshtein(text, query) * 70.0).round() as u8
}

/// Apply the score floor and the deterministic result ordering: score
/// descending, then match specificity descending, then title ascending.
pub fn rank_matches(matches: Vec<PasswordMatch>, threshold: u8) -> Vec<PasswordMatch> {
    let mut ranked: Vec<PasswordMatch> = matches
        .into_iter()
        .filter(|m| m.score >= threshold)
        .collect();
    ranked.sort_by(compare_matches);
    ranked
}

fn compare_matches(a: &PasswordMatch, b: &PasswordMatch) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| b.match_type.specificity().cmp(&a.match_type.specificity()))
        .then_with(|| a.entry.title.cmp(&b.entry.title))
        .then_with(|| a.entry.id.cmp(&b.entry.id))
}
