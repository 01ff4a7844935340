//! Autofill request engine.
//!
//! One request runs as: fetch candidates, run the strategies from highest to
//! lowest priority, keep the first match per credential, drop low scores,
//! sort, cap. The body runs under [`ErrorRecovery`] with a single deadline,
//! so a failing or panicking vault and a slow request both degrade to an
//! empty, unsuccessful [`AutofillResult`] instead of an error the host has
//! to handle.
//!
//! # Example (conceptual)
//! ```ignore
//! let engine = AutofillEngine::builder()
//!     .data_source(InMemoryCredentialSource::new(entries))
//!     .default_strategies()
//!     .build()?;
//! let result = engine.process_request(&AutofillContext::for_web("com.android.chrome", "github.com")).await;
//! ```

mod recovery;
mod source;

pub use recovery::{ErrorRecord, ErrorRecovery, ErrorReporter, RetryPolicy, MAX_ERROR_RECORDS};
pub use source::{
    CachedCredentialSource, CredentialSource, InMemoryCredentialSource,
    CANDIDATE_CACHE_MAX_ENTRIES, CANDIDATE_CACHE_TTL_MS,
};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::CoreConfig;
use crate::error::{AutofillError, CoreResult};
use crate::matching::{
    rank_matches, AutofillContext, MatchingStrategy, PasswordEntry, PasswordMatch,
    DEFAULT_SCORE_THRESHOLD,
};
use crate::metrics::{MetricsCollector, PerformanceTracker};

/// User-facing autofill settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutofillPreferences {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Read by the presentation layer; the engine does not authenticate
    #[serde(default)]
    pub require_biometric: bool,
    /// Fetch the whole vault and let the fuzzy strategy run over it, instead
    /// of a narrowed domain/package query
    #[serde(default = "default_true")]
    pub enable_fuzzy_search: bool,
    #[serde(default)]
    pub auto_submit: bool,
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
    #[serde(default = "default_true")]
    pub enable_inline_suggestions: bool,
    /// Per-strategy debug logging in the engine
    #[serde(default)]
    pub enable_logging: bool,
    /// Deadline for one whole request, retries included
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_suggestions() -> usize {
    5
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl Default for AutofillPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            require_biometric: false,
            enable_fuzzy_search: true,
            auto_submit: false,
            max_suggestions: default_max_suggestions(),
            enable_inline_suggestions: true,
            enable_logging: false,
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Engine output for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutofillResult {
    /// Best first, at most `max_suggestions`
    pub matches: Vec<PasswordMatch>,
    pub processing_time_ms: u64,
    pub is_success: bool,
    pub error: Option<String>,
    pub context: AutofillContext,
}

impl AutofillResult {
    fn empty(context: &AutofillContext) -> Self {
        Self {
            matches: Vec::new(),
            processing_time_ms: 0,
            is_success: true,
            error: None,
            context: context.clone(),
        }
    }

    fn failed(context: &AutofillContext, error: &AutofillError) -> Self {
        Self {
            is_success: false,
            error: Some(error.to_string()),
            ..Self::empty(context)
        }
    }

    pub fn best_match(&self) -> Option<&PasswordMatch> {
        self.matches.first()
    }

    pub fn high_quality_matches(&self) -> Vec<&PasswordMatch> {
        self.matches.iter().filter(|m| m.is_high_quality()).collect()
    }

    pub fn has_matches(&self) -> bool {
        !self.matches.is_empty()
    }
}

pub struct AutofillEngine {
    source: Arc<dyn CredentialSource>,
    /// Highest priority first
    strategies: Vec<MatchingStrategy>,
    preferences: AutofillPreferences,
    score_threshold: u8,
    recovery: ErrorRecovery,
    metrics: MetricsCollector,
    reporter: ErrorReporter,
}

impl AutofillEngine {
    pub fn builder() -> AutofillEngineBuilder {
        AutofillEngineBuilder::new()
    }

    pub fn preferences(&self) -> &AutofillPreferences {
        &self.preferences
    }

    pub fn strategies(&self) -> &[MatchingStrategy] {
        &self.strategies
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn error_reporter(&self) -> &ErrorReporter {
        &self.reporter
    }

    /// Process one fill request. Never fails: errors and timeouts come back
    /// as an empty result with `is_success == false`.
    pub async fn process_request(&self, context: &AutofillContext) -> AutofillResult {
        let tracker = PerformanceTracker::start("process_request");

        info!(
            target: "autofill::request",
            package = context.package_name.as_str(),
            domain = context.web_domain().unwrap_or("N/A"),
            is_web_view = context.is_web_view,
            "processing fill request"
        );
        self.metrics
            .record_request(&context.package_name, context.web_domain());

        if !self.preferences.enabled {
            debug!(target: "autofill::request", "autofill disabled in preferences");
            return AutofillResult::empty(context);
        }

        // One deadline spans every attempt and the backoff between them.
        let mut result = self
            .recovery
            .execute_with_recovery(
                move || self.process_internal(context),
                |err| self.fallback(context, err),
            )
            .await;

        let duration_ms = tracker.finish();
        if !result.is_success {
            result.processing_time_ms = duration_ms;
        }
        result
    }

    /// [`process_request`](Self::process_request) that gives up as soon as
    /// `cancel` fires. A cancelled request is counted and yields
    /// [`AutofillError::Cancelled`] instead of a result.
    pub async fn process_request_cancellable(
        &self,
        context: &AutofillContext,
        cancel: &CancellationToken,
    ) -> CoreResult<AutofillResult> {
        if cancel.is_cancelled() {
            return Err(self.on_cancelled(context));
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(self.on_cancelled(context)),
            result = self.process_request(context) => Ok(result),
        }
    }

    pub async fn get_best_match(&self, context: &AutofillContext) -> Option<PasswordMatch> {
        self.process_request(context).await.best_match().cloned()
    }

    /// Highest score any supporting strategy gives `entry`, 0 when none does.
    pub fn verify_match(&self, entry: &PasswordEntry, context: &AutofillContext) -> u8 {
        self.strategies
            .iter()
            .filter(|strategy| strategy.supports(context))
            .map(|strategy| strategy.calculate_score(entry, context))
            .max()
            .unwrap_or(0)
    }

    async fn process_internal(&self, context: &AutofillContext) -> CoreResult<AutofillResult> {
        let tracker = PerformanceTracker::start("process_internal");

        let candidates = self.fetch_candidates(context).await?;
        debug!(target: "autofill::matching", count = candidates.len(), "fetched candidates");

        if candidates.is_empty() {
            self.metrics.record_no_match();
            return Ok(AutofillResult {
                processing_time_ms: tracker.elapsed_ms(),
                ..AutofillResult::empty(context)
            });
        }

        let matching = PerformanceTracker::start("apply_strategies");
        let ranked = rank_matches(self.apply_strategies(context, &candidates), self.score_threshold);
        let matching_ms = matching.finish();
        let duration_ms = tracker.elapsed_ms();

        match ranked.first() {
            Some(best) => {
                if best.match_type.is_exact() {
                    self.metrics.record_exact_match();
                } else {
                    self.metrics.record_fuzzy_match();
                }
                self.metrics.record_success(duration_ms, matching_ms);
            }
            None => self.metrics.record_no_match(),
        }

        let mut matches = ranked;
        matches.truncate(self.preferences.max_suggestions);

        info!(
            target: "autofill::request",
            match_count = matches.len(),
            duration_ms,
            best_score = matches.first().map(|m| m.score).unwrap_or(0),
            "fill request processed"
        );

        Ok(AutofillResult {
            matches,
            processing_time_ms: duration_ms,
            is_success: true,
            error: None,
            context: context.clone(),
        })
    }

    async fn fetch_candidates(&self, context: &AutofillContext) -> CoreResult<Vec<Arc<PasswordEntry>>> {
        let tracker = PerformanceTracker::start("fetch_candidates");

        let fetched = if self.preferences.enable_fuzzy_search {
            self.source.get_all_passwords().await
        } else {
            let package = Some(context.package_name.as_str()).filter(|p| !p.trim().is_empty());
            self.source.search_passwords(context.web_domain(), package).await
        };
        tracker.finish();

        fetched.map_err(|err| {
            error!(
                target: "autofill::error",
                package = context.package_name.as_str(),
                error = %err,
                "candidate fetch failed"
            );
            AutofillError::from(err)
        })
    }

    /// Run every supporting strategy and keep only the first match each
    /// credential gets.
    fn apply_strategies(
        &self,
        context: &AutofillContext,
        candidates: &[Arc<PasswordEntry>],
    ) -> Vec<PasswordMatch> {
        let mut all_matches = Vec::new();
        let mut seen = HashSet::new();

        for strategy in &self.strategies {
            if !strategy.supports(context) {
                if self.preferences.enable_logging {
                    debug!(target: "autofill::matching", strategy = strategy.name(), "strategy does not support context");
                }
                continue;
            }

            let matches = strategy.match_candidates(context, candidates);
            let found = matches.len();
            for m in matches {
                if seen.insert(m.entry.id) {
                    all_matches.push(m);
                }
            }

            if self.preferences.enable_logging {
                debug!(
                    target: "autofill::matching",
                    strategy = strategy.name(),
                    matches = found,
                    total_matches = all_matches.len(),
                    "strategy finished"
                );
            }
        }

        all_matches
    }

    fn fallback(&self, context: &AutofillContext, err: AutofillError) -> AutofillResult {
        self.metrics.record_failure(err.kind());
        self.reporter.report(&err, Some(context.primary_key()));
        warn!(
            target: "autofill::error",
            error_kind = err.kind(),
            error = %err,
            "request failed, returning empty result"
        );
        AutofillResult::failed(context, &err)
    }

    fn on_cancelled(&self, context: &AutofillContext) -> AutofillError {
        let err = AutofillError::Cancelled;
        self.metrics.record_cancellation();
        info!(
            target: "autofill::request",
            package = context.package_name.as_str(),
            error_kind = err.kind(),
            "fill request cancelled"
        );
        err
    }
}

/// Builds an [`AutofillEngine`]; a data source and at least one strategy are
/// required.
pub struct AutofillEngineBuilder {
    source: Option<Arc<dyn CredentialSource>>,
    strategies: Vec<MatchingStrategy>,
    preferences: AutofillPreferences,
    retry: RetryPolicy,
    score_threshold: u8,
    metrics: Option<MetricsCollector>,
    reporter: Option<ErrorReporter>,
}

impl Default for AutofillEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AutofillEngineBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            strategies: Vec::new(),
            preferences: AutofillPreferences::default(),
            retry: RetryPolicy::default(),
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            metrics: None,
            reporter: None,
        }
    }

    pub fn data_source(self, source: impl CredentialSource + 'static) -> Self {
        self.shared_data_source(Arc::new(source))
    }

    pub fn shared_data_source(mut self, source: Arc<dyn CredentialSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn strategy(mut self, strategy: MatchingStrategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn default_strategies(mut self) -> Self {
        self.strategies.extend(MatchingStrategy::defaults());
        self
    }

    pub fn preferences(mut self, preferences: AutofillPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn score_threshold(mut self, score_threshold: u8) -> Self {
        self.score_threshold = score_threshold;
        self
    }

    /// Preferences, retry policy and score threshold from a config document.
    pub fn config(self, config: &CoreConfig) -> Self {
        self.preferences(config.preferences.clone())
            .retry_policy(config.retry)
            .score_threshold(config.score_threshold)
    }

    /// Record into an existing collector instead of a fresh one.
    pub fn metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn error_reporter(mut self, reporter: ErrorReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn build(self) -> CoreResult<AutofillEngine> {
        let source = self.source.ok_or_else(|| {
            AutofillError::Configuration("a credential data source must be set".to_string())
        })?;
        if self.strategies.is_empty() {
            return Err(AutofillError::Configuration(
                "at least one matching strategy must be added".to_string(),
            ));
        }

        let mut strategies = self.strategies;
        strategies.sort_by(|a, b| b.priority().cmp(&a.priority()));

        Ok(AutofillEngine {
            source,
            strategies,
            recovery: ErrorRecovery::new(self.retry).with_timeout(self.preferences.timeout_ms),
            preferences: self.preferences,
            score_threshold: self.score_threshold,
            metrics: self.metrics.unwrap_or_default(),
            reporter: self.reporter.unwrap_or_default(),
        })
    }
}
