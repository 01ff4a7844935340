//! Autofill Core Library
//!
//! Platform-independent decision core for password-manager autofill:
//! - **matching**: Scores stored credentials against a fill request (domain, package, fuzzy)
//! - **engine**: Runs a request end to end with retry, deadline, cancellation and metrics
//! - **trigger**: Recovers username/password fields lost between re-parses of one form
//! - **direct_entry**: Stages the fill-assist mode across repeated requests in one cycle
//!
//! The platform layer owns the view/DOM parsing, the vault and all UI. It
//! hands this library parsed fields and request context, and presents what
//! comes back.
//!
//! # Example (conceptual)
//! ```ignore
//! // Rank credentials for a login page
//! let engine = AutofillEngine::builder()
//!     .data_source(vault_source)
//!     .default_strategies()
//!     .config(&CoreConfig::from_json(settings_json)?)
//!     .build()?;
//! let result = engine.process_request(&AutofillContext::for_web("com.android.chrome", "github.com")).await;
//!
//! // Repair a re-parse that lost the password field
//! let resolved = trigger_resolver.resolve(ResolveInput::new(parsed, "com.example.app"));
//!
//! // Pick the assist mode for this request
//! let decision = mode_resolver.resolve(&request);
//! ```

pub mod bounded_cache;
pub mod config;
pub mod direct_entry;
pub mod engine;
pub mod error;
pub mod form;
pub mod matching;
pub mod metrics;
pub mod trigger;

pub use bounded_cache::{BoundedCache, EvictionStats};
pub use config::{CoreConfig, DirectEntryConfig, TriggerResolverConfig};
pub use direct_entry::{Decision, DecisionReason, DirectEntryModeResolver, DirectEntryRequest, Mode};
pub use engine::{
    AutofillEngine, AutofillEngineBuilder, AutofillPreferences, AutofillResult,
    CachedCredentialSource, CredentialSource, ErrorRecord, ErrorRecovery, ErrorReporter,
    InMemoryCredentialSource, RetryPolicy,
};
pub use error::{AutofillError, CoreResult, SourceError};
pub use form::{Accuracy, FieldHint, FieldId, ParsedItem, ParsedStructure};
pub use matching::{
    extract_domain, extract_root_domain, rank_matches, AutofillContext, MatchType,
    MatchingStrategy, PasswordEntry, PasswordMatch, DEFAULT_SCORE_THRESHOLD,
};
pub use metrics::{MetricsCollector, MetricsSnapshot, PerformanceTracker};
pub use trigger::{AutofillTriggerResolver, ResolveInput, ResolveResult};
