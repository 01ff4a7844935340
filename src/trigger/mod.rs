//! Session-scoped recovery of credential field targets.
//!
//! The platform re-parses the form on every fill callback, and a re-parse
//! sometimes misses a username or password field that was there a moment
//! ago. The resolver remembers, per logical form, which field ids held the
//! username and the password, and puts a missing one back when the current
//! request is clearly about the same form.
//!
//! Instances are not internally synchronized: keep one per service
//! connection and call it from one logical thread.

mod merge;

pub use merge::merge_credential_items;

use chrono::Utc;
use tracing::{debug, trace};

use crate::bounded_cache::BoundedCache;
use crate::config::TriggerResolverConfig;
use crate::form::{Accuracy, FieldHint, FieldId, ParsedItem, ParsedStructure};
use crate::matching::normalize_host;

/// Everything known about one fill request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveInput {
    pub parsed_structure: ParsedStructure,
    /// Targets found by the compatibility heuristics
    pub compatibility_targets: Vec<ParsedItem>,
    /// Targets remembered from earlier fills of this form
    pub historical_targets: Vec<ParsedItem>,
    pub package_name: String,
    pub web_domain: Option<String>,
    /// The request shows a password right now, even if the parser missed it
    pub has_password_signal_now: bool,
    pub activity_class_name: Option<String>,
    pub focused_field_id: Option<FieldId>,
}

impl ResolveInput {
    pub fn new(parsed_structure: ParsedStructure, package_name: impl Into<String>) -> Self {
        Self {
            parsed_structure,
            compatibility_targets: Vec::new(),
            historical_targets: Vec::new(),
            package_name: package_name.into(),
            web_domain: None,
            has_password_signal_now: false,
            activity_class_name: None,
            focused_field_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolveResult {
    /// The parsed structure with heuristic and recovered items merged in
    pub parsed_structure: ParsedStructure,
    /// Credential targets of `parsed_structure`
    pub targets: Vec<ParsedItem>,
    pub compatibility_added: usize,
    pub historical_added: usize,
    pub session_recovery_added: usize,
    pub can_recover_from_session_now: bool,
}

/// Remembered field identity for one logical form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SessionTargets {
    username_id: Option<FieldId>,
    password_id: Option<FieldId>,
}

impl SessionTargets {
    fn usable_pair(&self) -> Option<(&FieldId, &FieldId)> {
        Some((self.username_id.as_ref()?, self.password_id.as_ref()?))
    }
}

#[derive(Debug)]
pub struct AutofillTriggerResolver {
    sessions: BoundedCache<String, SessionTargets>,
}

impl Default for AutofillTriggerResolver {
    fn default() -> Self {
        Self::new(TriggerResolverConfig::default())
    }
}

impl AutofillTriggerResolver {
    pub fn new(config: TriggerResolverConfig) -> Self {
        Self {
            sessions: BoundedCache::new(config.session_ttl_ms, config.max_sessions),
        }
    }

    pub fn clear_session(&mut self) {
        self.sessions.clear();
    }

    /// Number of remembered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn resolve(&mut self, input: ResolveInput) -> ResolveResult {
        self.resolve_at(input, Utc::now().timestamp_millis())
    }

    /// Resolve with an explicit clock (epoch milliseconds).
    pub fn resolve_at(&mut self, input: ResolveInput, now: i64) -> ResolveResult {
        let evicted = self.sessions.evict(now);
        if evicted.total() > 0 {
            trace!(
                target: "autofill::trigger",
                expired = evicted.expired,
                overflow = evicted.overflow,
                "evicted sessions"
            );
        }

        let session_key = build_session_key(
            &input.package_name,
            input.web_domain.as_deref(),
            input.parsed_structure.web_view,
            input.activity_class_name.as_deref(),
        );
        let cached = self.sessions.get(&session_key).cloned();

        let (items, compatibility_added) =
            merge_credential_items(&input.parsed_structure.items, &input.compatibility_targets);
        let (items, historical_added) = merge_credential_items(&items, &input.historical_targets);
        let mut structure = input.parsed_structure.with_items(items);
        let mut targets = structure.credential_targets();

        let can_recover = cached
            .as_ref()
            .map(|session| should_recover(&targets, session, input.focused_field_id.as_ref()))
            .unwrap_or(false);

        let mut session_recovery_added = 0;
        if let Some(session) = cached.as_ref().filter(|_| can_recover) {
            let recovered = recovery_items(&targets, session);
            if !recovered.is_empty() {
                let (merged, added) = merge_credential_items(&structure.items, &recovered);
                structure.items = merged;
                session_recovery_added = added;
                targets = structure.credential_targets();
            }
        }

        self.update_session(
            session_key.clone(),
            cached.as_ref(),
            &targets,
            input.has_password_signal_now,
            now,
        );

        debug!(
            target: "autofill::trigger",
            session = session_key.as_str(),
            targets = targets.len(),
            compatibility_added,
            historical_added,
            session_recovery_added,
            can_recover,
            "resolved fill targets"
        );

        ResolveResult {
            parsed_structure: structure,
            targets,
            compatibility_added,
            historical_added,
            session_recovery_added,
            can_recover_from_session_now: can_recover,
        }
    }

    fn update_session(
        &mut self,
        session_key: String,
        cached: Option<&SessionTargets>,
        targets: &[ParsedItem],
        has_password_signal_now: bool,
        now: i64,
    ) {
        let best_username = best_target(targets, FieldHint::is_username);
        let best_password = best_target(targets, FieldHint::is_password);
        let cached_password = cached.and_then(|s| s.password_id.as_ref());

        if !has_password_signal_now && best_password.is_none() && cached_password.is_none() {
            return;
        }

        let username = best_username.or_else(|| cached.and_then(|s| s.username_id.clone()));
        let password = best_password.or_else(|| cached_password.cloned());
        if username.is_none() && password.is_none() {
            return;
        }

        // One field cannot hold both roles.
        let password = password.filter(|id| Some(id) != username.as_ref());
        self.sessions.insert(
            session_key,
            SessionTargets {
                username_id: username,
                password_id: password,
            },
            now,
        );
    }
}

/// `web:<host>` for web views with a known domain, else
/// `app:<package>[:<activity>]`.
fn build_session_key(
    package_name: &str,
    domain: Option<&str>,
    is_web_view: bool,
    activity_class_name: Option<&str>,
) -> String {
    if is_web_view {
        if let Some(host) = domain.and_then(normalize_host) {
            return format!("web:{host}");
        }
    }

    let package = package_name.trim().to_lowercase();
    match activity_class_name
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
    {
        Some(activity) => format!("app:{package}:{activity}"),
        None => format!("app:{package}"),
    }
}

fn should_recover(targets: &[ParsedItem], session: &SessionTargets, focused: Option<&FieldId>) -> bool {
    let Some((username_id, password_id)) = session.usable_pair() else {
        return false;
    };

    let has_username = targets.iter().any(|t| t.hint.is_username());
    let has_password = targets.iter().any(|t| t.hint.is_password());
    if has_username && has_password {
        return false;
    }

    if focused.is_some_and(|id| id == username_id || id == password_id) {
        return true;
    }
    targets
        .iter()
        .any(|t| &t.id == username_id || &t.id == password_id)
}

fn recovery_items(targets: &[ParsedItem], session: &SessionTargets) -> Vec<ParsedItem> {
    let has_username = targets.iter().any(|t| t.hint.is_username());
    let has_password = targets.iter().any(|t| t.hint.is_password());
    let is_present = |id: &FieldId| targets.iter().any(|t| &t.id == id);

    let mut recovered = Vec::new();
    if let Some(id) = session.username_id.as_ref() {
        if !has_username && !is_present(id) {
            recovered.push(recovery_item(id, FieldHint::Username, recovered.len()));
        }
    }
    if let Some(id) = session.password_id.as_ref() {
        if !has_password && session.username_id.as_ref() != Some(id) && !is_present(id) {
            recovered.push(recovery_item(id, FieldHint::Password, recovered.len()));
        }
    }
    recovered
}

/// Synthetic target: lowest accuracy, placed after every parsed field.
fn recovery_item(id: &FieldId, hint: FieldHint, order: usize) -> ParsedItem {
    let order = i32::try_from(order).unwrap_or(i32::MAX);
    ParsedItem::new(id.clone(), hint, Accuracy::Lowest).at_index(i32::MAX - order)
}

/// Focused first, then lowest traversal index.
fn best_target(targets: &[ParsedItem], role: fn(FieldHint) -> bool) -> Option<FieldId> {
    targets
        .iter()
        .filter(|t| role(t.hint))
        .min_by_key(|t| (!t.is_focused, t.traversal_index))
        .map(|t| t.id.clone())
}
