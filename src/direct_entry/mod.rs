//! Fill-assist mode staging for repeated requests against one form.
//!
//! Within one interaction cycle the assist escalates from the trigger entry
//! alone, to trigger plus the last filled credential, to the last filled
//! credential alone. Every call is a pure function of the request, the
//! cached cycle state and the clock; nothing here blocks or fails.

use chrono::Utc;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use tracing::{debug, trace};

use crate::bounded_cache::BoundedCache;
use crate::config::DirectEntryConfig;

/// Highest stage a cycle can reach.
pub const MAX_STAGE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    TriggerOnly,
    TriggerAndLastFilled,
    LastFilledOnly,
}

impl Mode {
    pub fn from_stage(stage: u8) -> Self {
        match stage {
            0 => Mode::TriggerOnly,
            1 => Mode::TriggerAndLastFilled,
            _ => Mode::LastFilledOnly,
        }
    }

    pub fn stage(self) -> u8 {
        match self {
            Mode::TriggerOnly => 0,
            Mode::TriggerAndLastFilled => 1,
            Mode::LastFilledOnly => 2,
        }
    }
}

/// Why a decision came out the way it did. Displays as the stable snake_case
/// label hosts log and compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionReason {
    InvalidCycleKey,
    NewCycle,
    NoLastFilled,
    RequestOrdinalRollback,
    FieldSignatureChanged,
    DuplicateRequest,
    Advance { from: u8, to: u8 },
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionReason::InvalidCycleKey => f.write_str("invalid_cycle_key"),
            DecisionReason::NewCycle => f.write_str("new_cycle"),
            DecisionReason::NoLastFilled => f.write_str("no_last_filled"),
            DecisionReason::RequestOrdinalRollback => f.write_str("request_ordinal_rollback"),
            DecisionReason::FieldSignatureChanged => f.write_str("field_signature_changed"),
            DecisionReason::DuplicateRequest => f.write_str("duplicate_request"),
            DecisionReason::Advance { from, to } => write!(f, "advance_from_{from}_to_{to}"),
        }
    }
}

impl Serialize for DecisionReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub mode: Mode,
    pub stage: u8,
    pub reason: DecisionReason,
}

impl Decision {
    fn at_stage(stage: u8, reason: DecisionReason) -> Self {
        Self {
            mode: Mode::from_stage(stage),
            stage,
            reason,
        }
    }
}

/// One request as seen by the mode resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectEntryRequest {
    /// Caller-built identity of the cycle (session type, domain, field
    /// signature). Blank keys are rejected.
    pub cycle_key: String,
    /// A credential was filled earlier and can be offered again
    pub has_last_filled: bool,
    /// Monotonic per page load; going backwards means the page reloaded
    pub request_ordinal: u64,
    /// Changes whenever the interaction moves forward
    pub progress_token: String,
    #[serde(default)]
    pub session_marker: Option<String>,
    /// Opaque summary of the form's field set
    pub field_signature_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CycleState {
    stage: u8,
    request_ordinal: u64,
    progress_token: String,
    session_marker: Option<String>,
    field_signature_key: String,
}

impl CycleState {
    fn fresh(request: &DirectEntryRequest) -> Self {
        Self::at_stage(0, request)
    }

    fn at_stage(stage: u8, request: &DirectEntryRequest) -> Self {
        Self {
            stage,
            request_ordinal: request.request_ordinal,
            progress_token: request.progress_token.clone(),
            session_marker: request.session_marker.clone(),
            field_signature_key: request.field_signature_key.clone(),
        }
    }
}

/// Not internally synchronized; one instance per service connection.
#[derive(Debug)]
pub struct DirectEntryModeResolver {
    cycles: BoundedCache<String, CycleState>,
}

impl Default for DirectEntryModeResolver {
    fn default() -> Self {
        Self::new(DirectEntryConfig::default())
    }
}

impl DirectEntryModeResolver {
    pub fn new(config: DirectEntryConfig) -> Self {
        Self {
            cycles: BoundedCache::new(config.cycle_ttl_ms, config.max_size),
        }
    }

    pub fn clear(&mut self) {
        self.cycles.clear();
    }

    /// Number of tracked cycles.
    pub fn len(&self) -> usize {
        self.cycles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }

    pub fn resolve(&mut self, request: &DirectEntryRequest) -> Decision {
        self.resolve_at(request, Utc::now().timestamp_millis())
    }

    /// Resolve with an explicit clock (epoch milliseconds).
    pub fn resolve_at(&mut self, request: &DirectEntryRequest, now: i64) -> Decision {
        if request.cycle_key.trim().is_empty() {
            return Decision::at_stage(0, DecisionReason::InvalidCycleKey);
        }

        // Expired cycles are gone after this, so they start over as new ones.
        let evicted = self.cycles.evict(now);
        if evicted.total() > 0 {
            trace!(
                target: "autofill::direct_entry",
                expired = evicted.expired,
                overflow = evicted.overflow,
                "evicted cycles"
            );
        }

        let decision = if !request.has_last_filled {
            // Nothing to offer again: the cycle ends and the next filled
            // request starts over from the trigger alone.
            match self.cycles.remove(&request.cycle_key) {
                Some(_) => Decision::at_stage(0, DecisionReason::NoLastFilled),
                None => Decision::at_stage(0, DecisionReason::NewCycle),
            }
        } else {
            let key = request.cycle_key.clone();
            let (state, decision) = match self.cycles.get(&key) {
                None => (
                    CycleState::fresh(request),
                    Decision::at_stage(0, DecisionReason::NewCycle),
                ),
                Some(previous) => Self::transition(previous, request),
            };
            self.cycles.insert(key, state, now);
            decision
        };

        debug!(
            target: "autofill::direct_entry",
            cycle = request.cycle_key.as_str(),
            stage = decision.stage,
            reason = %decision.reason,
            "resolved direct entry mode"
        );
        decision
    }

    fn transition(previous: &CycleState, request: &DirectEntryRequest) -> (CycleState, Decision) {
        let reset = if request.request_ordinal < previous.request_ordinal {
            Some(DecisionReason::RequestOrdinalRollback)
        } else if request.field_signature_key != previous.field_signature_key {
            Some(DecisionReason::FieldSignatureChanged)
        } else {
            None
        };
        if let Some(reason) = reset {
            return (CycleState::fresh(request), Decision::at_stage(0, reason));
        }

        if request.progress_token == previous.progress_token {
            return (
                CycleState::at_stage(previous.stage, request),
                Decision::at_stage(previous.stage, DecisionReason::DuplicateRequest),
            );
        }

        let next = (previous.stage + 1).min(MAX_STAGE);
        (
            CycleState::at_stage(next, request),
            Decision::at_stage(
                next,
                DecisionReason::Advance {
                    from: previous.stage,
                    to: next,
                },
            ),
        )
    }
}

#[cfg(test)]
mod tests;
