//! Tests for the direct-entry stage machine.

use super::*;
use proptest::prelude::*;

fn request(ordinal: u64, token: &str) -> DirectEntryRequest {
    DirectEntryRequest {
        cycle_key: "web|example.com|sig-a".to_string(),
        has_last_filled: true,
        request_ordinal: ordinal,
        progress_token: token.to_string(),
        session_marker: Some("session-1".to_string()),
        field_signature_key: "sig-a".to_string(),
    }
}

fn labels(decisions: &[Decision]) -> Vec<String> {
    decisions.iter().map(|d| d.reason.to_string()).collect()
}

#[test]
fn test_stage_progression() {
    let mut resolver = DirectEntryModeResolver::default();

    let decisions: Vec<Decision> = (1..=3)
        .map(|n| resolver.resolve_at(&request(n, &format!("t{n}")), n as i64 * 100))
        .collect();

    let modes: Vec<Mode> = decisions.iter().map(|d| d.mode).collect();
    assert_eq!(
        modes,
        vec![Mode::TriggerOnly, Mode::TriggerAndLastFilled, Mode::LastFilledOnly]
    );
    let stages: Vec<u8> = decisions.iter().map(|d| d.stage).collect();
    assert_eq!(stages, vec![0, 1, 2]);
    assert_eq!(
        labels(&decisions),
        vec!["new_cycle", "advance_from_0_to_1", "advance_from_1_to_2"]
    );
}

#[test]
fn test_stage_caps_at_last_filled_only() {
    let mut resolver = DirectEntryModeResolver::default();
    for n in 1..=3 {
        resolver.resolve_at(&request(n, &format!("t{n}")), 0);
    }

    let decision = resolver.resolve_at(&request(4, "t4"), 10);

    assert_eq!(decision.stage, 2);
    assert_eq!(decision.mode, Mode::LastFilledOnly);
    assert_eq!(decision.reason.to_string(), "advance_from_2_to_2");
}

#[test]
fn test_refresh_resets_on_ordinal_rollback() {
    let mut resolver = DirectEntryModeResolver::default();
    resolver.resolve_at(&request(1, "t1"), 0);
    assert_eq!(resolver.resolve_at(&request(2, "t2"), 10).stage, 1);

    let mut refreshed = request(1, "t3");
    refreshed.session_marker = Some("session-2".to_string());
    let decision = resolver.resolve_at(&refreshed, 20);

    assert_eq!(decision.stage, 0);
    assert_eq!(decision.mode, Mode::TriggerOnly);
    assert_eq!(decision.reason, DecisionReason::RequestOrdinalRollback);
    assert_eq!(decision.reason.to_string(), "request_ordinal_rollback");

    // The reset state is the new baseline.
    assert_eq!(resolver.resolve_at(&request(2, "t4"), 30).stage, 1);
}

#[test]
fn test_duplicate_request_does_not_advance() {
    let mut resolver = DirectEntryModeResolver::default();
    resolver.resolve_at(&request(1, "t1"), 0);
    resolver.resolve_at(&request(2, "t2"), 10);

    let decision = resolver.resolve_at(&request(3, "t2"), 20);

    assert_eq!(decision.stage, 1);
    assert_eq!(decision.reason.to_string(), "duplicate_request");
}

#[test]
fn test_duplicate_at_first_request_stays_at_zero() {
    let mut resolver = DirectEntryModeResolver::default();
    resolver.resolve_at(&request(1, "t1"), 0);

    let decision = resolver.resolve_at(&request(1, "t1"), 5);

    assert_eq!(decision.stage, 0);
    assert_eq!(decision.reason, DecisionReason::DuplicateRequest);
}

#[test]
fn test_field_signature_change_resets() {
    let mut resolver = DirectEntryModeResolver::default();
    resolver.resolve_at(&request(1, "t1"), 0);
    resolver.resolve_at(&request(2, "t2"), 10);

    let mut changed = request(3, "t3");
    changed.field_signature_key = "sig-b".to_string();
    let decision = resolver.resolve_at(&changed, 20);

    assert_eq!(decision.stage, 0);
    assert_eq!(decision.reason.to_string(), "field_signature_changed");
}

#[test]
fn test_ttl_expiry_starts_new_cycle() {
    let mut resolver = DirectEntryModeResolver::new(DirectEntryConfig {
        cycle_ttl_ms: 1_000,
        max_size: 16,
    });

    assert_eq!(resolver.resolve_at(&request(1, "t1"), 1_000).stage, 0);
    assert_eq!(resolver.resolve_at(&request(2, "t2"), 1_500).stage, 1);

    let decision = resolver.resolve_at(&request(3, "t3"), 3_001);

    assert_eq!(decision.stage, 0);
    assert_eq!(decision.reason, DecisionReason::NewCycle);
}

#[test]
fn test_exactly_at_ttl_still_same_cycle() {
    let mut resolver = DirectEntryModeResolver::new(DirectEntryConfig {
        cycle_ttl_ms: 1_000,
        max_size: 16,
    });
    resolver.resolve_at(&request(1, "t1"), 0);

    assert_eq!(resolver.resolve_at(&request(2, "t2"), 1_000).stage, 1);
}

#[test]
fn test_no_last_filled_forces_trigger_only() {
    let mut resolver = DirectEntryModeResolver::default();
    resolver.resolve_at(&request(1, "t1"), 0);
    resolver.resolve_at(&request(2, "t2"), 10);

    let mut nothing_filled = request(3, "t3");
    nothing_filled.has_last_filled = false;
    let decision = resolver.resolve_at(&nothing_filled, 20);

    assert_eq!(decision.mode, Mode::TriggerOnly);
    assert_eq!(decision.reason.to_string(), "no_last_filled");
    assert!(resolver.is_empty());

    // The cycle is gone, so a repeat has nothing to report against.
    nothing_filled.request_ordinal = 4;
    let repeat = resolver.resolve_at(&nothing_filled, 30);
    assert_eq!(repeat.stage, 0);
    assert_eq!(repeat.reason, DecisionReason::NewCycle);
}

#[test]
fn test_progression_restarts_after_no_last_filled() {
    let mut resolver = DirectEntryModeResolver::default();
    let mut nothing_filled = request(1, "t0");
    nothing_filled.has_last_filled = false;
    resolver.resolve_at(&nothing_filled, 0);

    let decisions: Vec<Decision> = (2..=4)
        .map(|n| resolver.resolve_at(&request(n, &format!("t{}", n - 1)), n as i64 * 100))
        .collect();

    let stages: Vec<u8> = decisions.iter().map(|d| d.stage).collect();
    assert_eq!(stages, vec![0, 1, 2]);
    assert_eq!(
        labels(&decisions),
        vec!["new_cycle", "advance_from_0_to_1", "advance_from_1_to_2"]
    );
}

#[test]
fn test_first_request_without_last_filled_is_new_cycle() {
    let mut resolver = DirectEntryModeResolver::default();
    let mut first = request(1, "t1");
    first.has_last_filled = false;

    let decision = resolver.resolve_at(&first, 0);

    assert_eq!(decision.stage, 0);
    assert_eq!(decision.reason, DecisionReason::NewCycle);
    assert!(resolver.is_empty());
}

#[test]
fn test_blank_cycle_key_touches_nothing() {
    let mut resolver = DirectEntryModeResolver::default();
    let mut blank = request(1, "t1");
    blank.cycle_key = "  ".to_string();

    let decision = resolver.resolve_at(&blank, 0);

    assert_eq!(decision.stage, 0);
    assert_eq!(decision.reason.to_string(), "invalid_cycle_key");
    assert!(resolver.is_empty());
}

#[test]
fn test_cycles_are_independent() {
    let mut resolver = DirectEntryModeResolver::default();
    resolver.resolve_at(&request(1, "t1"), 0);
    resolver.resolve_at(&request(2, "t2"), 10);

    let mut other = request(1, "t1");
    other.cycle_key = "app|com.example|sig-a".to_string();

    assert_eq!(resolver.resolve_at(&other, 20).reason, DecisionReason::NewCycle);
    assert_eq!(resolver.len(), 2);

    resolver.clear();
    assert!(resolver.is_empty());
}

#[test]
fn test_decision_serializes_labels() {
    let decision = Decision::at_stage(1, DecisionReason::Advance { from: 0, to: 1 });
    let json = serde_json::to_string(&decision).unwrap();
    assert_eq!(
        json,
        r#"{"mode":"TRIGGER_AND_LAST_FILLED","stage":1,"reason":"advance_from_0_to_1"}"#
    );
}

proptest! {
    #[test]
    fn prop_cycle_cache_bounded_and_drops_oldest(
        max_size in 1usize..10,
        keys in proptest::collection::vec(0u8..40, 1..120),
    ) {
        let mut resolver = DirectEntryModeResolver::new(DirectEntryConfig {
            cycle_ttl_ms: i64::MAX / 2,
            max_size,
        });

        for (tick, key) in keys.iter().enumerate() {
            let mut req = request(tick as u64, &format!("t{tick}"));
            req.cycle_key = format!("cycle-{key}");
            resolver.resolve_at(&req, tick as i64);
            prop_assert!(resolver.len() <= max_size);
        }

        let mut newest: Vec<u8> = Vec::new();
        for key in keys.iter().rev() {
            if !newest.contains(key) {
                newest.push(*key);
            }
            if newest.len() == max_size {
                break;
            }
        }
        for key in newest {
            let cycle_key = format!("cycle-{}", key);
            prop_assert!(resolver.cycles.contains_key(&cycle_key));
        }
    }

    #[test]
    fn prop_stage_never_exceeds_max_and_mode_tracks_stage(
        steps in proptest::collection::vec((any::<bool>(), 0u64..5, 0u8..3, any::<bool>()), 1..60),
    ) {
        let mut resolver = DirectEntryModeResolver::default();
        for (tick, (has_last_filled, ordinal, token, same_signature)) in steps.into_iter().enumerate() {
            let mut req = request(ordinal, &format!("t{token}"));
            req.has_last_filled = has_last_filled;
            if !same_signature {
                req.field_signature_key = "sig-b".to_string();
            }
            let decision = resolver.resolve_at(&req, tick as i64);
            prop_assert!(decision.stage <= MAX_STAGE);
            prop_assert_eq!(decision.mode.stage(), decision.stage);
            if !has_last_filled {
                prop_assert_eq!(decision.stage, 0);
            }
        }
    }
}
