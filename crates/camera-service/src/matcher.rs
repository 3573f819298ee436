//! Best-effort binding of discovered hardware to authored profiles
//!
//! Hardware identification strings are opaque and vendor-shaped; profiles
//! carry fuzzy rules instead of exact ids. Evaluation is ordered by the
//! explicit rule priority so reordering the profile list can never change
//! which profile wins.

use crate::backend::BackendAvailability;
use crate::profile::{ConfigProfile, DetectionRule, MODEL_WILDCARD};
use crate::types::HardwareFacts;
use std::cmp::Reverse;
use tracing::debug;

/// Pick the best-matching profile for one discovered unit, or `None` when
/// nothing matches (the caller falls back to the active profile or to
/// built-in defaults).
pub fn match_profile<'a>(
    facts: &HardwareFacts,
    candidates: &'a [ConfigProfile],
    availability: &BackendAvailability,
) -> Option<&'a ConfigProfile> {
    let mut ordered: Vec<&ConfigProfile> = candidates.iter().collect();
    // Priority descending, auto rules after non-auto at equal priority;
    // the sort is stable so listed order remains the final tie-break.
    ordered.sort_by_key(|p| (Reverse(p.detection.priority), p.detection.rule.is_auto()));

    for profile in ordered {
        let kind = profile.profile_type.device_kind();
        if kind != facts.kind {
            continue;
        }
        if !availability.supports(kind) {
            continue;
        }
        if rule_matches(&profile.detection.rule, facts) {
            debug!(
                profile_id = %profile.id,
                vendor = %facts.vendor,
                model = %facts.model,
                "detection rule matched"
            );
            return Some(profile);
        }
    }
    None
}

fn rule_matches(rule: &DetectionRule, facts: &HardwareFacts) -> bool {
    match rule {
        DetectionRule::VendorProduct { vendor, product } => {
            contains_ci(&facts.vendor, vendor) && contains_ci(&facts.product, product)
        }
        DetectionRule::BrandModel {
            brand,
            model_pattern,
        } => {
            if !contains_ci(&facts.vendor, brand) {
                return false;
            }
            match model_pattern.strip_suffix(MODEL_WILDCARD) {
                Some(prefix) => contains_ci(&facts.model, prefix),
                None => contains_ci(&facts.model, model_pattern),
            }
        }
        DetectionRule::Auto => true,
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
