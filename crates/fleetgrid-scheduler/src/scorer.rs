//! Stateless scoring utilities shared by the algorithms.
//!
//! Every function returns a value in `0.0..=100.0` for finite inputs.

use std::collections::HashMap;

/// Factor weights used by [`combine_scores`].
pub const FACTOR_WEIGHTS: [(&str, f64); 5] = [
    ("capacity", 0.3),
    ("latency", 0.2),
    ("cost", 0.2),
    ("affinity", 0.2),
    ("spread", 0.1),
];

/// Distance returned for region pairs missing from the table.
pub const UNKNOWN_DISTANCE: f64 = 100.0;

/// Symmetric inter-region distances on a 0–100 scale.
const REGION_DISTANCES: [(&str, &str, f64); 15] = [
    ("us-east-1", "us-west-2", 20.0),
    ("us-east-1", "eu-west-1", 40.0),
    ("us-east-1", "eu-central-1", 45.0),
    ("us-east-1", "ap-southeast-1", 75.0),
    ("us-east-1", "ap-northeast-1", 70.0),
    ("us-west-2", "eu-west-1", 55.0),
    ("us-west-2", "eu-central-1", 60.0),
    ("us-west-2", "ap-southeast-1", 55.0),
    ("us-west-2", "ap-northeast-1", 45.0),
    ("eu-west-1", "eu-central-1", 10.0),
    ("eu-west-1", "ap-southeast-1", 70.0),
    ("eu-west-1", "ap-northeast-1", 80.0),
    ("eu-central-1", "ap-southeast-1", 65.0),
    ("eu-central-1", "ap-northeast-1", 75.0),
    ("ap-southeast-1", "ap-northeast-1", 30.0),
];

/// Weighted average of the known factors present in `scores`. Unknown
/// factors are ignored; with no known factor the result is 0.
pub fn combine_scores(scores: &HashMap<String, f64>) -> f64 {
    let (weighted, total) = FACTOR_WEIGHTS
        .iter()
        .filter_map(|(factor, weight)| scores.get(*factor).map(|score| (score * weight, weight)))
        .fold((0.0, 0.0), |(sum, total), (value, weight)| (sum + value, total + weight));

    if total == 0.0 {
        return 0.0;
    }
    (weighted / total).clamp(0.0, 100.0)
}

/// Rescale `value` from `min..=max` to `0..=100`. A degenerate range is
/// neutral (50).
pub fn normalize_score(value: f64, min: f64, max: f64) -> f64 {
    if min == max {
        return 50.0;
    }
    ((value - min) / (max - min) * 100.0).clamp(0.0, 100.0)
}

/// Distance between two regions. Identical names are 0 apart.
pub fn calculate_distance(a: &str, b: &str) -> f64 {
    if a == b && !a.is_empty() {
        return 0.0;
    }
    REGION_DISTANCES
        .iter()
        .find(|(x, y, _)| (*x == a && *y == b) || (*x == b && *y == a))
        .map_or(UNKNOWN_DISTANCE, |(_, _, distance)| *distance)
}

/// Preference for placing `required` onto a resource with `available` of
/// `total` free.
///
/// Utilization after placement maps onto a curve that favours the moderate
/// band: 0–20% scores 30–50, 20–80% scores 50–90, above 80% falls back from
/// 90 to 50.
pub fn calculate_capacity_score(required: i64, available: i64, total: i64) -> f64 {
    if available < required || total <= 0 {
        return 0.0;
    }

    let used_after = (total - available) as f64 + required as f64;
    let utilization = (used_after / total as f64).clamp(0.0, 1.0);

    if utilization < 0.2 {
        30.0 + utilization / 0.2 * 20.0
    } else if utilization <= 0.8 {
        50.0 + (utilization - 0.2) / 0.6 * 40.0
    } else {
        90.0 - (utilization - 0.8) / 0.2 * 40.0
    }
}
