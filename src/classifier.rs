//! First-time vs returning classification
//!
//! Each member's visits are ordered by `(timestamp, visit id)` and only the
//! earliest is marked first-time. Numeric ids compare as numbers and sort
//! ahead of other ids. This runs over a member's full visit history;
//! callers filter to the report window afterwards, so a visit before the window
//! still turns later in-window visits into returning ones.

use crate::metrics::VisitFact;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Visit with its first-time flag
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedVisit {
    pub fact: VisitFact,
    pub at: DateTime<Utc>,
    pub is_first: bool,
}

/// Classify visits per member. Visits without a timestamp or member are
/// dropped.
///
/// Output is ordered by member, then chronologically.
pub fn classify(facts: impl IntoIterator<Item = VisitFact>) -> Vec<ClassifiedVisit> {
    let mut by_member: BTreeMap<String, Vec<(DateTime<Utc>, VisitFact)>> = BTreeMap::new();
    for fact in facts {
        if let (Some(at), Some(member)) = (fact.at, fact.member.clone()) {
            by_member.entry(member).or_default().push((at, fact));
        }
    }

    let mut classified = Vec::new();
    for (_, mut visits) in by_member {
        visits.sort_by(|(at_a, a), (at_b, b)| at_a.cmp(at_b).then_with(|| compare_ids(&a.id, &b.id)));
        for (i, (at, fact)) in visits.into_iter().enumerate() {
            classified.push(ClassifiedVisit {
                fact,
                at,
                is_first: i == 0,
            });
        }
    }
    classified
}

/// Total order over visit ids: numeric ids by value, then the rest by string
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (numeric_id(a), numeric_id(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn numeric_id(id: &str) -> Option<u128> {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fact(id: &str, member: &str, at: Option<&str>) -> VisitFact {
        VisitFact {
            id: id.into(),
            member: Some(member.into()),
            at: at.map(|s| DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)),
            spend: 10.0,
            savings: 0.0,
            net: 10.0,
            tier: "Gold".into(),
        }
    }

    #[test]
    fn test_exactly_one_first_visit_per_member() {
        let visits = vec![
            fact("v3", "m1", Some("2025-07-01T00:00:00Z")),
            fact("v1", "m1", Some("2025-06-01T00:00:00Z")),
            fact("v2", "m2", Some("2025-06-05T00:00:00Z")),
            fact("v4", "m1", Some("2025-06-10T00:00:00Z")),
        ];
        let classified = classify(visits);
        let firsts: Vec<&str> = classified
            .iter()
            .filter(|c| c.is_first)
            .map(|c| c.fact.id.as_str())
            .collect();
        assert_eq!(firsts, vec!["v1", "v2"]);
        assert_eq!(classified.len(), 4);
    }

    #[test]
    fn test_identical_timestamps_break_ties_by_id() {
        let visits = vec![
            fact("b", "m1", Some("2025-06-20T09:00:00Z")),
            fact("a", "m1", Some("2025-06-20T09:00:00Z")),
        ];
        let classified = classify(visits);
        assert!(classified.iter().find(|c| c.fact.id == "a").unwrap().is_first);
        assert!(!classified.iter().find(|c| c.fact.id == "b").unwrap().is_first);
    }

    #[test]
    fn test_numeric_ids_tie_break_by_value() {
        let visits = vec![
            fact("10", "m1", Some("2025-06-20T09:00:00Z")),
            fact("9", "m1", Some("2025-06-20T09:00:00Z")),
        ];
        let classified = classify(visits);
        let order: Vec<&str> = classified.iter().map(|c| c.fact.id.as_str()).collect();
        assert_eq!(order, vec!["9", "10"]);
        assert!(classified[0].is_first);
    }

    #[test]
    fn test_mixed_ids_order_is_total() {
        let mut ids = vec!["1a", "10", "9", "b", "007", "7"];
        ids.sort_by(|a, b| compare_ids(a, b));
        assert_eq!(ids, vec!["007", "7", "9", "10", "1a", "b"]);
    }

    #[test]
    fn test_undated_visits_are_dropped() {
        let visits = vec![
            fact("x", "m1", None),
            fact("y", "m1", Some("2025-06-20T09:00:00Z")),
        ];
        let classified = classify(visits);
        assert_eq!(classified.len(), 1);
        assert_eq!(classified[0].fact.id, "y");
        assert!(classified[0].is_first);
    }
}
