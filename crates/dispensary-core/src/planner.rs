//! # Allocation Planner
//!
//! Greedy draw-down over an already ordered list of lots.
//!
//! ```text
//! need = 30        A(20)        B(50)        C(10)
//!                   │            │
//!                   ▼            ▼
//!               take 20      take 10      (need is 0, stop)
//!
//! plan = [(A, 20), (B, 10)]   allocated = 30   unmet = 0
//! ```
//!
//! The planner never re-sorts: FIFO ordering is the Availability
//! Calculator's job, so the same ordered input always yields the same plan.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::availability::BatchAvailability;
use crate::dispense::BatchDraw;

/// One proposed draw from one lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PlannedDraw {
    pub batch_id: String,
    pub batch_number: String,
    #[ts(as = "String")]
    pub expiry_date: NaiveDate,
    pub quantity: i64,
}

/// The proposed draws for one quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AllocationPlan {
    pub draws: Vec<PlannedDraw>,
    pub allocated: i64,
    /// What the shelf could not cover.
    pub unmet: i64,
}

impl AllocationPlan {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.unmet == 0
    }

    /// Turns the plan into submit-ready draws.
    pub fn to_draws(&self) -> Vec<BatchDraw> {
        self.draws
            .iter()
            .map(|d| BatchDraw {
                batch_id: d.batch_id.clone(),
                quantity: d.quantity,
            })
            .collect()
    }
}

/// Plans `quantity` across `ordered` lots, earliest first.
///
/// `Σ draw.quantity == min(quantity, Σ quantity_remaining)`. A non-positive
/// quantity yields an empty plan.
pub fn plan(ordered: &[BatchAvailability], quantity: i64) -> AllocationPlan {
    let requested = quantity.max(0);
    let mut need = requested;
    let mut draws = Vec::new();

    for batch in ordered {
        if need == 0 {
            break;
        }

        let take = need.min(batch.quantity_remaining);
        if take <= 0 {
            continue;
        }

        draws.push(PlannedDraw {
            batch_id: batch.batch_id.clone(),
            batch_number: batch.batch_number.clone(),
            expiry_date: batch.expiry_date,
            quantity: take,
        });
        need -= take;
    }

    AllocationPlan {
        draws,
        allocated: requested - need,
        unmet: need,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn lot(id: &str, qty: i64, expiry_month: u32) -> BatchAvailability {
        BatchAvailability {
            batch_id: id.to_string(),
            batch_number: format!("LOT-{}", id.to_uppercase()),
            expiry_date: NaiveDate::from_ymd_opt(2025, expiry_month, 1).unwrap(),
            import_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            quantity_remaining: qty,
        }
    }

    fn draws(plan: &AllocationPlan) -> Vec<(&str, i64)> {
        plan.draws
            .iter()
            .map(|d| (d.batch_id.as_str(), d.quantity))
            .collect()
    }

    #[test]
    fn test_draws_earliest_first() {
        let ordered = vec![lot("a", 20, 1), lot("b", 50, 6)];
        let p = plan(&ordered, 30);

        assert_eq!(draws(&p), vec![("a", 20), ("b", 10)]);
        assert_eq!(p.allocated, 30);
        assert_eq!(p.unmet, 0);
        assert!(p.is_complete());
    }

    #[test]
    fn test_shortfall_takes_everything() {
        let ordered = vec![lot("a", 20, 1), lot("b", 50, 6)];
        let p = plan(&ordered, 80);

        assert_eq!(draws(&p), vec![("a", 20), ("b", 50)]);
        assert_eq!(p.allocated, 70);
        assert_eq!(p.unmet, 10);
    }

    #[test]
    fn test_exact_fit_stops_early() {
        let ordered = vec![lot("a", 20, 1), lot("b", 50, 6), lot("c", 5, 9)];
        let p = plan(&ordered, 20);
        assert_eq!(draws(&p), vec![("a", 20)]);
    }

    #[test]
    fn test_skips_empty_lots() {
        let ordered = vec![lot("a", 0, 1), lot("b", 4, 6)];
        let p = plan(&ordered, 3);
        assert_eq!(draws(&p), vec![("b", 3)]);
    }

    #[test]
    fn test_non_positive_quantity_is_empty() {
        let ordered = vec![lot("a", 20, 1)];
        for q in [0, -5] {
            let p = plan(&ordered, q);
            assert!(p.draws.is_empty());
            assert_eq!(p.allocated, 0);
            assert_eq!(p.unmet, 0);
        }
    }

    #[test]
    fn test_deterministic() {
        let ordered = vec![lot("a", 3, 1), lot("b", 3, 2), lot("c", 3, 3)];
        assert_eq!(plan(&ordered, 7), plan(&ordered, 7));
    }

    #[test]
    fn test_to_draws() {
        let ordered = vec![lot("a", 20, 1), lot("b", 50, 6)];
        let submit = plan(&ordered, 30).to_draws();
        assert_eq!(submit.len(), 2);
        assert_eq!(submit[1].batch_id, "b");
        assert_eq!(submit[1].quantity, 10);
    }
}
