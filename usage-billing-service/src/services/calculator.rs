//! Invoice line-item calculation.
//!
//! Pure arithmetic over a usage snapshot and a pricing configuration. Money
//! stays in integer minor units; GB quantities use fixed-point decimals so
//! no float rounding leaks into amounts.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::models::{BillableMetric, LineItem, PricingConfig, UsageSnapshot};

const BYTES_PER_GB: i64 = 1 << 30;

/// Line items plus their sum.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceCalculation {
    pub line_items: Vec<LineItem>,
    pub total: i64,
}

fn bytes_to_gb(bytes: i64) -> Decimal {
    Decimal::from(bytes) / Decimal::from(BYTES_PER_GB)
}

fn round_minor_units(value: Decimal) -> i64 {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(i64::MAX)
}

/// Storage and bandwidth share one shape: billable GB above the free
/// allowance, ignored at or below 0.01 GB.
fn gb_line_item(
    metric: BillableMetric,
    label: &str,
    bytes: i64,
    free_gb: Decimal,
    rate: i64,
) -> Option<LineItem> {
    let billable = (bytes_to_gb(bytes) - free_gb).max(Decimal::ZERO);
    if billable <= Decimal::new(1, 2) {
        return None;
    }

    let quantity = billable.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    Some(LineItem {
        metric,
        description: format!("{} ({} GB over {} GB free)", label, quantity, free_gb.normalize()),
        quantity,
        unit_price: rate,
        amount: round_minor_units(billable * Decimal::from(rate)),
    })
}

/// Compute the billable line items for one period.
///
/// Order is fixed: students, storage, bandwidth, certificates. Metrics
/// fully inside the free tier produce no line.
pub fn compute_line_items(usage: &UsageSnapshot, pricing: &PricingConfig) -> InvoiceCalculation {
    let mut line_items = Vec::with_capacity(4);

    let billable_students = (usage.active_students - pricing.free_students_limit).max(0);
    if billable_students > 0 {
        line_items.push(LineItem {
            metric: BillableMetric::ActiveStudents,
            description: format!(
                "Active students ({} over {} free)",
                billable_students, pricing.free_students_limit
            ),
            quantity: Decimal::from(billable_students),
            unit_price: pricing.price_per_active_student,
            amount: billable_students.saturating_mul(pricing.price_per_active_student),
        });
    }

    line_items.extend(gb_line_item(
        BillableMetric::VideoStorage,
        "Video storage",
        usage.video_storage_bytes,
        pricing.free_storage_gb,
        pricing.price_per_gb_storage,
    ));

    line_items.extend(gb_line_item(
        BillableMetric::VideoBandwidth,
        "Video bandwidth",
        usage.video_bandwidth_bytes,
        pricing.free_bandwidth_gb,
        pricing.price_per_gb_bandwidth,
    ));

    if usage.certificates_issued > 0 {
        line_items.push(LineItem {
            metric: BillableMetric::Certificates,
            description: format!("Certificates issued ({})", usage.certificates_issued),
            quantity: Decimal::from(usage.certificates_issued),
            unit_price: pricing.price_per_certificate,
            amount: usage
                .certificates_issued
                .saturating_mul(pricing.price_per_certificate),
        });
    }

    let total = line_items
        .iter()
        .fold(0i64, |acc, item| acc.saturating_add(item.amount));

    InvoiceCalculation { line_items, total }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: i64 = 1 << 30;

    fn pricing() -> PricingConfig {
        PricingConfig::fallback()
    }

    fn zero_allowance() -> PricingConfig {
        PricingConfig {
            free_students_limit: 0,
            free_storage_gb: Decimal::ZERO,
            free_bandwidth_gb: Decimal::ZERO,
            ..PricingConfig::fallback()
        }
    }

    #[test]
    fn students_over_free_tier_bill_exactly() {
        let usage = UsageSnapshot {
            active_students: 15,
            ..Default::default()
        };
        let calc = compute_line_items(&usage, &pricing());

        assert_eq!(calc.line_items.len(), 1);
        let item = &calc.line_items[0];
        assert_eq!(item.metric, BillableMetric::ActiveStudents);
        assert_eq!(item.quantity, Decimal::from(5));
        assert_eq!(item.amount, 1000);
        assert_eq!(calc.total, 1000);
    }

    #[test]
    fn storage_over_allowance_bills_per_gb() {
        let usage = UsageSnapshot {
            video_storage_bytes: 2 * GIB,
            ..Default::default()
        };
        let pricing = PricingConfig {
            free_storage_gb: Decimal::ONE,
            price_per_gb_storage: 10,
            ..pricing()
        };
        let calc = compute_line_items(&usage, &pricing);

        assert_eq!(calc.line_items.len(), 1);
        let item = &calc.line_items[0];
        assert_eq!(item.metric, BillableMetric::VideoStorage);
        assert_eq!(item.quantity, Decimal::ONE);
        assert_eq!(item.amount, 10);
    }

    #[test]
    fn certificates_bill_per_issue() {
        let usage = UsageSnapshot {
            certificates_issued: 3,
            ..Default::default()
        };
        let calc = compute_line_items(&usage, &pricing());

        assert_eq!(calc.line_items.len(), 1);
        assert_eq!(calc.line_items[0].metric, BillableMetric::Certificates);
        assert_eq!(calc.line_items[0].amount, 150);
        assert_eq!(calc.total, 150);
    }

    #[test]
    fn free_tier_usage_produces_no_lines() {
        let usage = UsageSnapshot {
            active_students: 10,
            video_storage_bytes: 5 * GIB,
            video_bandwidth_bytes: 10 * GIB,
            certificates_issued: 0,
        };
        let calc = compute_line_items(&usage, &pricing());

        assert!(calc.line_items.is_empty());
        assert_eq!(calc.total, 0);
    }

    #[test]
    fn sub_cent_gb_overage_is_ignored() {
        // 0.01 GB over the allowance is not billable; anything above is.
        let hundredth = GIB / 100;
        let usage = UsageSnapshot {
            video_bandwidth_bytes: 10 * GIB + hundredth,
            ..Default::default()
        };
        assert!(compute_line_items(&usage, &pricing()).line_items.is_empty());

        let usage = UsageSnapshot {
            video_bandwidth_bytes: 10 * GIB + 2 * hundredth,
            ..Default::default()
        };
        assert_eq!(compute_line_items(&usage, &pricing()).line_items.len(), 1);
    }

    #[test]
    fn fractional_amounts_round_half_away_from_zero() {
        // 1.5 GB at 5 per GB is 7.5, billed as 8.
        let usage = UsageSnapshot {
            video_bandwidth_bytes: GIB + GIB / 2,
            ..Default::default()
        };
        let calc = compute_line_items(&usage, &zero_allowance());

        assert_eq!(calc.line_items[0].quantity, Decimal::new(150, 2));
        assert_eq!(calc.line_items[0].amount, 8);
    }

    #[test]
    fn total_is_sum_of_line_amounts_in_fixed_order() {
        let usage = UsageSnapshot {
            active_students: 12,
            video_storage_bytes: 3 * GIB,
            video_bandwidth_bytes: 7 * GIB,
            certificates_issued: 4,
        };
        let calc = compute_line_items(&usage, &zero_allowance());

        let metrics: Vec<_> = calc.line_items.iter().map(|i| i.metric).collect();
        assert_eq!(
            metrics,
            vec![
                BillableMetric::ActiveStudents,
                BillableMetric::VideoStorage,
                BillableMetric::VideoBandwidth,
                BillableMetric::Certificates,
            ]
        );
        let sum: i64 = calc.line_items.iter().map(|i| i.amount).sum();
        assert_eq!(calc.total, sum);
        assert_eq!(calc.total, 12 * 200 + 3 * 10 + 7 * 5 + 4 * 50);
    }
}
