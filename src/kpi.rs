//! Logistics KPIs over a normalized order table.
//!
//! Every function here is total: a KPI whose input column is absent comes
//! back as `None` rather than an error, and an empty denominator yields
//! `None` rather than a division by zero.
use crate::types::{
    AverageCosts, CostAverage, DateField, DurationStat, Field, FlagField, FlatRow, KpiReport,
    NumericField, OrderTable, PackagingStat, RateStat, Scalar, SlaStat,
};
use crate::util::{days_diff, mean, median, percent};
use tracing::debug;

pub const DEFAULT_PROMISED_DAYS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KpiConfig {
    pub promised_days: u32,
}

impl Default for KpiConfig {
    fn default() -> Self {
        Self { promised_days: DEFAULT_PROMISED_DAYS }
    }
}

/// Day differences for rows where both dates are present.
fn day_differences(table: &OrderTable, start: DateField, end: DateField) -> Vec<i64> {
    table
        .records
        .iter()
        .filter_map(|r| Some(days_diff(r.date(start)?, r.date(end)?)))
        .collect()
}

/// Count, mean and median of `end - start` in whole days.
///
/// Rows missing either date are left out of the count; negative spans are
/// kept as they are.
pub fn duration_between(table: &OrderTable, start: DateField, end: DateField) -> DurationStat {
    let days: Vec<f64> = day_differences(table, start, end).into_iter().map(|d| d as f64).collect();
    DurationStat { count: days.len(), mean_days: mean(&days), median_days: median(days) }
}

/// Supplier post to first tracking update.
pub fn transit_time_international(table: &OrderTable) -> DurationStat {
    duration_between(table, DateField::SupplierPostDate, DateField::TrackingFirstUpdate)
}

pub fn time_to_delivery(table: &OrderTable) -> DurationStat {
    duration_between(table, DateField::OrderDate, DateField::DeliveryDate)
}

pub fn supplier_processing_time(table: &OrderTable) -> DurationStat {
    duration_between(table, DateField::OrderDate, DateField::SupplierPostDate)
}

fn numerator_label(flag: FlagField) -> &'static str {
    match flag {
        FlagField::CustomsRetained => "retained",
        FlagField::IsLost => "lost",
        FlagField::IsReturned => "returned",
    }
}

/// Share of *all* rows whose flag is true. Unlike the duration KPIs, rows
/// with a missing flag stay in the denominator.
pub fn flag_rate(table: &OrderTable, flag: FlagField) -> Option<RateStat> {
    if !table.has(flag.field()) {
        return None;
    }
    let total = table.len();
    let numerator = table.records.iter().filter(|r| r.flag(flag) == Some(true)).count();
    Some(RateStat {
        label: numerator_label(flag),
        numerator,
        total,
        rate_percent: percent(numerator, total),
    })
}

pub fn percent_retained_customs(table: &OrderTable) -> Option<RateStat> {
    flag_rate(table, FlagField::CustomsRetained)
}

pub fn percent_lost(table: &OrderTable) -> Option<RateStat> {
    flag_rate(table, FlagField::IsLost)
}

pub fn percent_returned(table: &OrderTable) -> Option<RateStat> {
    flag_rate(table, FlagField::IsReturned)
}

/// Non-missing values of a numeric column, or `None` if the column is absent.
fn present_values(table: &OrderTable, field: NumericField) -> Option<Vec<f64>> {
    if !table.has(field.field()) {
        return None;
    }
    Some(table.records.iter().filter_map(|r| r.number(field)).collect())
}

/// Mean carrier delivery attempts. Also `None` when every value is missing.
pub fn avg_carrier_attempts(table: &OrderTable) -> Option<f64> {
    present_values(table, NumericField::CarrierAttempts).and_then(|v| mean(&v))
}

pub fn average_costs(table: &OrderTable) -> AverageCosts {
    let mut entries = Vec::new();
    let per_column = [
        (CostAverage::ShippingCostPerOrder, NumericField::ShippingCost),
        (CostAverage::ProductCostPerOrder, NumericField::ProductCost),
        (CostAverage::RefundAmountPerOrder, NumericField::RefundAmount),
    ];
    for (which, field) in per_column {
        if let Some(values) = present_values(table, field) {
            entries.push((which, mean(&values)));
        }
    }
    if table.has(Field::ShippingCost) && table.has(Field::ProductCost) {
        // row-wise sum; a row missing either cost drops out
        let totals: Vec<f64> = table
            .records
            .iter()
            .filter_map(|r| Some(r.shipping_cost? + r.product_cost?))
            .collect();
        entries.push((CostAverage::TotalCostPerOrder, mean(&totals)));
    }
    AverageCosts { entries }
}

/// Orders delivered within `promised_days` of being placed.
pub fn sla_on_time_rate(table: &OrderTable, promised_days: u32) -> Option<SlaStat> {
    let days = day_differences(table, DateField::OrderDate, DateField::DeliveryDate);
    let checked_orders = days.len();
    let ontime = days.iter().filter(|&&d| d <= i64::from(promised_days)).count();
    let ontime_percent = percent(ontime, checked_orders)?;
    Some(SlaStat { promised_days, ontime_percent, checked_orders })
}

/// Support contacts per order. Missing counts add nothing to the sum but
/// their rows still count as orders.
pub fn contact_rate_per_order(table: &OrderTable) -> Option<f64> {
    if !table.has(Field::ContactsCount) || table.is_empty() {
        return None;
    }
    let sum: f64 = table.records.iter().filter_map(|r| r.contacts_count).sum();
    Some(sum / table.len() as f64)
}

pub fn packaging_quality(table: &OrderTable) -> Option<PackagingStat> {
    let scores = present_values(table, NumericField::PackagingQualityScore)?;
    Some(PackagingStat { mean_packaging_score: mean(&scores), n: scores.len() })
}

/// Run every KPI against `table`.
pub fn kpi_report(table: &OrderTable, config: &KpiConfig) -> KpiReport {
    let report = KpiReport {
        transit_time_international: transit_time_international(table),
        time_to_delivery: time_to_delivery(table),
        supplier_processing_time: supplier_processing_time(table),
        percent_retained_customs: percent_retained_customs(table),
        percent_lost: percent_lost(table),
        percent_returned: percent_returned(table),
        avg_carrier_attempts: avg_carrier_attempts(table),
        average_costs: average_costs(table),
        sla_on_time_rate: sla_on_time_rate(table, config.promised_days),
        contact_rate_per_order: contact_rate_per_order(table),
        packaging_quality: packaging_quality(table),
    };
    let unavailable =
        report.flatten().columns.iter().filter(|(_, v)| *v == Scalar::Null).count();
    debug!(rows = table.len(), unavailable, "KPI report computed");
    report
}

fn push_duration(row: &mut FlatRow, name: &str, stat: &DurationStat) {
    row.push(format!("{}_count", name), stat.count);
    row.push(format!("{}_mean_days", name), stat.mean_days);
    row.push(format!("{}_median_days", name), stat.median_days);
}

fn push_rate(row: &mut FlatRow, name: &str, stat: Option<&RateStat>) {
    match stat {
        Some(s) => {
            row.push(format!("{}_rate_percent", name), s.rate_percent);
            row.push(format!("{}_{}", name, s.label), s.numerator);
            row.push(format!("{}_total", name), s.total);
        }
        None => row.push(name, Scalar::Null),
    }
}

impl KpiReport {
    /// Project the report onto a single row, one column per leaf value.
    ///
    /// Nested keys are joined with `_`. A KPI that is unavailable as a whole
    /// shows up once, under its own name, as null.
    pub fn flatten(&self) -> FlatRow {
        let mut row = FlatRow::default();
        push_duration(&mut row, "transit_time_international", &self.transit_time_international);
        push_duration(&mut row, "time_to_delivery", &self.time_to_delivery);
        push_duration(&mut row, "supplier_processing_time", &self.supplier_processing_time);
        push_rate(&mut row, "percent_retained_customs", self.percent_retained_customs.as_ref());
        push_rate(&mut row, "percent_lost", self.percent_lost.as_ref());
        push_rate(&mut row, "percent_returned", self.percent_returned.as_ref());
        row.push("avg_carrier_attempts", self.avg_carrier_attempts);
        for (which, value) in &self.average_costs.entries {
            row.push(format!("average_costs_{}", which.key()), *value);
        }
        match &self.sla_on_time_rate {
            Some(s) => {
                let promised = Scalar::Count(u64::from(s.promised_days));
                row.push("sla_on_time_rate_promised_days", promised);
                row.push("sla_on_time_rate_ontime_percent", Some(s.ontime_percent));
                row.push("sla_on_time_rate_checked_orders", s.checked_orders);
            }
            None => row.push("sla_on_time_rate", Scalar::Null),
        }
        row.push("contact_rate_per_order", self.contact_rate_per_order);
        match &self.packaging_quality {
            Some(p) => {
                row.push("packaging_quality_mean_packaging_score", p.mean_packaging_score);
                row.push("packaging_quality_n", p.n);
            }
            None => row.push("packaging_quality", Scalar::Null),
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnSet, OrderRecord};
    use chrono::{NaiveDate, NaiveDateTime};
    use std::collections::HashSet;

    fn ymd(y: i32, m: u32, d: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(y, m, d).and_then(|d| d.and_hms_opt(0, 0, 0))
    }

    fn table(columns: &[Field], records: Vec<OrderRecord>) -> OrderTable {
        OrderTable::new(records, columns.iter().copied().collect::<ColumnSet>())
    }

    fn order(id: &str) -> OrderRecord {
        OrderRecord::new(id)
    }

    #[test]
    fn test_time_to_delivery_skips_missing_dates() {
        let t = table(
            &[Field::OrderDate, Field::DeliveryDate],
            vec![
                OrderRecord {
                    order_date: ymd(2024, 1, 1),
                    delivery_date: ymd(2024, 1, 10),
                    ..order("1")
                },
                OrderRecord { order_date: ymd(2024, 1, 1), delivery_date: None, ..order("2") },
            ],
        );
        let stat = time_to_delivery(&t);
        assert_eq!(stat, DurationStat { count: 1, mean_days: Some(9.0), median_days: Some(9.0) });
    }

    #[test]
    fn test_duration_without_columns_is_empty() {
        let t = table(&[Field::OrderId], vec![order("1"), order("2")]);
        let stat = transit_time_international(&t);
        assert_eq!(stat, DurationStat { count: 0, mean_days: None, median_days: None });
    }

    #[test]
    fn test_duration_keeps_negative_spans() {
        let t = table(
            &[Field::OrderDate, Field::SupplierPostDate],
            vec![
                OrderRecord {
                    order_date: ymd(2024, 3, 5),
                    supplier_post_date: ymd(2024, 3, 2),
                    ..order("1")
                },
                OrderRecord {
                    order_date: ymd(2024, 3, 1),
                    supplier_post_date: ymd(2024, 3, 4),
                    ..order("2")
                },
                OrderRecord {
                    order_date: ymd(2024, 3, 1),
                    supplier_post_date: ymd(2024, 3, 11),
                    ..order("3")
                },
            ],
        );
        let stat = supplier_processing_time(&t);
        assert_eq!(stat.count, 3);
        assert_eq!(stat.mean_days, Some(10.0 / 3.0));
        assert_eq!(stat.median_days, Some(3.0));
    }

    #[test]
    fn test_percent_lost_counts_missing_in_total() {
        let t = table(
            &[Field::IsLost],
            vec![
                OrderRecord { is_lost: Some(true), ..order("1") },
                OrderRecord { is_lost: Some(false), ..order("2") },
                OrderRecord { is_lost: None, ..order("3") },
            ],
        );
        let stat = percent_lost(&t).unwrap();
        assert_eq!(stat.label, "lost");
        assert_eq!(stat.numerator, 1);
        assert_eq!(stat.total, 3);
        assert!((stat.rate_percent.unwrap() - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_rate_on_empty_table_is_null() {
        let t = table(&[Field::IsReturned, Field::CustomsRetained], vec![]);
        let stat = percent_returned(&t).unwrap();
        assert_eq!(stat.total, 0);
        assert_eq!(stat.rate_percent, None);
        assert_eq!(percent_retained_customs(&t).unwrap().rate_percent, None);
    }

    #[test]
    fn test_rate_without_column_is_none() {
        let t = table(&[Field::IsLost], vec![OrderRecord { is_lost: Some(true), ..order("1") }]);
        assert!(percent_retained_customs(&t).is_none());
        assert!(percent_returned(&t).is_none());
    }

    #[test]
    fn test_sla_on_time_rate() {
        let t = table(
            &[Field::OrderDate, Field::DeliveryDate],
            vec![
                OrderRecord {
                    order_date: ymd(2024, 1, 1),
                    delivery_date: ymd(2024, 1, 6),
                    ..order("1")
                },
                OrderRecord {
                    order_date: ymd(2024, 1, 1),
                    delivery_date: ymd(2024, 1, 7),
                    ..order("2")
                },
                OrderRecord { order_date: ymd(2024, 1, 1), ..order("3") },
            ],
        );
        let stat = sla_on_time_rate(&t, 5).unwrap();
        assert_eq!(stat, SlaStat { promised_days: 5, ontime_percent: 50.0, checked_orders: 2 });
    }

    #[test]
    fn test_sla_without_qualifying_rows_is_none() {
        let t = table(
            &[Field::OrderDate],
            vec![OrderRecord { order_date: ymd(2024, 1, 1), ..order("1") }],
        );
        assert!(sla_on_time_rate(&t, 30).is_none());
    }

    #[test]
    fn test_average_costs_total_needs_both_costs() {
        let t = table(
            &[Field::ShippingCost, Field::ProductCost],
            vec![
                OrderRecord { shipping_cost: Some(10.0), product_cost: Some(30.0), ..order("1") },
                OrderRecord { shipping_cost: Some(20.0), product_cost: None, ..order("2") },
                OrderRecord { shipping_cost: None, product_cost: Some(50.0), ..order("3") },
            ],
        );
        let costs = average_costs(&t);
        assert_eq!(costs.get(CostAverage::ShippingCostPerOrder), Some(Some(15.0)));
        assert_eq!(costs.get(CostAverage::ProductCostPerOrder), Some(Some(40.0)));
        assert_eq!(costs.get(CostAverage::RefundAmountPerOrder), None);
        assert_eq!(costs.get(CostAverage::TotalCostPerOrder), Some(Some(40.0)));
    }

    #[test]
    fn test_average_costs_only_lists_present_columns() {
        let t = table(&[Field::RefundAmount], vec![order("1")]);
        let costs = average_costs(&t);
        assert_eq!(costs.entries, vec![(CostAverage::RefundAmountPerOrder, None)]);
    }

    #[test]
    fn test_avg_carrier_attempts_and_packaging() {
        let t = table(
            &[Field::CarrierAttempts, Field::PackagingQualityScore],
            vec![
                OrderRecord {
                    carrier_attempts: Some(1.0),
                    packaging_quality_score: Some(4.0),
                    ..order("1")
                },
                OrderRecord { carrier_attempts: Some(3.0), ..order("2") },
                order("3"),
            ],
        );
        assert_eq!(avg_carrier_attempts(&t), Some(2.0));
        let expected = PackagingStat { mean_packaging_score: Some(4.0), n: 1 };
        assert_eq!(packaging_quality(&t), Some(expected));

        let bare = table(&[], vec![order("1")]);
        assert_eq!(avg_carrier_attempts(&bare), None);
        assert_eq!(packaging_quality(&bare), None);
    }

    #[test]
    fn test_contact_rate_treats_missing_as_zero() {
        let t = table(
            &[Field::ContactsCount],
            vec![
                OrderRecord { contacts_count: Some(2.0), ..order("1") },
                OrderRecord { contacts_count: Some(1.0), ..order("2") },
                order("3"),
                order("4"),
            ],
        );
        assert_eq!(contact_rate_per_order(&t), Some(0.75));
        assert_eq!(contact_rate_per_order(&table(&[Field::ContactsCount], vec![])), None);
        assert_eq!(contact_rate_per_order(&table(&[], vec![order("1")])), None);
    }

    #[test]
    fn test_report_on_bare_table_is_complete() {
        let t = table(&[Field::OrderId], vec![order("1"), order("2")]);
        let report = kpi_report(&t, &KpiConfig::default());

        assert_eq!(report.time_to_delivery.count, 0);
        assert!(report.percent_lost.is_none());
        assert!(report.sla_on_time_rate.is_none());
        assert!(report.average_costs.entries.is_empty());

        let flat = report.flatten();
        assert_eq!(flat.get("percent_lost"), Some(Scalar::Null));
        assert_eq!(flat.get("sla_on_time_rate"), Some(Scalar::Null));
        assert_eq!(flat.get("packaging_quality"), Some(Scalar::Null));
        assert_eq!(flat.get("time_to_delivery_count"), Some(Scalar::Count(0)));
        assert_eq!(flat.get("time_to_delivery_mean_days"), Some(Scalar::Null));
        assert!(flat.keys().all(|k| !k.starts_with("average_costs")));
    }

    #[test]
    fn test_report_is_idempotent() {
        let t = table(
            &[Field::OrderDate, Field::DeliveryDate, Field::IsLost],
            vec![
                OrderRecord {
                    order_date: ymd(2024, 2, 1),
                    delivery_date: ymd(2024, 2, 20),
                    is_lost: Some(false),
                    ..order("1")
                },
                OrderRecord {
                    order_date: ymd(2024, 2, 3),
                    delivery_date: ymd(2024, 4, 20),
                    is_lost: Some(true),
                    ..order("2")
                },
            ],
        );
        let config = KpiConfig { promised_days: 21 };
        assert_eq!(kpi_report(&t, &config), kpi_report(&t, &config));
    }

    #[test]
    fn test_flatten_keys_are_unique_and_joined_once() {
        let t = table(
            &Field::ALL,
            vec![OrderRecord {
                order_date: ymd(2024, 1, 1),
                supplier_post_date: ymd(2024, 1, 3),
                tracking_first_update: ymd(2024, 1, 8),
                delivery_date: ymd(2024, 1, 20),
                shipping_cost: Some(9.0),
                product_cost: Some(21.0),
                refund_amount: Some(0.0),
                carrier_attempts: Some(1.0),
                packaging_quality_score: Some(5.0),
                contacts_count: Some(1.0),
                is_returned: Some(false),
                is_lost: Some(false),
                customs_retained: Some(true),
                ..order("1")
            }],
        );
        let report = kpi_report(&t, &KpiConfig::default());
        let flat = report.flatten();

        let keys: Vec<&str> = flat.keys().collect();
        let unique: HashSet<&str> = keys.iter().copied().collect();
        assert_eq!(keys.len(), unique.len());
        // 3 durations x 3 + 3 rates x 3 + attempts + 4 costs + sla x 3 + contacts + packaging x 2
        assert_eq!(flat.len(), 9 + 9 + 1 + 4 + 3 + 1 + 2);

        assert_eq!(flat.get("transit_time_international_mean_days"), Some(Scalar::Number(5.0)));
        assert_eq!(flat.get("percent_retained_customs_retained"), Some(Scalar::Count(1)));
        assert_eq!(flat.get("percent_retained_customs_rate_percent"), Some(Scalar::Number(100.0)));
        assert_eq!(flat.get("average_costs_total_cost_per_order"), Some(Scalar::Number(30.0)));
        assert_eq!(flat.get("sla_on_time_rate_promised_days"), Some(Scalar::Count(30)));
        assert_eq!(flat.get("sla_on_time_rate_ontime_percent"), Some(Scalar::Number(100.0)));
        assert_eq!(flat.get("packaging_quality_n"), Some(Scalar::Count(1)));
        assert_eq!(flat.get("contact_rate_per_order"), Some(Scalar::Number(1.0)));
    }

    #[test]
    fn test_counts_never_exceed_rows() {
        let t = table(
            &[
                Field::OrderDate,
                Field::DeliveryDate,
                Field::IsReturned,
                Field::PackagingQualityScore,
            ],
            vec![
                OrderRecord {
                    order_date: ymd(2024, 5, 1),
                    delivery_date: ymd(2024, 5, 2),
                    ..order("1")
                },
                OrderRecord {
                    is_returned: Some(true),
                    packaging_quality_score: Some(3.0),
                    ..order("2")
                },
                order("3"),
            ],
        );
        let report = kpi_report(&t, &KpiConfig::default());
        assert!(report.time_to_delivery.count <= t.len());
        assert!(report.percent_returned.as_ref().unwrap().total <= t.len());
        assert!(report.sla_on_time_rate.as_ref().unwrap().checked_orders <= t.len());
        assert!(report.packaging_quality.as_ref().unwrap().n <= t.len());
    }
}
