use chrono::NaiveDateTime;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use tabled::Tabled;

/// Canonical order columns, in export order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    OrderId,
    OrderDate,
    SupplierPostDate,
    TrackingFirstUpdate,
    DeliveryDate,
    Carrier,
    CarrierAttempts,
    Status,
    ProductCost,
    ShippingCost,
    RefundAmount,
    IsReturned,
    IsLost,
    CustomsRetained,
    PackagingQualityScore,
    ContactsCount,
}

impl Field {
    pub const ALL: [Field; 16] = [
        Field::OrderId,
        Field::OrderDate,
        Field::SupplierPostDate,
        Field::TrackingFirstUpdate,
        Field::DeliveryDate,
        Field::Carrier,
        Field::CarrierAttempts,
        Field::Status,
        Field::ProductCost,
        Field::ShippingCost,
        Field::RefundAmount,
        Field::IsReturned,
        Field::IsLost,
        Field::CustomsRetained,
        Field::PackagingQualityScore,
        Field::ContactsCount,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::OrderId => "order_id",
            Field::OrderDate => "order_date",
            Field::SupplierPostDate => "supplier_post_date",
            Field::TrackingFirstUpdate => "tracking_first_update",
            Field::DeliveryDate => "delivery_date",
            Field::Carrier => "carrier",
            Field::CarrierAttempts => "carrier_attempts",
            Field::Status => "status",
            Field::ProductCost => "product_cost",
            Field::ShippingCost => "shipping_cost",
            Field::RefundAmount => "refund_amount",
            Field::IsReturned => "is_returned",
            Field::IsLost => "is_lost",
            Field::CustomsRetained => "customs_retained",
            Field::PackagingQualityScore => "packaging_quality_score",
            Field::ContactsCount => "contacts_count",
        }
    }

    pub fn from_name(name: &str) -> Option<Field> {
        let name = name.trim();
        Field::ALL.iter().copied().find(|f| f.name() == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateField {
    OrderDate,
    SupplierPostDate,
    TrackingFirstUpdate,
    DeliveryDate,
}

impl DateField {
    pub const ALL: [DateField; 4] = [
        DateField::OrderDate,
        DateField::SupplierPostDate,
        DateField::TrackingFirstUpdate,
        DateField::DeliveryDate,
    ];

    pub fn field(self) -> Field {
        match self {
            DateField::OrderDate => Field::OrderDate,
            DateField::SupplierPostDate => Field::SupplierPostDate,
            DateField::TrackingFirstUpdate => Field::TrackingFirstUpdate,
            DateField::DeliveryDate => Field::DeliveryDate,
        }
    }
}

/// Tri-state boolean columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagField {
    IsReturned,
    IsLost,
    CustomsRetained,
}

impl FlagField {
    pub const ALL: [FlagField; 3] =
        [FlagField::IsReturned, FlagField::IsLost, FlagField::CustomsRetained];

    pub fn field(self) -> Field {
        match self {
            FlagField::IsReturned => Field::IsReturned,
            FlagField::IsLost => Field::IsLost,
            FlagField::CustomsRetained => Field::CustomsRetained,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericField {
    ProductCost,
    ShippingCost,
    RefundAmount,
    CarrierAttempts,
    PackagingQualityScore,
    ContactsCount,
}

impl NumericField {
    pub const ALL: [NumericField; 6] = [
        NumericField::ProductCost,
        NumericField::ShippingCost,
        NumericField::RefundAmount,
        NumericField::CarrierAttempts,
        NumericField::PackagingQualityScore,
        NumericField::ContactsCount,
    ];

    pub fn field(self) -> Field {
        match self {
            NumericField::ProductCost => Field::ProductCost,
            NumericField::ShippingCost => Field::ShippingCost,
            NumericField::RefundAmount => Field::RefundAmount,
            NumericField::CarrierAttempts => Field::CarrierAttempts,
            NumericField::PackagingQualityScore => Field::PackagingQualityScore,
            NumericField::ContactsCount => Field::ContactsCount,
        }
    }
}

/// One normalized order. Every column except the identifier may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderRecord {
    pub order_id: String,
    pub order_date: Option<NaiveDateTime>,
    pub supplier_post_date: Option<NaiveDateTime>,
    pub tracking_first_update: Option<NaiveDateTime>,
    pub delivery_date: Option<NaiveDateTime>,
    pub carrier: Option<String>,
    pub status: Option<String>,
    pub product_cost: Option<f64>,
    pub shipping_cost: Option<f64>,
    pub refund_amount: Option<f64>,
    pub carrier_attempts: Option<f64>,
    pub packaging_quality_score: Option<f64>,
    pub contacts_count: Option<f64>,
    pub is_returned: Option<bool>,
    pub is_lost: Option<bool>,
    pub customs_retained: Option<bool>,
}

impl OrderRecord {
    pub fn new(order_id: impl Into<String>) -> Self {
        Self { order_id: order_id.into(), ..Default::default() }
    }

    pub fn date(&self, field: DateField) -> Option<NaiveDateTime> {
        match field {
            DateField::OrderDate => self.order_date,
            DateField::SupplierPostDate => self.supplier_post_date,
            DateField::TrackingFirstUpdate => self.tracking_first_update,
            DateField::DeliveryDate => self.delivery_date,
        }
    }

    pub fn set_date(&mut self, field: DateField, value: Option<NaiveDateTime>) {
        match field {
            DateField::OrderDate => self.order_date = value,
            DateField::SupplierPostDate => self.supplier_post_date = value,
            DateField::TrackingFirstUpdate => self.tracking_first_update = value,
            DateField::DeliveryDate => self.delivery_date = value,
        }
    }

    pub fn flag(&self, field: FlagField) -> Option<bool> {
        match field {
            FlagField::IsReturned => self.is_returned,
            FlagField::IsLost => self.is_lost,
            FlagField::CustomsRetained => self.customs_retained,
        }
    }

    pub fn set_flag(&mut self, field: FlagField, value: Option<bool>) {
        match field {
            FlagField::IsReturned => self.is_returned = value,
            FlagField::IsLost => self.is_lost = value,
            FlagField::CustomsRetained => self.customs_retained = value,
        }
    }

    pub fn number(&self, field: NumericField) -> Option<f64> {
        match field {
            NumericField::ProductCost => self.product_cost,
            NumericField::ShippingCost => self.shipping_cost,
            NumericField::RefundAmount => self.refund_amount,
            NumericField::CarrierAttempts => self.carrier_attempts,
            NumericField::PackagingQualityScore => self.packaging_quality_score,
            NumericField::ContactsCount => self.contacts_count,
        }
    }

    pub fn set_number(&mut self, field: NumericField, value: Option<f64>) {
        match field {
            NumericField::ProductCost => self.product_cost = value,
            NumericField::ShippingCost => self.shipping_cost = value,
            NumericField::RefundAmount => self.refund_amount = value,
            NumericField::CarrierAttempts => self.carrier_attempts = value,
            NumericField::PackagingQualityScore => self.packaging_quality_score = value,
            NumericField::ContactsCount => self.contacts_count = value,
        }
    }
}

/// Which canonical columns the source table carried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSet(BTreeSet<Field>);

impl ColumnSet {
    pub fn has(&self, field: Field) -> bool {
        self.0.contains(&field)
    }

    pub fn insert(&mut self, field: Field) {
        self.0.insert(field);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Field> for ColumnSet {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        ColumnSet(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderTable {
    pub records: Vec<OrderRecord>,
    pub columns: ColumnSet,
}

impl OrderTable {
    pub fn new(records: Vec<OrderRecord>, columns: ColumnSet) -> Self {
        Self { records, columns }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has(&self, field: Field) -> bool {
        self.columns.has(field)
    }
}

// ---- KPI results ----

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DurationStat {
    pub count: usize,
    pub mean_days: Option<f64>,
    pub median_days: Option<f64>,
}

/// Percentage of all rows whose flag is true.
#[derive(Debug, Clone, PartialEq)]
pub struct RateStat {
    /// Key used for the numerator on export (`lost`, `returned`, ...).
    pub label: &'static str,
    pub numerator: usize,
    pub total: usize,
    pub rate_percent: Option<f64>,
}

impl Serialize for RateStat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("rate_percent", &self.rate_percent)?;
        map.serialize_entry(self.label, &self.numerator)?;
        map.serialize_entry("total", &self.total)?;
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlaStat {
    pub promised_days: u32,
    pub ontime_percent: f64,
    pub checked_orders: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackagingStat {
    pub mean_packaging_score: Option<f64>,
    pub n: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostAverage {
    ShippingCostPerOrder,
    ProductCostPerOrder,
    RefundAmountPerOrder,
    TotalCostPerOrder,
}

impl CostAverage {
    pub fn key(self) -> &'static str {
        match self {
            CostAverage::ShippingCostPerOrder => "shipping_cost_per_order",
            CostAverage::ProductCostPerOrder => "product_cost_per_order",
            CostAverage::RefundAmountPerOrder => "refund_amount_per_order",
            CostAverage::TotalCostPerOrder => "total_cost_per_order",
        }
    }
}

/// Cost averages whose source columns exist, in a fixed order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AverageCosts {
    pub entries: Vec<(CostAverage, Option<f64>)>,
}

impl AverageCosts {
    pub fn get(&self, which: CostAverage) -> Option<Option<f64>> {
        self.entries.iter().find(|(k, _)| *k == which).map(|(_, v)| *v)
    }
}

impl Serialize for AverageCosts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k.key(), v)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiReport {
    pub transit_time_international: DurationStat,
    pub time_to_delivery: DurationStat,
    pub supplier_processing_time: DurationStat,
    pub percent_retained_customs: Option<RateStat>,
    pub percent_lost: Option<RateStat>,
    pub percent_returned: Option<RateStat>,
    pub avg_carrier_attempts: Option<f64>,
    pub average_costs: AverageCosts,
    pub sla_on_time_rate: Option<SlaStat>,
    pub contact_rate_per_order: Option<f64>,
    pub packaging_quality: Option<PackagingStat>,
}

/// A leaf value of the flattened report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Null,
    Count(u64),
    Number(f64),
}

impl From<Option<f64>> for Scalar {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Scalar::Null, Scalar::Number)
    }
}

impl From<usize> for Scalar {
    fn from(v: usize) -> Self {
        Scalar::Count(v as u64)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Count(n) => write!(f, "{}", n),
            Scalar::Number(x) => write!(f, "{}", x),
        }
    }
}

/// The report projected to one row: fully-qualified KPI name to leaf value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatRow {
    pub columns: Vec<(String, Scalar)>,
}

impl FlatRow {
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Scalar>) {
        self.columns.push((key.into(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<Scalar> {
        self.columns.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[derive(Debug, Tabled, Clone)]
pub struct KpiPreviewRow {
    #[tabled(rename = "kpi")]
    pub kpi: String,
    #[tabled(rename = "value")]
    pub value: String,
}
