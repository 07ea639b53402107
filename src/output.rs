use crate::error::Result;
use crate::types::{Field, FlatRow, KpiPreviewRow, OrderRecord, OrderTable, Scalar};
use crate::util::{format_int, format_number};
use serde::Serialize;
use std::path::Path;
use tabled::{settings::Style, Table};

const DATE_EXPORT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Write the flattened report as a header line plus a single data row.
pub fn write_flat_row(path: impl AsRef<Path>, row: &FlatRow) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(row.keys())?;
    wtr.write_record(row.columns.iter().map(|(_, v)| v.to_string()))?;
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

/// Write the normalized table. Only columns the source carried are written,
/// in canonical order; missing cells are left empty.
pub fn write_cleaned(path: impl AsRef<Path>, table: &OrderTable) -> Result<()> {
    let fields: Vec<Field> = Field::ALL.iter().copied().filter(|f| table.has(*f)).collect();
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(fields.iter().map(|f| f.name()))?;
    for rec in &table.records {
        wtr.write_record(fields.iter().map(|f| record_cell(rec, *f)))?;
    }
    wtr.flush()?;
    Ok(())
}

fn record_cell(rec: &OrderRecord, field: Field) -> String {
    let date = |d: Option<chrono::NaiveDateTime>| {
        d.map(|d| d.format(DATE_EXPORT_FORMAT).to_string())
    };
    let flag = |b: Option<bool>| b.map(|b| b.to_string());
    let num = |x: Option<f64>| x.map(|x| x.to_string());
    let cell = match field {
        Field::OrderId => Some(rec.order_id.clone()),
        Field::OrderDate => date(rec.order_date),
        Field::SupplierPostDate => date(rec.supplier_post_date),
        Field::TrackingFirstUpdate => date(rec.tracking_first_update),
        Field::DeliveryDate => date(rec.delivery_date),
        Field::Carrier => rec.carrier.clone(),
        Field::CarrierAttempts => num(rec.carrier_attempts),
        Field::Status => rec.status.clone(),
        Field::ProductCost => num(rec.product_cost),
        Field::ShippingCost => num(rec.shipping_cost),
        Field::RefundAmount => num(rec.refund_amount),
        Field::IsReturned => flag(rec.is_returned),
        Field::IsLost => flag(rec.is_lost),
        Field::CustomsRetained => flag(rec.customs_retained),
        Field::PackagingQualityScore => num(rec.packaging_quality_score),
        Field::ContactsCount => num(rec.contacts_count),
    };
    cell.unwrap_or_default()
}

/// Render the flattened report as a two-column `kpi | value` markdown table.
pub fn render_kpi_table(row: &FlatRow) -> String {
    if row.is_empty() {
        return "(no rows)".to_string();
    }
    let rows: Vec<KpiPreviewRow> = row
        .columns
        .iter()
        .map(|(k, v)| KpiPreviewRow {
            kpi: k.clone(),
            value: match v {
                Scalar::Null => "n/a".to_string(),
                Scalar::Count(n) => format_int(*n),
                Scalar::Number(x) => format_number(*x, 2),
            },
        })
        .collect();
    Table::new(rows).with(Style::markdown()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnSet;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("dropship_kpi_{}_{}", std::process::id(), name))
    }

    fn sample_row() -> FlatRow {
        let mut row = FlatRow::default();
        row.push("percent_lost_rate_percent", Some(33.5));
        row.push("percent_lost_lost", 1usize);
        row.push("sla_on_time_rate", Scalar::Null);
        row
    }

    #[test]
    fn test_write_flat_row() {
        let path = temp_path("flat.csv");
        write_flat_row(&path, &sample_row()).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(
            contents,
            "percent_lost_rate_percent,percent_lost_lost,sla_on_time_rate\n33.5,1,\n"
        );
    }

    #[test]
    fn test_write_cleaned_only_present_columns() {
        let mut rec = OrderRecord::new("A1");
        rec.order_date =
            chrono::NaiveDate::from_ymd_opt(2024, 1, 2).and_then(|d| d.and_hms_opt(0, 0, 0));
        rec.is_lost = Some(true);
        let columns: ColumnSet =
            [Field::OrderId, Field::OrderDate, Field::IsLost].into_iter().collect();
        let table = OrderTable::new(vec![rec, OrderRecord::new("A2")], columns);

        let path = temp_path("cleaned.csv");
        write_cleaned(&path, &table).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "order_id,order_date,is_lost");
        assert_eq!(lines[1], "A1,2024-01-02 00:00:00,true");
        assert_eq!(lines[2], "A2,,");
    }

    #[test]
    fn test_render_kpi_table() {
        let rendered = render_kpi_table(&sample_row());
        assert!(rendered.contains("| kpi"));
        assert!(rendered.contains("33.50"));
        assert!(rendered.contains("n/a"));
        assert_eq!(render_kpi_table(&FlatRow::default()), "(no rows)");
    }
}
