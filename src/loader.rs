use crate::config::ColumnMap;
use crate::error::Result;
use crate::types::{
    ColumnSet, DateField, Field, FlagField, NumericField, OrderRecord, OrderTable,
};
use crate::util::{parse_bool_cell, parse_datetime_cell, parse_f64_cell, CellError};
use csv::{ByteRecord, ReaderBuilder, Trim};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Untyped table as read from the source: a header row plus text cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new<H, R, C>(headers: H, rows: R) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: rows.into_iter().map(|r| r.into_iter().map(Into::into).collect()).collect(),
        }
    }

    fn column_index(&self, header: &str) -> Option<usize> {
        let header = header.trim();
        self.headers.iter().position(|h| h.trim() == header)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    /// Date columns to parse; a present date column left off this list
    /// stays present but carries no values.
    pub date_fields: Vec<DateField>,
    pub column_map: ColumnMap,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { date_fields: DateField::ALL.to_vec(), column_map: ColumnMap::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub missing_columns: Vec<Field>,
    /// Cells per column that held text but could not be read.
    pub coerced: BTreeMap<Field, usize>,
}

impl LoadReport {
    pub fn coerced_cells(&self) -> usize {
        self.coerced.values().sum()
    }
}

/// Read a CSV file into a `RawTable`.
///
/// Bytes that are not valid UTF-8 are replaced with U+FFFD; the row is kept
/// and the affected cell simply fails to parse later if it is typed.
pub fn read_csv(path: impl AsRef<Path>) -> Result<RawTable> {
    let path = path.as_ref();
    let mut rdr = ReaderBuilder::new().flexible(true).trim(Trim::Headers).from_path(path)?;
    let mut lossy_cells = 0usize;
    let headers = decode_record(rdr.byte_headers()?, &mut lossy_cells);
    let mut rows = Vec::new();

    for result in rdr.byte_records() {
        let record = result?;
        rows.push(decode_record(&record, &mut lossy_cells));
    }

    if lossy_cells > 0 {
        warn!("{} cells in {} were not valid UTF-8", lossy_cells, path.display());
    }
    debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(RawTable { headers, rows })
}

fn decode_record(record: &ByteRecord, lossy_cells: &mut usize) -> Vec<String> {
    record
        .iter()
        .map(|bytes| match String::from_utf8_lossy(bytes) {
            Cow::Borrowed(s) => s.to_string(),
            Cow::Owned(s) => {
                *lossy_cells += 1;
                s
            }
        })
        .collect()
}

/// Coerce a raw table into typed order records.
///
/// Never fails: unreadable cells become missing and are tallied in the
/// returned `LoadReport`. Columns that the source lacks stay absent from the
/// table's `ColumnSet`.
pub fn normalize(raw: &RawTable, options: &LoadOptions) -> (OrderTable, LoadReport) {
    // A mapped header that the file lacks falls back to the canonical name.
    let index: BTreeMap<Field, usize> = Field::ALL
        .iter()
        .filter_map(|&f| {
            raw.column_index(options.column_map.source_header(f))
                .or_else(|| raw.column_index(f.name()))
                .map(|i| (f, i))
        })
        .collect();
    let columns: ColumnSet = index.keys().copied().collect();
    let missing_columns: Vec<Field> =
        Field::ALL.iter().copied().filter(|f| !columns.has(*f)).collect();
    if !missing_columns.is_empty() {
        debug!("Columns absent from source: {:?}", missing_columns);
    }

    let date_fields: Vec<DateField> =
        DateField::ALL.iter().copied().filter(|f| options.date_fields.contains(f)).collect();
    let mut coerced: BTreeMap<Field, usize> = BTreeMap::new();
    let mut records = Vec::with_capacity(raw.rows.len());

    for (row_no, row) in raw.rows.iter().enumerate() {
        let cell =
            |field: Field| index.get(&field).and_then(|&i| row.get(i)).map(String::as_str);

        let order_id = text(cell(Field::OrderId)).unwrap_or_else(|| (row_no + 1).to_string());
        let mut rec = OrderRecord::new(order_id);
        rec.carrier = text(cell(Field::Carrier));
        rec.status = text(cell(Field::Status));

        for &f in &date_fields {
            let value = coerce(&mut coerced, f.field(), parse_datetime_cell(cell(f.field())));
            rec.set_date(f, value);
        }
        for f in FlagField::ALL {
            let value = coerce(&mut coerced, f.field(), parse_bool_cell(cell(f.field())));
            rec.set_flag(f, value);
        }
        for f in NumericField::ALL {
            let value = coerce(&mut coerced, f.field(), parse_f64_cell(cell(f.field())));
            rec.set_number(f, value);
        }
        records.push(rec);
    }

    for (field, n) in &coerced {
        warn!("{} cells in column {} could not be read and were treated as missing", n, field);
    }

    let report = LoadReport {
        total_rows: records.len(),
        missing_columns,
        coerced,
    };
    (OrderTable::new(records, columns), report)
}

/// Read and normalize a CSV file in one step.
pub fn load_path(
    path: impl AsRef<Path>,
    options: &LoadOptions,
) -> Result<(OrderTable, LoadReport)> {
    let path = path.as_ref();
    let raw = read_csv(path)?;
    let (table, report) = normalize(&raw, options);
    info!(
        rows = report.total_rows,
        columns = table.columns.len(),
        coerced = report.coerced_cells(),
        "Loaded {}",
        path.display()
    );
    Ok((table, report))
}

fn text(s: Option<&str>) -> Option<String> {
    let s = s?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn coerce<T>(
    coerced: &mut BTreeMap<Field, usize>,
    field: Field,
    parsed: std::result::Result<Option<T>, CellError>,
) -> Option<T> {
    parsed.unwrap_or_else(|e| {
        debug!(%field, "{}", e);
        *coerced.entry(field).or_insert(0) += 1;
        None
    })
}
