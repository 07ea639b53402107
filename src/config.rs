use crate::error::{KpiError, Result};
use crate::kpi::KpiConfig;
use crate::loader::LoadOptions;
use crate::types::{DateField, Field};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Default configuration embedded in the binary
pub const DEFAULT_CONFIG: &str = r#"
promised_days = 30
date_fields = ["order_date", "supplier_post_date", "tracking_first_update", "delivery_date"]

# canonical field = header in the source file
[columns]
"#;

#[derive(Debug, Deserialize)]
struct ConfigFile {
    promised_days: Option<u32>,
    date_fields: Option<Vec<DateField>>,
    #[serde(default)]
    columns: BTreeMap<String, String>,
}

/// Canonical field -> header used by the source file.
///
/// Fields without an entry are looked up under their canonical name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap(BTreeMap<Field, String>);

impl ColumnMap {
    pub fn insert(&mut self, field: Field, header: impl Into<String>) {
        self.0.insert(field, header.into());
    }

    pub fn source_header(&self, field: Field) -> &str {
        self.0.get(&field).map(String::as_str).unwrap_or(field.name())
    }

    /// Parse a `field=header` override, e.g. `contacts_count=tickets`.
    pub fn parse_pair(pair: &str) -> Result<(Field, String)> {
        let (field, header) = pair
            .split_once('=')
            .ok_or_else(|| {
                KpiError::InvalidMapping(format!("expected FIELD=HEADER, got {:?}", pair))
            })?;
        let header = header.trim();
        if header.is_empty() {
            return Err(KpiError::InvalidMapping(format!("empty header in {:?}", pair)));
        }
        let field = Field::from_name(field)
            .ok_or_else(|| KpiError::InvalidMapping(format!("unknown field {:?}", field.trim())))?;
        Ok((field, header.to_string()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub kpi: KpiConfig,
    pub load: LoadOptions,
}

impl Config {
    pub fn from_toml_str(contents: &str) -> Result<Config> {
        let file: ConfigFile = toml::from_str(contents)?;
        let mut config = Config::default();
        if let Some(days) = file.promised_days {
            config.set_promised_days(days)?;
        }
        if let Some(fields) = file.date_fields {
            config.load.date_fields = fields;
        }
        for (field, header) in file.columns {
            let field = Field::from_name(&field)
                .ok_or_else(|| KpiError::InvalidMapping(format!("unknown field {:?}", field)))?;
            config.load.column_map.insert(field, header);
        }
        Ok(config)
    }

    /// Load from `path`, or fall back to the embedded default.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        match path {
            Some(path) => {
                tracing::info!("Loading config from: {}", path.display());
                let contents = std::fs::read_to_string(path)?;
                Config::from_toml_str(&contents)
            }
            None => {
                tracing::debug!("Using default embedded configuration");
                Config::from_toml_str(DEFAULT_CONFIG)
            }
        }
    }

    pub fn set_promised_days(&mut self, days: u32) -> Result<()> {
        if days == 0 {
            return Err(KpiError::InvalidPromisedDays(days));
        }
        self.kpi.promised_days = days;
        Ok(())
    }

    /// Apply `field=header` overrides given on the command line.
    pub fn apply_mappings<S: AsRef<str>>(&mut self, pairs: &[S]) -> Result<()> {
        for pair in pairs {
            let (field, header) = ColumnMap::parse_pair(pair.as_ref())?;
            self.load.column_map.insert(field, header);
        }
        Ok(())
    }
}
