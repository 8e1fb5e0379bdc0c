//! Container templates.
//!
//! A template is a TOML description of the canonical record set of a new
//! container: record names, keywords with their default values, and
//! columns with their type and default repeat. Writers instantiate the
//! template and then fill in, resize or delete what they need.
//!
//! ```toml
//! [[record]]
//! name = "SUBINT"
//!
//! [[record.keyword]]
//! name = "NCHAN"
//! value = 0
//!
//! [[record.column]]
//! name = "DAT_WTS"
//! type = "f32"
//! repeat = 1
//! ```

use std::path::Path;

use psrstore_core::{Error, Result};
use serde::Deserialize;

use super::container::Container;
use super::record::Record;
use super::value::{ColumnType, KeyValue};

/// Parsed container template
#[derive(Debug, Clone, Deserialize)]
pub struct Template {
    /// Records in file order
    #[serde(default, rename = "record")]
    pub records: Vec<RecordTemplate>,
}

/// Template for one record
#[derive(Debug, Clone, Deserialize)]
pub struct RecordTemplate {
    /// Record name
    pub name: String,
    /// Keywords with default values
    #[serde(default, rename = "keyword")]
    pub keywords: Vec<KeywordTemplate>,
    /// Column declarations
    #[serde(default, rename = "column")]
    pub columns: Vec<ColumnTemplate>,
}

/// Template for one keyword
#[derive(Debug, Clone, Deserialize)]
pub struct KeywordTemplate {
    /// Keyword name
    pub name: String,
    /// Default value (string, integer, float or boolean)
    pub value: toml::Value,
}

/// Template for one column
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnTemplate {
    /// Column name
    pub name: String,
    /// Element type name (`i16`, `i32`, `i64`, `u32`, `f32`, `f64`, `str`)
    #[serde(rename = "type")]
    pub ty: String,
    /// Default elements per cell
    #[serde(default = "default_repeat")]
    pub repeat: usize,
}

fn default_repeat() -> usize {
    1
}

impl Template {
    /// Parse template text
    pub fn parse(text: &str) -> Result<Template> {
        let template: Template =
            toml::from_str(text).map_err(|e| Error::Template(format!("parse error: {}", e)))?;
        // Fail on bad types or values now rather than at instantiation
        template.instantiate()?;
        Ok(template)
    }

    /// Read and parse a template file
    pub fn from_file(path: &Path) -> Result<Template> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Template(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    /// Build a container holding every templated record with zero rows
    pub fn instantiate(&self) -> Result<Container> {
        let mut container = Container::new();
        for spec in &self.records {
            let mut record = Record::new(&spec.name);
            for keyword in &spec.keywords {
                record.set_keyword(&keyword.name, keyword_value(&spec.name, keyword)?);
            }
            for column in &spec.columns {
                let ty = ColumnType::parse(&column.ty).ok_or_else(|| {
                    Error::Template(format!(
                        "unknown column type '{}' for {}.{}",
                        column.ty, spec.name, column.name
                    ))
                })?;
                record
                    .add_column(&column.name, ty, column.repeat)
                    .map_err(|e| Error::Template(e.to_string()))?;
            }
            container.insert_record(record);
        }
        Ok(container)
    }
}

fn keyword_value(record: &str, keyword: &KeywordTemplate) -> Result<KeyValue> {
    Ok(match &keyword.value {
        toml::Value::String(s) => KeyValue::Str(s.clone()),
        toml::Value::Integer(i) => KeyValue::Int(*i),
        toml::Value::Float(x) => KeyValue::Float(*x),
        toml::Value::Boolean(b) => KeyValue::Logical(*b),
        other => {
            return Err(Error::Template(format!(
                "unsupported value {} for {}.{}",
                other, record, keyword.name
            )))
        }
    })
}
