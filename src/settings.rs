//! Settings for the store: the SQL table layout, behavior flags, where the
//! database lives and how loudly to log.
//!
//! Settings come from an optional TOML file and are then overridden by
//! environment variables prefixed with `HOLDALL`, with `__` separating
//! nested keys (`HOLDALL__SCHEMA__TABLE=STASH`).

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use crate::error::{HoldallError, Result};
use crate::store::Behavior;

lazy_static! {
    // identifiers end up inside SQL text, they cannot be bound as parameters
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern");
}

// ------------- Schema -------------
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchemaSettings {
    pub table: String,
    pub id: String,
    pub parent_id: String,
    pub name: String,
    pub name_size: u32,
    pub kind: String,
    pub kind_size: u32,
    pub value_reference: String,
    pub value_text: String,
    pub value_text_size: u32,
    pub value_number: String,
    pub value_datetime: String,
    pub value_boolean: String,
    pub value_binary: String,
}

impl Default for SchemaSettings {
    fn default() -> Self {
        Self {
            table: "TB_GUARDA_TUDO".into(),
            id: "ID".into(),
            parent_id: "ID_DO_PAI".into(),
            name: "NOME".into(),
            name_size: 255,
            kind: "TIPO".into(),
            kind_size: 31,
            value_reference: "VALOR_REFERENCIA".into(),
            value_text: "VALOR_TEXTO".into(),
            value_text_size: 255,
            value_number: "VALOR_NUMERICO".into(),
            value_datetime: "VALOR_DATAHORA".into(),
            value_boolean: "VALOR_BOOLEANO".into(),
            value_binary: "VALOR_BINARIO".into(),
        }
    }
}

impl SchemaSettings {
    /// Every column, in the order rows are selected.
    pub fn columns(&self) -> [&str; 10] {
        [
            self.id.as_str(),
            self.parent_id.as_str(),
            self.name.as_str(),
            self.kind.as_str(),
            self.value_reference.as_str(),
            self.value_text.as_str(),
            self.value_number.as_str(),
            self.value_datetime.as_str(),
            self.value_boolean.as_str(),
            self.value_binary.as_str(),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        for identifier in std::iter::once(self.table.as_str()).chain(self.columns()) {
            if !IDENTIFIER.is_match(identifier) {
                return Err(HoldallError::Config(format!(
                    "'{identifier}' is not a valid SQL identifier"
                )));
            }
        }
        let mut columns = self.columns().to_vec();
        columns.sort_unstable_by_key(|column| column.to_ascii_uppercase());
        if columns.windows(2).any(|pair| pair[0].eq_ignore_ascii_case(pair[1])) {
            return Err(HoldallError::Config("column names must be distinct".into()));
        }
        if self.name_size == 0 || self.kind_size == 0 || self.value_text_size == 0 {
            return Err(HoldallError::Config("column sizes must be positive".into()));
        }
        Ok(())
    }
}

// ------------- Settings -------------
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite file; an in-memory database when absent.
    pub database: Option<PathBuf>,
    /// Default log filter when `RUST_LOG` is not set.
    pub log_level: String,
    pub schema: SchemaSettings,
    pub behavior: Behavior,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: None,
            log_level: "info".into(),
            schema: SchemaSettings::default(),
            behavior: Behavior::default(),
        }
    }
}

impl Settings {
    /// Read `path` when it exists, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(config::Environment::with_prefix("HOLDALL").separator("__"))
            .build()?
            .try_deserialize()?;
        settings.schema.validate()?;
        Ok(settings)
    }
}
