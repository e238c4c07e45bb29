//! SQLite persistence for entries.
//!
//! Every entry is one row of a single wide table (layout in
//! [`SchemaSettings`]). The value is spread over a kind column, a reference
//! column and one typed column per scalar kind, at most one of which is set.
//! Rows holding a reference also carry a copy of the referenced scalar in
//! the typed columns, so criteria can filter on it server side; updates keep
//! those copies current inside the same transaction as the update itself.
//! Only the parent column is a foreign key; the store refuses to delete an
//! entry that is still referenced, so the reference column needs none.
//!
//! Criteria are compiled into parameterized SQL by [`compile`]. Only exact
//! comparisons are possible here, so case and diacritic folding are refused.

use std::path::Path;

// used for persistence
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row, ToSql, params};

// used for timestamps in the database
use chrono::NaiveDateTime;

use roaring::RoaringTreemap;
use tracing::{debug, info, trace};

use crate::criteria::{Combinator, Comparator, Criterion, Field, Link};
use crate::entry::Entry;
use crate::error::{HoldallError, Result};
use crate::settings::SchemaSettings;
use crate::store::{Backend, Behavior};
use crate::value::{EntryId, Kind, Resolver, Value};

// ------------- Statements -------------
/// SQL text for every fixed statement, rendered once from the settings.
#[derive(Debug, Clone)]
struct Statements {
    layout_check: String,
    create: String,
    select: String,
    by_id: String,
    children: String,
    next_id: String,
    insert: String,
    update: String,
    update_scalars: String,
    scalars: String,
    referencing: String,
    delete: String,
}

impl Statements {
    fn new(schema: &SchemaSettings) -> Self {
        let t = &schema.table;
        let [id, parent, name, kind, reference, text, number, datetime, boolean, binary] =
            schema.columns();
        let all = schema.columns().join(", ");
        let select = format!("SELECT {all} FROM {t}");
        Self {
            layout_check: format!("SELECT {all} FROM {t} WHERE 1 = 0"),
            create: format!(
                "
            CREATE TABLE {t} (
                {id} int NOT NULL PRIMARY KEY,
                {parent} int NULL REFERENCES {t}({id}),
                {name} varchar({name_size}) NOT NULL,
                {kind} varchar({kind_size}) NOT NULL,
                {reference} int NULL,
                {text} varchar({text_size}) NULL,
                {number} numeric NULL,
                {datetime} timestamp NULL,
                {boolean} smallint NULL,
                {binary} blob NULL
            );
            ",
                name_size = schema.name_size,
                kind_size = schema.kind_size,
                text_size = schema.value_text_size,
            ),
            by_id: format!("{select} WHERE {id} = ?1"),
            children: format!("{select} WHERE {parent} = ?1 ORDER BY {id}"),
            next_id: format!("SELECT COALESCE(MAX({id}), 0) + 1 FROM {t}"),
            insert: format!(
                "
                INSERT INTO {t} (
                    {all}
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "
            ),
            update: format!(
                "
                UPDATE {t}
                    SET {parent} = ?2,
                        {name} = ?3,
                        {kind} = ?4,
                        {reference} = ?5,
                        {text} = ?6,
                        {number} = ?7,
                        {datetime} = ?8,
                        {boolean} = ?9,
                        {binary} = ?10
                    WHERE {id} = ?1
            "
            ),
            update_scalars: format!(
                "
                UPDATE {t}
                    SET {text} = ?2,
                        {number} = ?3,
                        {datetime} = ?4,
                        {boolean} = ?5,
                        {binary} = ?6
                    WHERE {id} = ?1
            "
            ),
            scalars: format!("SELECT {text}, {number}, {datetime}, {boolean}, {binary} FROM {t} WHERE {id} = ?1"),
            referencing: format!("SELECT {id} FROM {t} WHERE {reference} = ?1"),
            delete: format!("DELETE FROM {t} WHERE {id} = ?1"),
            select,
        }
    }
}

// ------------- Rows -------------
/// The typed value columns of one row.
#[derive(Debug, Clone, Default, PartialEq)]
struct Scalars {
    text: Option<String>,
    number: Option<f64>,
    datetime: Option<NaiveDateTime>,
    boolean: Option<bool>,
    binary: Option<Vec<u8>>,
}

impl Scalars {
    fn of(value: &Value) -> Self {
        let mut scalars = Self::default();
        match value {
            Value::Text(text) => scalars.text = Some(text.clone()),
            Value::Number(number) => scalars.number = Some(*number),
            Value::DateTime(moment) => scalars.datetime = Some(*moment),
            Value::Boolean(flag) => scalars.boolean = Some(*flag),
            Value::Binary(bytes) => scalars.binary = Some(bytes.clone()),
            Value::None | Value::Reference(_) => (),
        }
        scalars
    }
    fn read(row: &Row, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            text: row.get(offset)?,
            number: row.get(offset + 1)?,
            datetime: row.get(offset + 2)?,
            boolean: row.get(offset + 3)?,
            binary: row.get(offset + 4)?,
        })
    }
    fn datetime_text(&self) -> Option<String> {
        self.datetime.as_ref().map(datetime_text)
    }
    fn into_value(self, kind: Kind) -> Option<Value> {
        match kind {
            Kind::None => Some(Value::None),
            Kind::Text => self.text.map(Value::Text),
            Kind::Number => self.number.map(Value::Number),
            Kind::DateTime => self.datetime.map(Value::DateTime),
            Kind::Boolean => self.boolean.map(Value::Boolean),
            Kind::Binary => self.binary.map(Value::Binary),
            Kind::Reference => None,
        }
    }
    /// Whichever column is set, regardless of the row's kind.
    fn into_cached(self) -> Value {
        if let Some(text) = self.text {
            Value::Text(text)
        } else if let Some(number) = self.number {
            Value::Number(number)
        } else if let Some(moment) = self.datetime {
            Value::DateTime(moment)
        } else if let Some(flag) = self.boolean {
            Value::Boolean(flag)
        } else if let Some(bytes) = self.binary {
            Value::Binary(bytes)
        } else {
            Value::None
        }
    }
}

struct RawRow {
    id: i64,
    parent: Option<i64>,
    name: String,
    kind: String,
    reference: Option<i64>,
    scalars: Scalars,
}

fn read_row(row: &Row) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        parent: row.get(1)?,
        name: row.get(2)?,
        kind: row.get(3)?,
        reference: row.get(4)?,
        scalars: Scalars::read(row, 5)?,
    })
}

impl RawRow {
    fn into_entry(self) -> Result<Entry> {
        let id = from_sql_id(self.id)?;
        let kind: Kind = self.kind.parse()?;
        let value = match (kind, self.reference) {
            (Kind::Reference, Some(target)) => Some(Value::Reference(from_sql_id(target)?)),
            (Kind::Reference, None) => None,
            (kind, _) => self.scalars.into_value(kind),
        }
        .ok_or_else(|| HoldallError::Corrupt {
            message: format!("row {id} is of kind {kind} but holds no such value"),
        })?;
        Ok(Entry {
            id,
            name: self.name,
            value,
            parent: self.parent.map(from_sql_id).transpose()?,
            children: Vec::new(),
        })
    }
}

/// Timestamps are stored as text in a form that sorts chronologically.
fn datetime_text(moment: &NaiveDateTime) -> String {
    moment.format("%F %T%.f").to_string()
}

fn to_sql_id(id: EntryId) -> Result<i64> {
    i64::try_from(id).map_err(|_| HoldallError::Validation(format!("entry id {id} does not fit the id column")))
}

fn from_sql_id(raw: i64) -> Result<EntryId> {
    EntryId::try_from(raw).map_err(|_| HoldallError::Corrupt {
        message: format!("negative entry id {raw}"),
    })
}

// ------------- Criteria compilation -------------
/// A WHERE clause with the named parameters it binds.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub sql: String,
    pub params: Vec<(String, SqlValue)>,
}

/// Compile a criterion chain into a parenthesized boolean SQL expression.
///
/// Each criterion becomes one fragment bound to its own `@paramN`; fragments
/// are folded left to right exactly like the in-memory evaluator. For value
/// criteria the column is picked by the literal's kind, so a literal only
/// matches rows holding a value of that same kind.
pub fn compile(criterion: &Criterion, schema: &SchemaSettings) -> Result<Compiled> {
    let (head, param) = compile_leaf(criterion, schema, 0)?;
    let mut params = vec![param];
    let sql = compile_links(head, criterion.link(), schema, 1, &mut params)?;
    Ok(Compiled { sql, params })
}

fn compile_links(
    compiled: String,
    link: Option<&Link>,
    schema: &SchemaSettings,
    index: usize,
    params: &mut Vec<(String, SqlValue)>,
) -> Result<String> {
    let Some(Link { combinator, criterion }) = link else {
        return Ok(compiled);
    };
    let (fragment, param) = compile_leaf(criterion, schema, index)?;
    params.push(param);
    let combined = combine(*combinator, &compiled, &fragment);
    compile_links(combined, criterion.link(), schema, index + 1, params)
}

fn compile_leaf(
    criterion: &Criterion,
    schema: &SchemaSettings,
    index: usize,
) -> Result<(String, (String, SqlValue))> {
    let comparator = criterion.comparator;
    let unsupported = || {
        HoldallError::Unsupported(format!(
            "{:?} {:?} with a {} literal",
            criterion.field,
            comparator,
            criterion.literal.kind()
        ))
    };
    // value columns may be null, a guard keeps every fragment two-valued
    let (column, bound, guarded) = match (criterion.field, &criterion.literal) {
        (Field::Identifier, Value::Number(number)) if !comparator.is_pattern() => {
            (&schema.id, SqlValue::Real(*number), false)
        }
        (Field::Name, Value::Text(text)) => (&schema.name, text_operand(text, comparator), false),
        (Field::Value, Value::Text(text)) => {
            (&schema.value_text, text_operand(text, comparator), true)
        }
        (Field::Value, literal @ (Value::None | Value::Binary(_))) => {
            return Err(HoldallError::Incomparable(literal.kind()));
        }
        (Field::Value, _) if comparator.is_pattern() => return Err(unsupported()),
        (Field::Value, Value::Number(number)) => (&schema.value_number, SqlValue::Real(*number), true),
        (Field::Value, Value::DateTime(moment)) => {
            (&schema.value_datetime, SqlValue::Text(datetime_text(moment)), true)
        }
        (Field::Value, Value::Boolean(flag)) => {
            (&schema.value_boolean, SqlValue::Integer(i64::from(*flag)), true)
        }
        (Field::Value, Value::Reference(target))
            if matches!(comparator, Comparator::Equal | Comparator::NotEqual) =>
        {
            (&schema.value_reference, SqlValue::Integer(to_sql_id(*target)?), true)
        }
        _ => return Err(unsupported()),
    };
    let parameter = format!("@param{index}");
    let test = match comparator {
        Comparator::Equal => format!("{column} = {parameter}"),
        Comparator::NotEqual => format!("{column} <> {parameter}"),
        Comparator::LessThan => format!("{column} < {parameter}"),
        Comparator::LessOrEqual => format!("{column} <= {parameter}"),
        Comparator::GreaterThan => format!("{column} > {parameter}"),
        Comparator::GreaterOrEqual => format!("{column} >= {parameter}"),
        Comparator::Contains | Comparator::StartsWith | Comparator::EndsWith => {
            format!("{column} LIKE {parameter} ESCAPE '\\'")
        }
    };
    let fragment = if guarded {
        format!("({column} IS NOT NULL AND {test})")
    } else {
        format!("({test})")
    };
    Ok((fragment, (parameter, bound)))
}

fn text_operand(text: &str, comparator: Comparator) -> SqlValue {
    let escaped = || {
        text.replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_")
    };
    SqlValue::Text(match comparator {
        Comparator::Contains => format!("%{}%", escaped()),
        Comparator::StartsWith => format!("{}%", escaped()),
        Comparator::EndsWith => format!("%{}", escaped()),
        _ => text.to_owned(),
    })
}

fn combine(combinator: Combinator, left: &str, right: &str) -> String {
    match combinator {
        Combinator::And => format!("({left} AND {right})"),
        Combinator::Or => format!("({left} OR {right})"),
        Combinator::Xor => format!("({left} <> {right})"),
        Combinator::Nand => format!("(NOT ({left} AND {right}))"),
        Combinator::Nor => format!("(NOT ({left} OR {right}))"),
        Combinator::Nxor => format!("(NOT ({left} <> {right}))"),
    }
}

// ------------- SQL backend -------------
pub struct SqlBackend {
    connection: Connection,
    schema: SchemaSettings,
    statements: Statements,
}

impl SqlBackend {
    /// Wrap a connection, creating the table when it cannot be selected from.
    pub fn new(connection: Connection, schema: SchemaSettings) -> Result<Self> {
        schema.validate()?;
        // LIKE must match exactly, as every other comparison here does
        connection.pragma_update(None, "case_sensitive_like", "ON")?;
        let statements = Statements::new(&schema);
        bootstrap(&connection, &schema, &statements)?;
        Ok(Self {
            connection,
            schema,
            statements,
        })
    }
    pub fn open(path: impl AsRef<Path>, schema: SchemaSettings) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening database");
        Self::new(Connection::open(path)?, schema)
    }
    pub fn open_in_memory(schema: SchemaSettings) -> Result<Self> {
        debug!("opening in-memory database");
        Self::new(Connection::open_in_memory()?, schema)
    }
    pub fn schema(&self) -> &SchemaSettings {
        &self.schema
    }
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The scalar copy held by a row, which for reference rows is the value
    /// of the referenced row as of its last update.
    pub fn cached(&self, id: EntryId) -> Result<Option<Value>> {
        let scalars = self
            .connection
            .prepare_cached(&self.statements.scalars)?
            .query_row(params![to_sql_id(id)?], |row| Scalars::read(row, 0))
            .optional()?;
        Ok(scalars.map(Scalars::into_cached))
    }
}

fn bootstrap(connection: &Connection, schema: &SchemaSettings, statements: &Statements) -> Result<()> {
    let layout_check = connection
        .prepare(&statements.layout_check)
        .and_then(|mut statement| statement.exists([]));
    if let Err(missing) = layout_check {
        debug!(table = %schema.table, error = %missing, "storage table not usable, creating it");
        connection
            .execute_batch(&statements.create)
            .map_err(|source| HoldallError::Schema {
                table: schema.table.clone(),
                source,
            })?;
        info!(table = %schema.table, "created storage table");
    }
    Ok(())
}

// Scalar columns to write for a value; references copy the target's columns.
fn scalars_for(connection: &Connection, statements: &Statements, value: &Value) -> Result<Scalars> {
    match value {
        Value::Reference(target) => connection
            .prepare_cached(&statements.scalars)?
            .query_row(params![to_sql_id(*target)?], |row| Scalars::read(row, 0))
            .optional()?
            .ok_or(HoldallError::DanglingReference(*target)),
        Value::Number(number) if !number.is_finite() => Err(HoldallError::Validation(format!(
            "number {number} has no SQL representation"
        ))),
        other => Ok(Scalars::of(other)),
    }
}

// Every row referencing `id`, directly or through other references.
fn referencing(connection: &Connection, statements: &Statements, id: EntryId) -> Result<RoaringTreemap> {
    let mut found = RoaringTreemap::new();
    let mut pending = vec![id];
    let mut statement = connection.prepare_cached(&statements.referencing)?;
    while let Some(target) = pending.pop() {
        let rows = statement.query_map(params![to_sql_id(target)?], |row| row.get::<_, i64>(0))?;
        for row in rows {
            let dependent = from_sql_id(row?)?;
            if dependent != id && found.insert(dependent) {
                pending.push(dependent);
            }
        }
    }
    Ok(found)
}

impl Resolver for SqlBackend {
    fn referenced(&self, id: EntryId) -> Result<Option<Value>> {
        Ok(self.lookup(id)?.map(|entry| entry.value))
    }
}

impl Backend for SqlBackend {
    fn accepts(&self, behavior: &Behavior) -> Result<()> {
        if behavior.ignore_case || behavior.ignore_diacritics {
            return Err(HoldallError::Unsupported(
                "the SQL backend only compares text exactly; case and diacritic folding are not available".into(),
            ));
        }
        Ok(())
    }

    fn lookup(&self, id: EntryId) -> Result<Option<Entry>> {
        self.connection
            .prepare_cached(&self.statements.by_id)?
            .query_row(params![to_sql_id(id)?], read_row)
            .optional()?
            .map(RawRow::into_entry)
            .transpose()
    }

    fn children_of(&self, id: EntryId) -> Result<Vec<Entry>> {
        let mut statement = self.connection.prepare_cached(&self.statements.children)?;
        let rows = statement.query_map(params![to_sql_id(id)?], read_row)?;
        rows.map(|row| row?.into_entry()).collect()
    }

    fn insert(&mut self, entry: &mut Entry) -> Result<()> {
        let transaction = self.connection.transaction()?;
        let id: i64 = transaction.query_row(&self.statements.next_id, [], |row| row.get(0))?;
        let scalars = scalars_for(&transaction, &self.statements, &entry.value)?;
        transaction.execute(
            &self.statements.insert,
            params![
                id,
                entry.parent.map(to_sql_id).transpose()?,
                entry.name,
                entry.value.kind().as_str(),
                entry.value.as_reference().map(to_sql_id).transpose()?,
                scalars.text,
                scalars.number,
                scalars.datetime_text(),
                scalars.boolean,
                scalars.binary,
            ],
        )?;
        transaction.commit()?;
        entry.id = from_sql_id(id)?;
        trace!(id = entry.id, "inserted row");
        Ok(())
    }

    fn update(&mut self, entry: &Entry) -> Result<()> {
        let id = to_sql_id(entry.id)?;
        let transaction = self.connection.transaction()?;
        let scalars = scalars_for(&transaction, &self.statements, &entry.value)?;
        let changed = transaction.execute(
            &self.statements.update,
            params![
                id,
                entry.parent.map(to_sql_id).transpose()?,
                entry.name,
                entry.value.kind().as_str(),
                entry.value.as_reference().map(to_sql_id).transpose()?,
                scalars.text,
                scalars.number,
                scalars.datetime_text(),
                scalars.boolean,
                scalars.binary,
            ],
        )?;
        if changed == 0 {
            return Err(HoldallError::Validation(format!("entry {} is not stored", entry.id)));
        }
        let dependents = referencing(&transaction, &self.statements, entry.id)?;
        for dependent in dependents.iter() {
            transaction.execute(
                &self.statements.update_scalars,
                params![
                    to_sql_id(dependent)?,
                    scalars.text,
                    scalars.number,
                    scalars.datetime_text(),
                    scalars.boolean,
                    scalars.binary,
                ],
            )?;
        }
        transaction.commit()?;
        debug!(id = entry.id, cascaded = dependents.len(), "updated row");
        Ok(())
    }

    fn delete(&mut self, id: EntryId) -> Result<()> {
        self.connection.execute(&self.statements.delete, params![to_sql_id(id)?])?;
        Ok(())
    }

    fn query(&self, criterion: &Criterion, _behavior: &Behavior) -> Result<Vec<Entry>> {
        let compiled = compile(criterion, &self.schema)?;
        let sql = format!(
            "{} WHERE {} ORDER BY {}",
            self.statements.select, compiled.sql, self.schema.id
        );
        trace!(%sql, params = compiled.params.len(), "compiled criteria");
        let bound: Vec<(&str, &dyn ToSql)> = compiled
            .params
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect();
        let mut statement = self.connection.prepare(&sql)?;
        let rows = statement.query_map(bound.as_slice(), read_row)?;
        rows.map(|row| row?.into_entry()).collect()
    }
}
