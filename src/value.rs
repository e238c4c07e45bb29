//! The tagged value held by every [`Entry`](crate::entry::Entry).
//!
//! A [`Value`] holds exactly one payload. Reading an accessor for a variant
//! that is not active yields that type's zero value (empty string, `0.0`,
//! the epoch, `false`, an empty slice) rather than an error, so callers that
//! only care about one kind can read it unconditionally.
//!
//! A [`Value::Reference`] aliases the value of another entry by identity. It is
//! a lookup key, not an owning pointer, and is followed on demand through a
//! [`Resolver`] (normally the store's backend).

// used for timestamps held in values
use chrono::NaiveDateTime;

// used to print out readable forms of a value
use std::fmt;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::str::FromStr;

// compact visited set for the optional cycle guard
use roaring::RoaringTreemap;

use crate::error::{HoldallError, Result};

// ------------- Identity -------------
/// Identity of an entry. `0` marks an entry that has not been persisted yet.
pub type EntryId = u64;

pub const UNSAVED: EntryId = 0;

// ------------- Kind -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Kind {
    #[default]
    None,
    Reference,
    Text,
    Number,
    DateTime,
    Boolean,
    Binary,
}

impl Kind {
    pub const ALL: [Kind; 7] = [
        Kind::None,
        Kind::Reference,
        Kind::Text,
        Kind::Number,
        Kind::DateTime,
        Kind::Boolean,
        Kind::Binary,
    ];

    /// Classify an arbitrary literal the same way it would be stored.
    ///
    /// Numeric primitives are `Number`, `NaiveDateTime` is `DateTime`, `bool`
    /// is `Boolean`, byte sequences are `Binary`, `None` is `None` and text is
    /// `Text`. The SQL backend relies on this to pick the column a criterion
    /// literal is compared against.
    pub fn static_type_of<T: Into<Value>>(literal: T) -> Kind {
        literal.into().kind()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::None => "None",
            Kind::Reference => "Reference",
            Kind::Text => "Text",
            Kind::Number => "Number",
            Kind::DateTime => "DateTime",
            Kind::Boolean => "Boolean",
            Kind::Binary => "Binary",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = HoldallError;
    fn from_str(s: &str) -> Result<Kind> {
        Kind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| HoldallError::Corrupt {
                message: format!("unknown value kind '{s}'"),
            })
    }
}

// ------------- Resolver -------------
/// Anything able to hand out the value currently stored under an entry id.
pub trait Resolver {
    /// `Ok(None)` when no entry with that id exists.
    fn referenced(&self, id: EntryId) -> Result<Option<Value>>;
}

// ------------- Value -------------
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    None,
    Reference(EntryId),
    Text(String),
    Number(f64),
    DateTime(NaiveDateTime),
    Boolean(bool),
    Binary(Vec<u8>),
}

impl Value {
    pub fn text(text: impl Into<String>) -> Value {
        Value::Text(text.into())
    }
    pub fn number(number: impl Into<f64>) -> Value {
        Value::Number(number.into())
    }
    pub fn datetime(moment: NaiveDateTime) -> Value {
        Value::DateTime(moment)
    }
    pub fn boolean(flag: bool) -> Value {
        Value::Boolean(flag)
    }
    pub fn binary(bytes: impl Into<Vec<u8>>) -> Value {
        Value::Binary(bytes.into())
    }
    pub fn reference(id: EntryId) -> Value {
        Value::Reference(id)
    }

    pub fn kind(&self) -> Kind {
        match self {
            Value::None => Kind::None,
            Value::Reference(_) => Kind::Reference,
            Value::Text(_) => Kind::Text,
            Value::Number(_) => Kind::Number,
            Value::DateTime(_) => Kind::DateTime,
            Value::Boolean(_) => Kind::Boolean,
            Value::Binary(_) => Kind::Binary,
        }
    }
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    // Setters replace whatever payload was held before.
    pub fn clear(&mut self) {
        *self = Value::None;
    }
    pub fn set_text(&mut self, text: impl Into<String>) {
        *self = Value::Text(text.into());
    }
    pub fn set_number(&mut self, number: impl Into<f64>) {
        *self = Value::Number(number.into());
    }
    pub fn set_datetime(&mut self, moment: NaiveDateTime) {
        *self = Value::DateTime(moment);
    }
    pub fn set_boolean(&mut self, flag: bool) {
        *self = Value::Boolean(flag);
    }
    pub fn set_binary(&mut self, bytes: impl Into<Vec<u8>>) {
        *self = Value::Binary(bytes.into());
    }
    pub fn set_reference(&mut self, id: EntryId) {
        *self = Value::Reference(id);
    }

    // Accessors yield the zero value for inactive variants.
    pub fn as_text(&self) -> &str {
        match self {
            Value::Text(text) => text,
            _ => "",
        }
    }
    pub fn as_number(&self) -> f64 {
        match self {
            Value::Number(number) => *number,
            _ => 0.0,
        }
    }
    pub fn as_datetime(&self) -> NaiveDateTime {
        match self {
            Value::DateTime(moment) => *moment,
            _ => NaiveDateTime::default(),
        }
    }
    pub fn as_boolean(&self) -> bool {
        matches!(self, Value::Boolean(true))
    }
    pub fn as_binary(&self) -> &[u8] {
        match self {
            Value::Binary(bytes) => bytes,
            _ => &[],
        }
    }
    pub fn as_reference(&self) -> Option<EntryId> {
        match self {
            Value::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// Follow references until a non-reference value is reached.
    ///
    /// Without `guard` the walk is unbounded: a cycle of references recurses
    /// until the stack is exhausted. With `guard` every visited id is
    /// remembered and revisiting one fails with
    /// [`HoldallError::ReferenceCycle`].
    pub fn resolve<'a>(&'a self, resolver: &dyn Resolver, guard: bool) -> Result<Cow<'a, Value>> {
        match self {
            Value::Reference(id) => {
                let mut visited = guard.then(RoaringTreemap::new);
                follow(*id, resolver, visited.as_mut()).map(Cow::Owned)
            }
            other => Ok(Cow::Borrowed(other)),
        }
    }

    /// Order two values, dispatching on the kind of `self`.
    ///
    /// `other` is read through the accessor matching that kind, so a value of
    /// a different kind compares as its zero value. `None` and `Binary` cannot
    /// be ordered, and references must be resolved first.
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        match self {
            Value::Text(text) => Ok(text.as_str().cmp(other.as_text())),
            Value::Number(number) => Ok(number.total_cmp(&other.as_number())),
            Value::DateTime(moment) => Ok(moment.cmp(&other.as_datetime())),
            Value::Boolean(flag) => Ok(flag.cmp(&other.as_boolean())),
            Value::Reference(id) => Err(HoldallError::Unsupported(format!(
                "reference to entry {id} must be resolved before it is compared"
            ))),
            Value::None | Value::Binary(_) => Err(HoldallError::Incomparable(self.kind())),
        }
    }

    pub fn equals(&self, other: &Value) -> Result<bool> {
        self.compare(other).map(Ordering::is_eq)
    }
}

fn follow(id: EntryId, resolver: &dyn Resolver, mut visited: Option<&mut RoaringTreemap>) -> Result<Value> {
    if let Some(seen) = visited.as_deref_mut() {
        if !seen.insert(id) {
            return Err(HoldallError::ReferenceCycle(id));
        }
    }
    match resolver.referenced(id)? {
        Some(Value::Reference(next)) => follow(next, resolver, visited),
        Some(value) => Ok(value),
        None => Err(HoldallError::DanglingReference(id)),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::None => Ok(()),
            Value::Reference(id) => write!(f, "@{}", id),
            Value::Text(text) => f.write_str(text),
            Value::Number(number) => write!(f, "{}", number),
            Value::DateTime(moment) => write!(f, "{}", moment.format("%Y-%m-%d %H:%M:%S")),
            Value::Boolean(flag) => write!(f, "{}", flag),
            Value::Binary(bytes) => {
                for byte in bytes {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

// ------------- Literals -------------
macro_rules! numeric_literal {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for Value {
                fn from(number: $ty) -> Value {
                    Value::Number(number as f64)
                }
            }
        )+
    };
}
numeric_literal!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl From<&str> for Value {
    fn from(text: &str) -> Value {
        Value::Text(text.to_owned())
    }
}
impl From<String> for Value {
    fn from(text: String) -> Value {
        Value::Text(text)
    }
}
impl From<&String> for Value {
    fn from(text: &String) -> Value {
        Value::Text(text.clone())
    }
}
impl From<NaiveDateTime> for Value {
    fn from(moment: NaiveDateTime) -> Value {
        Value::DateTime(moment)
    }
}
impl From<bool> for Value {
    fn from(flag: bool) -> Value {
        Value::Boolean(flag)
    }
}
impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Value {
        Value::Binary(bytes)
    }
}
impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Value {
        Value::Binary(bytes.to_vec())
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(literal: Option<T>) -> Value {
        literal.map_or(Value::None, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    struct Table(HashMap<EntryId, Value>);
    impl Resolver for Table {
        fn referenced(&self, id: EntryId) -> Result<Option<Value>> {
            Ok(self.0.get(&id).cloned())
        }
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .expect("valid date")
    }

    #[test]
    fn setters_are_mutually_exclusive() {
        let mut value = Value::default();
        value.set_text("hello");
        value.set_number(4);
        assert_eq!(value.kind(), Kind::Number);
        assert_eq!(value.as_number(), 4.0);
        assert_eq!(value.as_text(), "");
        assert!(!value.as_boolean());
        assert!(value.as_binary().is_empty());
        assert_eq!(value.as_datetime(), NaiveDateTime::default());
        assert_eq!(value.as_reference(), None);

        value.set_boolean(true);
        assert_eq!(value.kind(), Kind::Boolean);
        assert_eq!(value.as_number(), 0.0);

        value.clear();
        assert_eq!(value.kind(), Kind::None);
        assert!(!value.as_boolean());
    }

    #[test]
    fn literals_are_classified() {
        assert_eq!(Kind::static_type_of(3u8), Kind::Number);
        assert_eq!(Kind::static_type_of(-7i64), Kind::Number);
        assert_eq!(Kind::static_type_of(2.5f32), Kind::Number);
        assert_eq!(Kind::static_type_of("x"), Kind::Text);
        assert_eq!(Kind::static_type_of(true), Kind::Boolean);
        assert_eq!(Kind::static_type_of(noon()), Kind::DateTime);
        assert_eq!(Kind::static_type_of(vec![1u8, 2]), Kind::Binary);
        assert_eq!(Kind::static_type_of(Option::<i32>::None), Kind::None);
        assert_eq!(Kind::static_type_of(Some("y")), Kind::Text);
    }

    #[test]
    fn kind_names_round_trip_and_reject_unknown() {
        for kind in Kind::ALL {
            assert_eq!(kind.as_str().parse::<Kind>().expect("known kind"), kind);
        }
        assert!(matches!("Texto".parse::<Kind>(), Err(HoldallError::Corrupt { .. })));
    }

    #[test]
    fn comparisons_dispatch_per_kind() {
        assert_eq!(Value::text("a").compare(&Value::text("b")).unwrap(), Ordering::Less);
        assert_eq!(Value::number(10).compare(&Value::number(9.5)).unwrap(), Ordering::Greater);
        assert!(Value::datetime(noon()).equals(&Value::datetime(noon())).unwrap());
        assert_eq!(Value::boolean(false).compare(&Value::boolean(true)).unwrap(), Ordering::Less);
        // other kinds are read through the zero value
        assert!(Value::text("").equals(&Value::number(1)).unwrap());
    }

    #[test]
    fn none_and_binary_are_incomparable() {
        assert!(matches!(
            Value::None.compare(&Value::None),
            Err(HoldallError::Incomparable(Kind::None))
        ));
        assert!(matches!(
            Value::binary(vec![1]).equals(&Value::binary(vec![1])),
            Err(HoldallError::Incomparable(Kind::Binary))
        ));
    }

    #[test]
    fn references_resolve_through_chains() {
        let table = Table(HashMap::from([
            (1, Value::text("leaf")),
            (2, Value::reference(1)),
            (3, Value::reference(2)),
        ]));
        let value = Value::reference(3);
        assert_eq!(value.resolve(&table, false).unwrap().as_text(), "leaf");
        assert_eq!(value.resolve(&table, true).unwrap().as_text(), "leaf");
        assert!(matches!(
            Value::reference(9).resolve(&table, false),
            Err(HoldallError::DanglingReference(9))
        ));
    }

    #[test]
    fn guarded_resolution_reports_cycles() {
        let table = Table(HashMap::from([(1, Value::reference(2)), (2, Value::reference(1))]));
        assert!(matches!(
            Value::reference(1).resolve(&table, true),
            Err(HoldallError::ReferenceCycle(1))
        ));
    }

    #[test]
    fn display_renders_each_kind() {
        assert_eq!(Value::None.to_string(), "");
        assert_eq!(Value::text("abc").to_string(), "abc");
        assert_eq!(Value::number(1.5).to_string(), "1.5");
        assert_eq!(Value::number(3).to_string(), "3");
        assert_eq!(Value::datetime(noon()).to_string(), "2024-03-01 12:00:00");
        assert_eq!(Value::boolean(true).to_string(), "true");
        assert_eq!(Value::binary(vec![0x0f, 0xa0]).to_string(), "0fa0");
        assert_eq!(Value::reference(12).to_string(), "@12");
    }
}
