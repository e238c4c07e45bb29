//! Composable predicates over entries.
//!
//! A [`Criterion`] is a single test on one field of an entry. Criteria are
//! chained through a [`Combinator`] into a singly linked list, never a tree:
//! `a AND b OR c` always means `(a AND b) OR c`. Every criterion in the chain
//! is evaluated, left to right, and each combinator is applied between the
//! running result and the next criterion's result.
//!
//! ```
//! use holdall::criteria::{Comparator, Criterion};
//! let recent_configs = Criterion::name(Comparator::StartsWith, "config.")
//!     .and(Criterion::value(Comparator::GreaterThan, 10))
//!     .or(Criterion::identifier(Comparator::Equal, 1u64));
//! assert_eq!(recent_configs.len(), 3);
//! ```

use std::cmp::Ordering;

use crate::entry::Entry;
use crate::error::{HoldallError, Result};
use crate::text::Formatter;
use crate::value::{Resolver, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Identifier,
    Name,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    Equal,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    NotEqual,
    Contains,
    StartsWith,
    EndsWith,
}

impl Comparator {
    pub fn is_pattern(self) -> bool {
        matches!(self, Comparator::Contains | Comparator::StartsWith | Comparator::EndsWith)
    }

    /// Whether an ordering between the tested field and the literal satisfies
    /// this comparator. Pattern comparators never hold on an ordering.
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Comparator::Equal => ordering.is_eq(),
            Comparator::NotEqual => ordering.is_ne(),
            Comparator::LessThan => ordering.is_lt(),
            Comparator::LessOrEqual => ordering.is_le(),
            Comparator::GreaterThan => ordering.is_gt(),
            Comparator::GreaterOrEqual => ordering.is_ge(),
            Comparator::Contains | Comparator::StartsWith | Comparator::EndsWith => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Combinator {
    And,
    Or,
    Xor,
    Nand,
    Nor,
    Nxor,
}

impl Combinator {
    pub const ALL: [Combinator; 6] = [
        Combinator::And,
        Combinator::Or,
        Combinator::Xor,
        Combinator::Nand,
        Combinator::Nor,
        Combinator::Nxor,
    ];

    pub fn apply(self, left: bool, right: bool) -> bool {
        match self {
            Combinator::And => left && right,
            Combinator::Or => left || right,
            Combinator::Xor => left != right,
            Combinator::Nand => !(left && right),
            Combinator::Nor => !(left || right),
            Combinator::Nxor => left == right,
        }
    }
}

// ------------- Criterion -------------
#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    pub field: Field,
    pub comparator: Comparator,
    pub literal: Value,
    pub next: Option<Box<Link>>,
}

/// The combinator joining a criterion to the one that follows it.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub combinator: Combinator,
    pub criterion: Criterion,
}

impl Criterion {
    pub fn new(field: Field, comparator: Comparator, literal: impl Into<Value>) -> Self {
        Self {
            field,
            comparator,
            literal: literal.into(),
            next: None,
        }
    }
    pub fn identifier(comparator: Comparator, literal: impl Into<Value>) -> Self {
        Self::new(Field::Identifier, comparator, literal)
    }
    pub fn name(comparator: Comparator, literal: impl Into<Value>) -> Self {
        Self::new(Field::Name, comparator, literal)
    }
    pub fn value(comparator: Comparator, literal: impl Into<Value>) -> Self {
        Self::new(Field::Value, comparator, literal)
    }

    /// Append `other` (itself possibly a chain) to the end of this chain.
    pub fn then(mut self, combinator: Combinator, other: Criterion) -> Self {
        self.append(Link {
            combinator,
            criterion: other,
        });
        self
    }
    fn append(&mut self, link: Link) {
        if let Some(next) = self.next.as_mut() {
            next.criterion.append(link);
        } else {
            self.next = Some(Box::new(link));
        }
    }
    pub fn and(self, other: Criterion) -> Self {
        self.then(Combinator::And, other)
    }
    pub fn or(self, other: Criterion) -> Self {
        self.then(Combinator::Or, other)
    }
    pub fn xor(self, other: Criterion) -> Self {
        self.then(Combinator::Xor, other)
    }
    pub fn nand(self, other: Criterion) -> Self {
        self.then(Combinator::Nand, other)
    }
    pub fn nor(self, other: Criterion) -> Self {
        self.then(Combinator::Nor, other)
    }
    pub fn nxor(self, other: Criterion) -> Self {
        self.then(Combinator::Nxor, other)
    }

    pub fn link(&self) -> Option<&Link> {
        self.next.as_deref()
    }
    /// Number of criteria in the chain, this one included.
    pub fn len(&self) -> usize {
        let mut count = 1;
        let mut link = self.link();
        while let Some(current) = link {
            count += 1;
            link = current.criterion.link();
        }
        count
    }
}

// ------------- Evaluation -------------
/// Evaluates criteria against entries held in memory.
pub struct Evaluator<'a> {
    formatter: &'a dyn Formatter,
    resolver: &'a dyn Resolver,
    guard_cycles: bool,
}

impl<'a> Evaluator<'a> {
    pub fn new(formatter: &'a dyn Formatter, resolver: &'a dyn Resolver) -> Self {
        Self {
            formatter,
            resolver,
            guard_cycles: false,
        }
    }
    pub fn guarding_cycles(mut self, guard: bool) -> Self {
        self.guard_cycles = guard;
        self
    }

    pub fn matches(&self, entry: &Entry, criterion: &Criterion) -> Result<bool> {
        let mut result = self.test(entry, criterion)?;
        let mut link = criterion.link();
        while let Some(Link { combinator, criterion }) = link {
            let next = self.test(entry, criterion)?;
            result = combinator.apply(result, next);
            link = criterion.link();
        }
        Ok(result)
    }

    fn test(&self, entry: &Entry, criterion: &Criterion) -> Result<bool> {
        let comparator = criterion.comparator;
        match criterion.field {
            Field::Identifier => {
                let Value::Number(literal) = criterion.literal else {
                    return Err(unsupported(criterion));
                };
                if comparator.is_pattern() {
                    return Err(unsupported(criterion));
                }
                Ok(comparator.holds((entry.id as f64).total_cmp(&literal)))
            }
            Field::Name => {
                let Value::Text(literal) = &criterion.literal else {
                    return Err(unsupported(criterion));
                };
                Ok(self.compare_text(&entry.name, literal, comparator))
            }
            Field::Value => self.test_value(entry, criterion),
        }
    }

    fn test_value(&self, entry: &Entry, criterion: &Criterion) -> Result<bool> {
        let comparator = criterion.comparator;
        let literal = &criterion.literal;
        match literal {
            Value::None | Value::Binary(_) => return Err(HoldallError::Incomparable(literal.kind())),
            Value::Reference(target) => {
                return match comparator {
                    Comparator::Equal => Ok(entry.value.as_reference() == Some(*target)),
                    Comparator::NotEqual => Ok(entry
                        .value
                        .as_reference()
                        .is_some_and(|current| current != *target)),
                    _ => Err(unsupported(criterion)),
                };
            }
            Value::Text(_) => (),
            _ if comparator.is_pattern() => return Err(unsupported(criterion)),
            _ => (),
        }
        let resolved = match entry.value.resolve(self.resolver, self.guard_cycles) {
            Ok(resolved) => resolved,
            // an alias whose target is gone has no value to match
            Err(HoldallError::DanglingReference(_)) => return Ok(false),
            Err(other) => return Err(other),
        };
        // a literal only ever matches values of its own kind
        if resolved.kind() != literal.kind() {
            return Ok(false);
        }
        match (&*resolved, literal) {
            (Value::Text(text), Value::Text(pattern)) => Ok(self.compare_text(text, pattern, comparator)),
            (value, literal) => Ok(comparator.holds(value.compare(literal)?)),
        }
    }

    fn compare_text(&self, text: &str, literal: &str, comparator: Comparator) -> bool {
        let text = self.formatter.format(text);
        let literal = self.formatter.format(literal);
        match comparator {
            Comparator::Contains => text.contains(&*literal),
            Comparator::StartsWith => text.starts_with(&*literal),
            Comparator::EndsWith => text.ends_with(&*literal),
            _ => comparator.holds(text.cmp(&literal)),
        }
    }
}

fn unsupported(criterion: &Criterion) -> HoldallError {
    HoldallError::Unsupported(format!(
        "{:?} {:?} with a {} literal",
        criterion.field,
        criterion.comparator,
        criterion.literal.kind()
    ))
}
