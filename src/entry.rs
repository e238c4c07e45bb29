// used to print out readable forms of an entry
use std::fmt;

use crate::value::{EntryId, UNSAVED, Value};

// ------------- Entry -------------
/// A node of the hierarchy.
///
/// `parent` is a back-link by identity. `children` is not a source of truth:
/// it is recomputed from the backend whenever an entry is read through the
/// store, one level deep, and ignored when an entry is saved.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Entry {
    pub id: EntryId,
    pub name: String,
    pub value: Value,
    pub parent: Option<EntryId>,
    pub children: Vec<Entry>,
}

impl Entry {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            id: UNSAVED,
            name: name.into(),
            value: value.into(),
            parent: None,
            children: Vec::new(),
        }
    }
    pub fn with_parent(mut self, parent: EntryId) -> Self {
        self.parent = Some(parent);
        self
    }
    pub fn child_of(self, parent: &Entry) -> Self {
        self.with_parent(parent.id)
    }
    pub fn is_new(&self) -> bool {
        self.id == UNSAVED
    }
    /// A copy without the children snapshot, as handed to backends.
    pub fn detached(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            value: self.value.clone(),
            parent: self.parent,
            children: Vec::new(),
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} [{}, {}::<{}>", self.id, self.name, self.value, self.value.kind())?;
        if let Some(parent) = self.parent {
            write!(f, ", ^{}", parent)?;
        }
        write!(f, "]")
    }
}
