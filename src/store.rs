//! Backend-independent orchestration of saves, deletes and queries.
//!
//! [`Store`] validates input, delegates persistence to a [`Backend`] and
//! keeps parent links consistent afterwards. It holds no state of its own
//! between calls apart from the backend and the [`Behavior`] it was built with.

use std::borrow::Cow;
use std::cmp::Ordering;

use roaring::RoaringTreemap;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::criteria::{Comparator, Criterion};
use crate::entry::Entry;
use crate::error::{HoldallError, Result};
use crate::value::{EntryId, Resolver, Value};

// ------------- Behavior -------------
/// Behavior flags fixed when a store is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Behavior {
    /// Deleting an entry deletes its children too; otherwise they are orphaned.
    pub cascade_delete: bool,
    pub ignore_case: bool,
    pub ignore_diacritics: bool,
    /// Fail with a cycle error instead of recursing forever through references.
    pub guard_reference_cycles: bool,
}

impl Behavior {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cascade_delete(mut self, cascade: bool) -> Self {
        self.cascade_delete = cascade;
        self
    }
    pub fn ignore_case(mut self, ignore: bool) -> Self {
        self.ignore_case = ignore;
        self
    }
    pub fn ignore_diacritics(mut self, ignore: bool) -> Self {
        self.ignore_diacritics = ignore;
        self
    }
    pub fn guard_reference_cycles(mut self, guard: bool) -> Self {
        self.guard_reference_cycles = guard;
        self
    }
}

// ------------- Backend -------------
/// Raw persistence of entries. Entries handed out by a backend never carry
/// children; the store fills them in through [`Backend::children_of`].
pub trait Backend: Resolver {
    /// Reject behavior this backend cannot honor.
    fn accepts(&self, _behavior: &Behavior) -> Result<()> {
        Ok(())
    }
    fn lookup(&self, id: EntryId) -> Result<Option<Entry>>;
    fn children_of(&self, id: EntryId) -> Result<Vec<Entry>>;
    /// Persist a new entry, assigning its id.
    fn insert(&mut self, entry: &mut Entry) -> Result<()>;
    fn update(&mut self, entry: &Entry) -> Result<()>;
    fn delete(&mut self, id: EntryId) -> Result<()>;
    /// Entries matching the criterion, in the backend's own order: list order
    /// in memory, id order in SQL.
    fn query(&self, criterion: &Criterion, behavior: &Behavior) -> Result<Vec<Entry>>;
}

// ------------- Store -------------
pub struct Store<B: Backend> {
    backend: B,
    behavior: Behavior,
}

impl<B: Backend> Store<B> {
    pub fn new(backend: B, behavior: Behavior) -> Result<Self> {
        backend.accepts(&behavior)?;
        Ok(Self { backend, behavior })
    }
    pub fn behavior(&self) -> &Behavior {
        &self.behavior
    }
    pub fn backend(&self) -> &B {
        &self.backend
    }
    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Insert a new entry or update the persisted one with the same id,
    /// returning the canonical entry as stored.
    pub fn save(&mut self, entry: &Entry) -> Result<Entry> {
        let existing = if entry.is_new() {
            None
        } else {
            self.backend.lookup(entry.id)?
        };
        let id = match existing {
            None => {
                if !entry.is_new() {
                    return Err(HoldallError::Validation(format!(
                        "entry {} does not exist and a new entry must not carry an id",
                        entry.id
                    )));
                }
                self.validate(entry)?;
                let mut fresh = entry.detached();
                self.backend.insert(&mut fresh)?;
                debug!(id = fresh.id, name = %fresh.name, "inserted entry");
                fresh.id
            }
            Some(mut persisted) => {
                self.validate(entry)?;
                persisted.name = entry.name.clone();
                persisted.value = entry.value.clone();
                persisted.parent = entry.parent;
                self.backend.update(&persisted)?;
                debug!(id = persisted.id, name = %persisted.name, "updated entry");
                persisted.id
            }
        };
        self.revalidate_ancestry(Some(id))?;
        self.get(id)?.ok_or_else(|| HoldallError::Corrupt {
            message: format!("entry {id} vanished while it was being saved"),
        })
    }

    /// Delete an entry, cascading to or orphaning its children as configured.
    /// Returns the deleted entry with the children it had, or `None` when
    /// nothing with that id exists.
    ///
    /// Entries still referenced from outside the deleted set are refused
    /// before anything changes, as are children that would not survive
    /// orphaning. Children are handled before their parent row goes.
    pub fn delete(&mut self, entry: &Entry) -> Result<Option<Entry>> {
        self.delete_by_id(entry.id)
    }

    pub fn delete_by_id(&mut self, id: EntryId) -> Result<Option<Entry>> {
        let Some(deleted) = self.get(id)? else {
            warn!(id, "nothing to delete");
            return Ok(None);
        };
        let mut doomed = self.doomed(&deleted)?;
        for target in doomed.iter() {
            let aliases = self.backend.query(
                &Criterion::value(Comparator::Equal, Value::reference(target)),
                &self.behavior,
            )?;
            if let Some(alias) = aliases.iter().find(|alias| !doomed.contains(alias.id)) {
                return Err(HoldallError::Validation(format!(
                    "entry {target} is still referenced by entry {}",
                    alias.id
                )));
            }
        }
        if !self.behavior.cascade_delete {
            for child in &deleted.children {
                self.validate(&orphaned(child))?;
            }
        }
        self.remove(&deleted, &mut doomed)?;
        self.revalidate_ancestry(deleted.parent)?;
        Ok(Some(deleted))
    }

    // The entry itself plus, when deletes cascade, every descendant.
    fn doomed(&self, root: &Entry) -> Result<RoaringTreemap> {
        let mut doomed = RoaringTreemap::new();
        doomed.insert(root.id);
        if self.behavior.cascade_delete {
            let mut pending: Vec<EntryId> = root.children.iter().map(|child| child.id).collect();
            while let Some(id) = pending.pop() {
                if doomed.insert(id) {
                    pending.extend(self.backend.children_of(id)?.iter().map(|child| child.id));
                }
            }
        }
        Ok(doomed)
    }

    // Depth first, children before parents; `pending` stops cyclic parent chains.
    fn remove(&mut self, entry: &Entry, pending: &mut RoaringTreemap) -> Result<()> {
        if !pending.remove(entry.id) {
            return Ok(());
        }
        for child in &entry.children {
            if self.behavior.cascade_delete {
                if let Some(child) = self.get(child.id)? {
                    self.remove(&child, pending)?;
                }
            } else {
                self.backend.update(&orphaned(child))?;
            }
        }
        self.backend.delete(entry.id)?;
        debug!(id = entry.id, children = entry.children.len(), "deleted entry");
        Ok(())
    }

    /// Delete every entry matching the criterion; returns what matched.
    pub fn delete_matching(&mut self, criterion: &Criterion) -> Result<Vec<Entry>> {
        let matched = self.query(criterion)?;
        for entry in &matched {
            self.delete_by_id(entry.id)?;
        }
        Ok(matched)
    }

    pub fn query(&self, criterion: &Criterion) -> Result<Vec<Entry>> {
        let mut found = self.backend.query(criterion, &self.behavior)?;
        for entry in found.iter_mut() {
            entry.children = self.backend.children_of(entry.id)?;
        }
        debug!(criteria = criterion.len(), rows = found.len(), "query complete");
        Ok(found)
    }

    pub fn get(&self, id: EntryId) -> Result<Option<Entry>> {
        match self.backend.lookup(id)? {
            Some(mut entry) => {
                entry.children = self.backend.children_of(id)?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    pub fn children(&self, id: EntryId) -> Result<Vec<Entry>> {
        self.backend.children_of(id)
    }

    /// Follow a reference value to the value it aliases.
    pub fn resolve<'a>(&self, value: &'a Value) -> Result<Cow<'a, Value>> {
        value.resolve(&self.backend, self.behavior.guard_reference_cycles)
    }

    /// Human readable form of a value, references resolved.
    pub fn render(&self, value: &Value) -> Result<String> {
        Ok(self.resolve(value)?.to_string())
    }

    pub fn compare(&self, a: &Value, b: &Value) -> Result<Ordering> {
        self.resolve(a)?.compare(&*self.resolve(b)?)
    }

    fn validate(&self, entry: &Entry) -> Result<()> {
        if entry.name.trim().is_empty() {
            return Err(HoldallError::Validation("an entry needs a non-blank name".into()));
        }
        match entry.value {
            Value::Number(number) if !number.is_finite() => {
                return Err(HoldallError::Validation(format!(
                    "number {number} cannot be stored, only finite numbers can"
                )));
            }
            Value::Reference(target) if self.backend.lookup(target)?.is_none() => {
                return Err(HoldallError::DanglingReference(target));
            }
            _ => (),
        }
        if let Some(parent) = entry.parent {
            if parent == entry.id {
                return Err(HoldallError::Validation(format!(
                    "entry {parent} cannot be its own parent"
                )));
            }
            if self.backend.lookup(parent)?.is_none() {
                return Err(HoldallError::Validation(format!(
                    "parent entry {parent} does not exist"
                )));
            }
        }
        Ok(())
    }

    // Walk up the parent chain from `start`, detaching the first link that
    // points at an entry no longer present. Cyclic parent graphs stop the walk.
    fn revalidate_ancestry(&mut self, start: Option<EntryId>) -> Result<()> {
        let mut visited = RoaringTreemap::new();
        let mut current = match start {
            Some(id) => self.backend.lookup(id)?,
            None => None,
        };
        while let Some(entry) = current {
            if !visited.insert(entry.id) {
                warn!(id = entry.id, "parent chain loops back on itself");
                break;
            }
            let Some(parent) = entry.parent else {
                break;
            };
            current = self.backend.lookup(parent)?;
            if current.is_none() {
                warn!(id = entry.id, parent, "detaching entry from a missing parent");
                let mut orphan = entry;
                orphan.parent = None;
                self.backend.update(&orphan)?;
            }
        }
        Ok(())
    }
}

fn orphaned(child: &Entry) -> Entry {
    let mut orphan = child.detached();
    orphan.parent = None;
    orphan
}
