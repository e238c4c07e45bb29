use tracing::trace;

use crate::criteria::{Criterion, Evaluator};
use crate::entry::Entry;
use crate::error::{HoldallError, Result};
use crate::store::{Backend, Behavior};
use crate::text::Normalizer;
use crate::value::{EntryId, Resolver, Value};

// ------------- In-memory backend -------------
/// The whole dataset as one flat list, scanned linearly on every read.
///
/// Children are never cached: every read recomputes them from the list, so
/// they are always fresh. Not synchronized; callers sharing one across
/// threads must lock it themselves.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    entries: Vec<Entry>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }
    fn position(&self, id: EntryId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == id)
    }
}

impl Resolver for MemoryBackend {
    fn referenced(&self, id: EntryId) -> Result<Option<Value>> {
        Ok(self.position(id).map(|at| self.entries[at].value.clone()))
    }
}

impl Backend for MemoryBackend {
    fn lookup(&self, id: EntryId) -> Result<Option<Entry>> {
        Ok(self.position(id).map(|at| self.entries[at].detached()))
    }

    fn children_of(&self, id: EntryId) -> Result<Vec<Entry>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.parent == Some(id))
            .map(Entry::detached)
            .collect())
    }

    fn insert(&mut self, entry: &mut Entry) -> Result<()> {
        entry.id = self.entries.iter().map(|kept| kept.id).max().map_or(1, |max| max + 1);
        trace!(id = entry.id, "appending entry");
        self.entries.push(entry.detached());
        Ok(())
    }

    fn update(&mut self, entry: &Entry) -> Result<()> {
        let at = self.position(entry.id).ok_or_else(|| {
            HoldallError::Validation(format!("entry {} is not in memory", entry.id))
        })?;
        self.entries[at] = entry.detached();
        Ok(())
    }

    fn delete(&mut self, id: EntryId) -> Result<()> {
        self.entries.retain(|entry| entry.id != id);
        Ok(())
    }

    fn query(&self, criterion: &Criterion, behavior: &Behavior) -> Result<Vec<Entry>> {
        let formatter = Normalizer::from(behavior);
        let evaluator =
            Evaluator::new(&formatter, self).guarding_cycles(behavior.guard_reference_cycles);
        let mut found = Vec::new();
        for entry in &self.entries {
            if evaluator.matches(entry, criterion)? {
                found.push(entry.detached());
            }
        }
        Ok(found)
    }
}
