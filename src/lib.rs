//! Holdall – a hierarchical attribute store.
//!
//! Everything is an [`Entry`]: a named node holding one typed [`Value`], an
//! optional parent and the children pointing back at it. Entries form a
//! forest; a value may also alias another entry's value through a reference.
//!
//! ## Modules
//! * [`value`] – The [`Value`] sum type, its [`Kind`]s, comparison and reference resolution.
//! * [`entry`] – The [`Entry`] node.
//! * [`criteria`] – Chained filter predicates and their in-memory [`criteria::Evaluator`].
//! * [`text`] – Text formatters used when comparing names and text values.
//! * [`store`] – The [`Store`] façade and the [`Backend`] trait it drives.
//! * [`memory`] – A volatile backend scanning a list.
//! * [`persist`] – A SQLite backend that compiles criteria into SQL.
//! * [`settings`] – Table layout, behavior flags and logging, loaded from TOML and the environment.
//!
//! ## Behavior
//! A [`Behavior`] is fixed when a store is built: whether deletes cascade to
//! children or orphan them, whether text comparisons fold case and
//! diacritics, and whether following references guards against cycles. The
//! SQL backend compares text exactly and refuses the folding flags.
//!
//! ## Persistence
//! [`SqlBackend`] keeps every entry as one row of a single table. Rows holding
//! a reference carry a copy of the referenced scalar so that criteria on
//! values can be answered in SQL; saving an entry refreshes those copies in
//! the same transaction.
//!
//! ## Quick Start
//! ```
//! use holdall::{Behavior, Comparator, Criterion, Entry, MemoryBackend, Store};
//!
//! let mut store = Store::new(MemoryBackend::new(), Behavior::new()).unwrap();
//! let root = store.save(&Entry::new("config", holdall::Value::None)).unwrap();
//! store.save(&Entry::new("port", 8080).child_of(&root)).unwrap();
//! store.save(&Entry::new("host", "localhost").child_of(&root)).unwrap();
//!
//! let found = store.query(&Criterion::value(Comparator::GreaterThan, 1024)).unwrap();
//! assert_eq!(found.len(), 1);
//! assert_eq!(found[0].name, "port");
//! assert_eq!(store.get(root.id).unwrap().unwrap().children.len(), 2);
//! ```

pub mod criteria;
pub mod entry;
pub mod error;
pub mod memory;
pub mod persist;
pub mod settings;
pub mod store;
pub mod text;
pub mod value;

pub use criteria::{Combinator, Comparator, Criterion, Field};
pub use entry::Entry;
pub use error::{HoldallError, Result};
pub use memory::MemoryBackend;
pub use persist::SqlBackend;
pub use settings::{SchemaSettings, Settings};
pub use store::{Backend, Behavior, Store};
pub use value::{EntryId, Kind, Value};
