//! A non-blocking, cache-conscious concurrent hash table core.
//!
//! This crate implements the packed-state bucket machinery, the
//! Harris-style ordered chain traversal, and the cooperative migration
//! protocol that a concurrent set or map facade is built on top of. It
//! owns no keys and no values: callers supply a [`hooks::TableHooks`]
//! implementation that manages whatever side-array of payload data lives
//! parallel to the core's slot array, and drive lookups/mutations
//! through [`table::Table::finder`] and [`table::Table::updater`].
//!
//! Lookups are wait-free; inserts/replaces/removes are lock-free; resize
//! is cooperative, meaning any thread that observes the table is full
//! enough actively helps migrate it rather than waiting on one dedicated
//! background thread.
//!
//! ```
//! use slothash::table::Table;
//! use slothash::hooks::TableHooks;
//! use std::sync::Mutex;
//!
//! #[derive(Default)]
//! struct Payload(Mutex<Vec<Option<u64>>>);
//! impl TableHooks for Payload {
//!     fn copy(&self, old: &Self, old_index: u32, new_index: u32) {
//!         let v = old.0.lock().unwrap()[old_index as usize];
//!         let mut mine = self.0.lock().unwrap();
//!         if mine.len() <= new_index as usize {
//!             mine.resize(new_index as usize + 1, None);
//!         }
//!         mine[new_index as usize] = v;
//!     }
//!     fn reset(&self, index: u32) {
//!         if let Some(slot) = self.0.lock().unwrap().get_mut(index as usize) {
//!             *slot = None;
//!         }
//!     }
//!     fn create(new_table_size: u32) -> Self {
//!         Payload(Mutex::new(vec![None; new_table_size as usize]))
//!     }
//! }
//!
//! let table = Table::<Payload>::new(16).unwrap();
//! assert_eq!(table.size(), 0);
//! ```

pub mod alloc;
pub mod codec;
pub mod config;
pub mod error;
pub mod finder;
pub mod hooks;
pub mod iter;
pub mod resize;
pub mod splitter;
pub mod table;
pub mod updater;

pub use config::{DefaultConfig, TableConfig};
pub use error::{TableError, TableResult};
pub use finder::{FindStep, Finder};
pub use hooks::TableHooks;
pub use iter::Iter;
pub use splitter::RangeSplitter;
pub use table::Table;
pub use updater::{AllocStep, NextStep, Updater};
