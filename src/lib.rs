//! Accrual - immutable per-project accumulation of configuration items.
//!
//! Accrual records sets of items (typically accepted API breaks) per project,
//! keyed by a `group:name` identity. Each configuration pass merges newly
//! observed items into what was recorded before; nothing is ever dropped.
//!
//! The [`PerProject`] accumulator is a pure value. [`PerProjectFile`] and
//! [`Config`] add persistence and the layered settings that locate it.

pub mod breaks;
pub mod config;
pub mod error;
pub mod key;
pub mod per_project;
pub mod store;

pub use breaks::{is_accepted, AcceptedBreak, AcceptedBreaks};
pub use config::{accrual_home, Config, StoreConfig};
pub use error::{AccrualError, FailOpen, Result};
pub use key::GroupAndName;
pub use per_project::{PerProject, PerProjectBuilder};
pub use store::{FileFormat, PerProjectFile};
