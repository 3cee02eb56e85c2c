//! Lectern core: folds four independent library feeds into one consistent
//! set of dashboard statistics.
//!
//! - [`source`] - raw feed payloads
//! - [`alias`] - ordered legacy field-name aliases
//! - [`reducer`] - one pure reducer per feed
//! - [`xref`] - catalog metadata used by the archive join
//! - [`stats`] / [`state`] - fragments and the aggregate they merge into
//! - [`register`] - revisioned last-writer-wins slot

pub mod alias;
pub mod error;
pub mod reducer;
pub mod register;
pub mod settings;
pub mod source;
pub mod state;
pub mod stats;
pub mod xref;

pub use error::{DecodeError, ReduceError};
pub use reducer::{Clock, FixedClock, Reducer, ReducerSettings, Reduction, SystemClock};
pub use settings::OrgSettings;
pub use source::{Document, Snapshot, Source, PLACEHOLDER_ID};
pub use state::{AggregateState, DashboardStats};
pub use stats::{ArchiveFragment, BookFragment, BorrowedBook, CategoryCount, Fragment, MemberFragment};
pub use xref::{CrossReferenceEntry, CrossReferenceStore, CrossReferenceTable};
