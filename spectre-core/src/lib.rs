//! Core types shared by every Spectre component.
//!
//! This crate is IO-free: it defines the canonical [`Event`] record, resource
//! identity, the derived status model, query filters and cursors, and the
//! error taxonomy used across the workspace. The append log, the graph layer
//! and the runtime all build on these types without adding their own
//! divergent copies.

pub mod cursor;
pub use cursor::Cursor;

mod error;
pub use error::{Error, ErrorCode};
/// Convenient alias for `Result<T, Error>`
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub mod event;
pub use event::{Event, EventType};

pub mod filter;
pub use filter::EventFilter;

pub mod identity;
pub use identity::{GroupVersion, ResourceIdentity};

pub mod object;
pub use object::{ObjectMeta, OwnerReference, RawObject};

pub mod status;
pub use status::{ResourceStatus, StatusSegment};

pub mod time;
pub use time::Timestamp;
