//! tabgroup-core: pure domain model for ticket-keyed tab grouping.
//! Identifiers, the tab-update event shape, key extraction and the
//! ticket → group cache. No IO, no async.

pub mod key;
pub mod ticket_map;
pub mod types;

pub use key::{ClassificationKey, DomainGate, HOTFIX_TITLE, extract_key, is_ticket_id};
pub use ticket_map::{MapDecodeError, STORAGE_KEY, TicketGroupMap};
pub use types::{GroupHandle, GroupInfo, GroupProperties, TabId, TabUpdateEvent};
