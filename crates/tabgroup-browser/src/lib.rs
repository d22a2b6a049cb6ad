//! tabgroup-browser: browser IO boundary.
//! Tab-group operations and key-value storage behind mock-injectable
//! traits, plus an in-memory browser and two stores. No business logic.

pub mod error;
pub mod platform;
pub mod simulated;
pub mod store;

pub use error::{PlatformError, StoreError};
pub use platform::TabGroupPlatform;
pub use simulated::{CallCounts, Op, SimGroup, SimulatedBrowser};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
