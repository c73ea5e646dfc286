/*!
Storage for public assembly announcements.

Events fetched from the municipal feed are kept in a single SQLite table so
repeated fetches stay idempotent and every event is announced at most once.
*/

pub mod event;
pub mod store;

pub use event::Event;
pub use store::{EventStore, StoreError, StoreOptions};
