//! Quiz and game outcomes, kept as an append-only collection in the
//! key-value area and read back by the results view.

pub mod record;
pub mod store;

pub use record::{newest_first, ResultKind, ResultRecord, GUEST_USER};
pub use store::{generate_id, ResultStore};
