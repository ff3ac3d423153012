// Shared domain types: used by the engine, the table layer and the hub.
// None of those layers depends on the others for these definitions.

pub mod common;
pub mod notification;
pub mod record;

pub use common::*;
pub use notification::*;
pub use record::*;
