// Pedantic: suppress noise for internal crate code.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
pub mod engine;
pub mod error;
pub mod notify;
pub mod screen;
pub mod table;
pub mod types;
