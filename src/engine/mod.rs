// engine module: seams to the remote backend and the host UI services

pub mod client;
mod interface;
pub mod stub;

pub use client::{BackendClient, DeleteAction, HttpDetails, HttpQuery, VerbAction};
pub use interface::{
    AllowAll, CapabilityChecker, Collaborators, DetailLoader, DialogService, LogMessages,
    MessageSink, NoDialogs, QueryBackend,
};
