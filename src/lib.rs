#![deny(clippy::mod_module_files)]
//! Keeps the collapse/expand state of a rendered tree report in sync across
//! the URL fragment, the legacy query string, the tab session store and the
//! profile store, and carries it through a query-stripping redirect.

pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod page;
pub mod redirect;
pub mod resolver;
pub mod scenario;
pub mod schedule;
pub mod share;
pub mod state;
pub mod storage;
pub mod tree;
pub mod watcher;

pub use codec::{Codec, TagPolicy};
pub use config::SyncConfig;
pub use error::Error;
pub use page::{PageSession, SessionContext};
pub use state::{CollapseState, NodeId, StateMap};
pub use storage::StorageTiers;
