//! The receipt ledger core (§4.1): append-only storage plus the inbox,
//! timeline, chain, archive, bootstrap, and search queries built on it.

pub mod error;
pub mod service;

pub use error::{LedgerError, LedgerResult};
pub use service::Ledger;
