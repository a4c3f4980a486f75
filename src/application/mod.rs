// Application layer: the ledger engine (sole writer) and the read-only
// query facade, both built on the storage repository.

pub mod error;
mod ledger;
mod query;

pub use error::*;
pub use ledger::*;
pub use query::*;
