mod account;
mod integrity;
mod record;
mod transfer;

pub use account::*;
pub use integrity::*;
pub use record::*;
pub use transfer::*;
