pub mod config;
pub mod context;
pub mod fs_names;
pub mod interrupt;
pub mod ledger;
pub mod logging;
pub mod retry;
