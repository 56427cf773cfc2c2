// Library for the binaries and tests to access modules

pub mod accounting;
pub mod config;
pub mod error;
pub mod history_repo;
pub mod models;
pub mod routes;
pub mod snapshot_store;
pub mod source;
pub mod version;
pub mod worker;
