pub mod autosave;
pub mod coach;
pub mod dashboard;
pub mod db;
pub mod models;
pub mod persistence;
pub mod remote;
pub mod service;
pub mod store;
pub mod sync;
pub mod transfer;
#[cfg(test)]
mod test_support;
