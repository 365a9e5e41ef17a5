mod cancel;
pub mod codec;
pub mod config;
pub mod discovery;
pub mod error;
pub mod fetch;
pub mod policy;
pub mod replay;
pub mod testing;

pub use error::DlqError;

#[cfg(test)]
mod fetch_test;
