pub mod broker;
pub mod error;
pub mod headers;
pub mod model;
pub mod record;
