pub mod catalog;
pub mod db;
pub mod error;
pub mod metrics;
pub mod models;
pub mod service;

pub use error::{Error, Result};
