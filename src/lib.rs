pub mod config;
pub mod db;
pub mod decode;
pub mod error;
pub mod import;
pub mod lookup;
pub mod process;
pub mod schema;

pub use config::{ImportConfig, LoadOptions, LoadStrategy, Tolerance};
pub use error::{ImportError, ImportResult};
