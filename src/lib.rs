pub mod bucket;
pub mod config;
pub mod convert;
pub mod error;
pub mod paths;
pub mod relocate;
pub mod repack;
pub mod workspace;

pub use config::{Config, DEFAULT_CONFIG_PATH};
pub use convert::{ConverterWarning, DocumentConverter, ZipConverter};
pub use error::{Error, Result};
