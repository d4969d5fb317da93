pub mod archive;
pub mod calc;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod output;
pub mod parser;
pub mod pdf;
pub mod pool;
pub mod portal;
pub mod router;
pub mod selection;
pub mod store;
pub mod sync;
pub mod view;
