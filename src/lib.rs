pub mod aggregate;
pub mod app;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod frame;
pub mod obs;
pub mod output;
pub mod reader;
pub mod s3;
pub mod store;
pub mod table_io;
pub mod transform;
