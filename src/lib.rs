pub mod configuration;
pub use configuration::*;

pub mod error_handling;

pub mod normalization;
pub use normalization::*;

pub mod ingest;

pub mod storage;

pub mod web_interface;
