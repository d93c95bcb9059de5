//! FarmLink chat core — connection management, local chat cache, image
//! transfer, and session bootstrap shared by the CLI.

pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod connection;
pub mod images;
pub mod init;
pub mod message;
