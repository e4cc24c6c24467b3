pub mod containers;
pub mod error;
pub mod server;
pub mod version;
pub mod web;
pub mod workspace;
