//! HTTP front door.

pub mod server;

pub use server::{StatusHandle, StatusServer};
