//! Providers backed by a locally started model server

mod client;
pub mod process;

pub use client::LocalProcessAdapter;
pub use process::{LocalServer, ProcessRegistry};
