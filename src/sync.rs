//! Provides a thread-safe, blocking query client.
//!
//! To use this module, enable a crate feature called "sync".

mod builder;
mod client;
mod value_initializer;

pub use {builder::QueryClientBuilder, client::QueryClient};
