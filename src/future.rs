//! Provides a thread-safe, asynchronous (futures aware) query client.
//!
//! To use this module, enable a crate feature called "future".

mod builder;
mod client;
mod value_initializer;

pub use {builder::QueryClientBuilder, client::QueryClient};
