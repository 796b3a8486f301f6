pub mod client;
pub mod error;
pub mod ram;
pub mod retry;
pub mod signature;

#[cfg(test)]
pub mod test_helpers;

pub use client::{Client, DEFAULT_RAM_ENDPOINT};
pub use error::{classify, ApiError, ErrorClass};
pub use ram::{Policy, PolicyEntities, PolicyType, RamApi, RamGateway};
pub use retry::{retry, Backoff, RetryError};
