//! Credential handling with secure memory.

mod credentials;

pub use credentials::SecretString;
