//! Unit tests for configuration loading and request construction.
//!
//! - `helpers`: Shared test utilities
//! - `precedence`: Layer precedence and defaults
//! - `validation`: Source option consistency and request building
//! - `resolution`: Token, cache root, and engine settings resolution

mod helpers;
