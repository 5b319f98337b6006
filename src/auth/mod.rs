//! Authentication input handling.
//!
//! - [`cookies`] - Cookie encodings detection and the canonical [`Credential`]

pub mod cookies;

pub use cookies::{CookieEntry, CookieError, CookieFormat, Credential, parse_cookies};
