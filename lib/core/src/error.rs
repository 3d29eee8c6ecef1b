//! Error handling foundation for odin.
//!
//! This module provides only the `Result` type alias using rootcause.
//! Each crate defines its own domain-specific error enums in its own
//! error module and wraps them in a `Report` at the failure site.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_type_works() {
        let ok: Result<i32> = Ok(42);
        assert_eq!(ok.expect("should be ok"), 42);
    }
}
