//! Derive macros for the appchain engine.
//!
//! Provides:
//! - `#[derive(BinaryCodec)]` - deterministic binary serialization
//! - `#[derive(Error)]` - error type boilerplate (thiserror replacement)

mod codec;
mod error;

use proc_macro::TokenStream;

/// Implements the crate's `Encode` and `Decode` traits for a struct or enum.
///
/// Fields are written in declaration order with the crate's little-endian,
/// length-prefixed format, which makes the output suitable for hashing.
#[proc_macro_derive(BinaryCodec)]
pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    codec::derive_binary_codec(input)
}

/// Implements `Display` and `std::error::Error` from `#[error("...")]`
/// attributes on each variant.
#[proc_macro_derive(Error, attributes(error))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
