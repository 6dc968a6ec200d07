//! Procedural macros for package le-gap
//!
//! These macros are not intended for use outside of this package, but there is no restriction in
//! using them. Their main purpose is to do what procedural macros were intended for, facilitating
//! and refactoring the code base.
//!
//! # EventName
//! The GAP controller logs every controller event and every piece of deferred work it processes.
//! Instead of hand writing a name for each variant of these enumerations, `EventName` generates a
//! method `name` that returns the variant identifier converted into title case.

extern crate proc_macro;

mod event_name;

use proc_macro::TokenStream;

/// Derive a `name` method for an enum
///
/// The generated method has the signature `pub fn name(&self) -> &'static str`. The returned string
/// is the name of the variant in title case, so variant `ScanTimeout` becomes `"Scan Timeout"`.
///
/// Unit, tuple, and struct variants are all supported, the fields of a variant do not contribute
/// to the name.
///
/// # Error
/// A compile error is emitted if this is derived for anything other than an enum.
#[proc_macro_derive(EventName)]
pub fn event_name(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);

    event_name::derive(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
