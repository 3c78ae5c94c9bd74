// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crate-wide declarative macros.

/// Give an enum one stable string name per variant: an `as_str()` method
/// plus a `Display` impl that writes it.
///
/// Arms are ordinary match patterns, so unit, tuple, and struct variants
/// are all spelled the way a `match` would spell them:
///
/// ```ignore
/// crate::wire_name! {
///     Coalesce {
///         Coalesce::Latest => "latest",
///         Coalesce::Earliest => "earliest",
///         Coalesce::All => "all",
///     }
/// }
/// ```
///
/// The names double as the serde snake_case encodings of these enums; a
/// mismatch between the two shows up as a wire-format test failure.
#[macro_export]
macro_rules! wire_name {
    ($enum:ident { $( $pattern:pat => $name:literal ),+ $(,)? }) => {
        impl $enum {
            /// Stable name used on the wire and in logs.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $pattern => $name, )+
                }
            }
        }

        impl std::fmt::Display for $enum {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}
