//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing IDs from different entity types. Catalog and purchase
//! backends hand out opaque string identifiers, so the wrappers are
//! `String`-backed.

/// Macro to define a type-safe string ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>`, `From<&str>` and `Display` implementations
///
/// # Example
///
/// ```rust
/// # use subshare_core::define_id;
/// define_id!(ListingId);
/// define_id!(SellerId);
///
/// let listing = ListingId::new("netflix");
/// let seller = SellerId::new("netflix");
///
/// // These are different types, so this won't compile:
/// // let _: ListingId = seller;
/// assert_eq!(listing.as_str(), seller.as_str());
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from anything string-like.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// Define standard entity IDs
define_id!(ProductId);
define_id!(UserCode);
define_id!(ProductCode);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_and_conversions() {
        let id = ProductId::new("spotify-family");
        assert_eq!(id.to_string(), "spotify-family");
        assert_eq!(id.as_str(), "spotify-family");
        assert_eq!(ProductId::from("spotify-family"), id);
        assert_eq!(String::from(id.clone()), "spotify-family");
    }

    #[test]
    fn test_id_serde_is_transparent() {
        let id = UserCode::new("USR-42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"USR-42\"");

        let parsed: UserCode = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_ids_order_lexically() {
        let mut ids = vec![ProductId::new("b"), ProductId::new("a")];
        ids.sort();
        assert_eq!(ids, vec![ProductId::new("a"), ProductId::new("b")]);
    }
}
