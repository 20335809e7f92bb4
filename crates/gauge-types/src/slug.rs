//! Deterministic slugs for key segments.
//!
//! A slug is the lowercase, hyphen-separated form of a human-readable name.
//! Word boundaries are whitespace, punctuation, and camel-case transitions,
//! so `"MyComponent"`, `"my component"` and `"my_component"` all map to
//! `"my-component"`. Names that share a slug address the same record.

use heck::ToKebabCase;

use crate::error::TypeError;

/// Slug a name. May return an empty string for names without any
/// alphanumeric content; use [`try_slug`] when the slug becomes a key.
pub fn slug(name: &str) -> String {
    name.to_kebab_case()
}

/// Slug a name, rejecting names that slug to nothing.
pub fn try_slug(name: &str) -> Result<String, TypeError> {
    let slugged = slug(name);
    if slugged.is_empty() {
        return Err(TypeError::InvalidSlug {
            name: name.to_string(),
        });
    }
    Ok(slugged)
}
