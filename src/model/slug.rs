//! Slug derivation.
//!
//! The slug names a work item's output directory and is the substring used
//! to match artifacts left behind by the build pipeline. Changing this
//! function orphans every artifact already on disk.

/// Maximum slug length, in characters.
pub const SLUG_MAX_LEN: usize = 20;

/// Derive a filesystem-safe identifier from a display name.
///
/// Lower-cases the name, drops everything outside `[a-z0-9]` and
/// whitespace, collapses each whitespace run into a single `-`, then
/// truncates to [`SLUG_MAX_LEN`].
///
/// ```
/// use bootstrap_runner::model::slug::derive_slug;
///
/// assert_eq!(derive_slug("FitTrack"), "fittrack");
/// assert_eq!(derive_slug("Meal  Planner Pro!"), "meal-planner-pro");
/// ```
pub fn derive_slug(display_name: &str) -> String {
    let mut slug = String::with_capacity(SLUG_MAX_LEN);
    let mut in_whitespace = false;

    for c in display_name.chars().flat_map(char::to_lowercase) {
        if c.is_whitespace() {
            in_whitespace = true;
            continue;
        }
        if !(c.is_ascii_lowercase() || c.is_ascii_digit()) {
            // Dropped characters do not end a whitespace run.
            continue;
        }
        if in_whitespace {
            slug.push('-');
            in_whitespace = false;
        }
        slug.push(c);
    }
    if in_whitespace {
        slug.push('-');
    }

    slug.truncate(SLUG_MAX_LEN);
    slug
}
