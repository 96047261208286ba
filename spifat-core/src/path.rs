//! Hidden-file name mangling.
//!
//! The medium cannot reliably store names beginning with `.`, so hidden
//! entries are stored with a leading `_` and presented `.`-prefixed at
//! the POSIX boundary. The rewrite is stateless and lossy: a genuine
//! stored leading underscore is indistinguishable from a mangled hidden
//! file and will always be presented as hidden. That ambiguity is part of
//! the on-medium convention and is preserved, not fixed.

/// Rewrite a POSIX path into its stored form: every path component that
/// begins with `.` is stored beginning with `_`.
///
/// Applies to every component, not only the leaf. Idempotent.
///
/// # Examples
/// ```
/// use spifat_core::path::to_stored_path;
/// assert_eq!(to_stored_path("/.config"), "/_config");
/// assert_eq!(to_stored_path("/.cache/.keep"), "/_cache/_keep");
/// assert_eq!(to_stored_path("/notes.txt"), "/notes.txt");
/// ```
pub fn to_stored_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev = '\0';
    for ch in path.chars() {
        if ch == '.' && prev == '/' {
            out.push('_');
        } else {
            out.push(ch);
        }
        prev = ch;
    }
    out
}

/// Rewrite a stored leaf name for presentation: a leading `_` becomes `.`.
///
/// Only applied to leaf names during directory enumeration; stored paths
/// are never rewritten inbound.
///
/// # Examples
/// ```
/// use spifat_core::path::to_visible_name;
/// assert_eq!(to_visible_name("_config"), ".config");
/// assert_eq!(to_visible_name("notes.txt"), "notes.txt");
/// ```
pub fn to_visible_name(name: &str) -> String {
    match name.strip_prefix('_') {
        Some(rest) => format!(".{rest}"),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_component() {
        assert_eq!(to_stored_path("/.hidden"), "/_hidden");
    }

    #[test]
    fn test_every_component() {
        assert_eq!(to_stored_path("/.a/.b/.c"), "/_a/_b/_c");
        assert_eq!(to_stored_path("/dir/.env"), "/dir/_env");
    }

    #[test]
    fn test_inner_dots_untouched() {
        assert_eq!(to_stored_path("/archive.tar.gz"), "/archive.tar.gz");
        assert_eq!(to_stored_path("/a.d/file"), "/a.d/file");
    }

    #[test]
    fn test_idempotent() {
        let once = to_stored_path("/.config/.keep");
        assert_eq!(to_stored_path(&once), once);
    }

    #[test]
    fn test_visible_name() {
        assert_eq!(to_visible_name("_hidden"), ".hidden");
        assert_eq!(to_visible_name("plain"), "plain");
        assert_eq!(to_visible_name(""), "");
    }

    #[test]
    fn test_round_trip_leaf() {
        assert_eq!(to_visible_name(&to_stored_path("/.config")[1..]), ".config");
    }

    #[test]
    fn test_genuine_underscore_is_presented_hidden() {
        // The documented lossy edge: cannot be told apart from a mangled
        // hidden file.
        assert_eq!(to_visible_name("_underscore"), ".underscore");
    }
}
