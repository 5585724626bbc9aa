//! lavfi filter-graph string escaping.
use std::{borrow::Cow, path::Path};

/// Escape a value for use inside a lavfi filter option, e.g. a log path.
///
/// Protects the filter-graph syntax characters so paths containing `:`
/// (drive letters), quotes or separators can't break the expression.
pub fn escape(value: &str) -> Cow<'_, str> {
    const SPECIAL: &[char] = &[':', '\\', '\'', ',', ';', '[', ']', '='];
    if !value.contains(SPECIAL) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 4);
    for c in value.chars() {
        if SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    Cow::Owned(escaped)
}

/// [`escape`] for paths.
pub fn escape_path(path: &Path) -> String {
    escape(&path.to_string_lossy()).into_owned()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn escape_plain() {
        assert_eq!(escape("vmaf.json"), "vmaf.json");
    }

    #[test]
    fn escape_windows_path() {
        assert_eq!(escape(r"C:\logs\v.json"), r"C\:\\logs\\v.json");
    }

    #[test]
    fn escape_quotes_and_separators() {
        assert_eq!(escape("a'b,c;d"), r"a\'b\,c\;d");
    }
}
