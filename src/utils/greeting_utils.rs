#![forbid(unsafe_code)]

use path_absolutize::Absolutize;
use std::ops::Deref;
use std::path::Path;

// ***************************************************************************
// GENERAL PUBLIC FUNCTIONS
// ***************************************************************************
// ---------------------------------------------------------------------------
// get_absolute_path:
// ---------------------------------------------------------------------------
/** Replace tilde (~) and environment variable values in a path name and
 * then construct the absolute path name.  Unlike canonicalize, absolutize
 * does not require the file to exist.
 *
 * On any failure the original path is returned unchanged.
 */
pub fn get_absolute_path(path: &str) -> String {
    // Replace ~ and environment variable values if possible.
    let s = match shellexpand::full(path) {
        Ok(x) => x,
        Err(_) => return path.to_owned(),
    };

    // Convert to absolute path if necessary.
    let p = Path::new(s.deref());
    let p1 = match p.absolutize() {
        Ok(x) => x,
        Err(_) => return path.to_owned(),
    };
    let p2 = match p1.to_str() {
        Some(x) => x,
        None => return path.to_owned(),
    };

    p2.to_owned()
}

// ---------------------------------------------------------------------------
// non_empty:
// ---------------------------------------------------------------------------
/** Collapse empty strings to None so that an empty setting behaves exactly
 * like a missing one.
 */
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_path_unchanged() {
        assert_eq!(get_absolute_path("/opt/greeting"), "/opt/greeting");
    }

    #[test]
    fn relative_path_made_absolute() {
        let p = get_absolute_path("config/greeting.toml");
        assert!(Path::new(&p).is_absolute());
        assert!(p.ends_with("config/greeting.toml"));
    }

    #[test]
    fn tilde_expanded() {
        let p = get_absolute_path("~/.greeting_server");
        assert!(!p.starts_with('~'));
        assert!(p.ends_with(".greeting_server"));
    }

    #[test]
    fn empty_values_collapse() {
        assert_eq!(non_empty(None), None);
        assert_eq!(non_empty(Some(String::new())), None);
        assert_eq!(non_empty(Some("v1".to_string())), Some("v1".to_string()));
    }
}
