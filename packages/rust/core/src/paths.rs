//! URL path helpers.

/// Join path segments into a normalized path with leading and trailing
/// slashes. Empty segments and duplicate slashes are dropped.
///
/// `make_path(&["/about//", "team"])` → `/about/team/`; no segments → `/`.
pub fn make_path(segments: &[&str]) -> String {
    let parts: Vec<String> = segments
        .iter()
        .map(|segment| {
            segment
                .split('/')
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join("/")
        })
        .filter(|segment| !segment.is_empty())
        .collect();

    if parts.is_empty() {
        return "/".to_string();
    }
    format!("/{}/", parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_and_normalizes() {
        assert_eq!(make_path(&["about"]), "/about/");
        assert_eq!(make_path(&["/about//", "team"]), "/about/team/");
        assert_eq!(make_path(&["", "/", "de", "/stadt/berlin/"]), "/de/stadt/berlin/");
    }

    #[test]
    fn empty_is_root() {
        assert_eq!(make_path(&[]), "/");
        assert_eq!(make_path(&["", "//"]), "/");
    }
}
