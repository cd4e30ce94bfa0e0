//! Archive-relative paths and file name sanitizing.

/// Longest name kept for a single path segment.
const MAX_SEGMENT_LEN: usize = 255;

/// Strip `root` and the following separator from `remote_path`.
///
/// A path outside `root` is kept whole. A path equal to `root` (a single file
/// was selected) keeps its file name.
pub fn relative_path<'a>(remote_path: &'a str, root: &str) -> &'a str {
    let root = root.trim_matches('/');
    if root.is_empty() {
        return remote_path;
    }
    if remote_path == root {
        return remote_path.rsplit('/').next().unwrap_or(remote_path);
    }
    remote_path
        .strip_prefix(root)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(remote_path)
}

/// Replace characters that are illegal in file names with `_`, segment by segment.
///
/// Empty, `.` and `..` segments are dropped. Returns `None` when nothing is left.
pub fn sanitize_path(path: &str) -> Option<String> {
    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .map(sanitize_segment)
        .collect();

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_SEGMENT_LEN)
        .collect()
}
