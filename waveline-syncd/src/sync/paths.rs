/// Server-relative view of a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativePath {
    /// Path with root text stripped, always `/`-separated.
    pub file: String,
    /// `file` without its leading empty segment and trailing file name.
    pub dir: String,
    /// Final path segment.
    pub name: String,
}

/// Converts an absolute local path into the `(file, dir, name)` triple the
/// server expects.
///
/// Every occurrence of every root is removed from `path`, in root order, not
/// just a leading prefix. Paths outside every root pass through with only
/// separator normalization.
pub fn relativize(path: &str, roots: &[String], separator: &str) -> RelativePath {
    let mut stripped = path.to_string();
    for root in roots.iter().filter(|root| !root.is_empty()) {
        stripped = stripped.replace(root.as_str(), "");
    }

    let file = if separator.is_empty() || separator == "/" {
        stripped
    } else {
        stripped.replace(separator, "/")
    };

    let segments: Vec<&str> = file.split('/').collect();
    let name = segments.last().copied().unwrap_or_default().to_string();
    let dir = if segments.len() > 2 {
        segments[1..segments.len() - 1].join("/")
    } else {
        String::new()
    };

    RelativePath { file, dir, name }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots(list: &[&str]) -> Vec<String> {
        list.iter().map(|root| root.to_string()).collect()
    }

    #[test]
    fn strips_root_and_splits_dir_and_name() {
        let rel = relativize("/music/rock/song.mp3", &roots(&["/music"]), "/");
        assert_eq!(rel.file, "/rock/song.mp3");
        assert_eq!(rel.dir, "rock");
        assert_eq!(rel.name, "song.mp3");
    }

    #[test]
    fn file_directly_under_root_has_empty_dir() {
        let rel = relativize("/music/song.flac", &roots(&["/music"]), "/");
        assert_eq!(rel.file, "/song.flac");
        assert_eq!(rel.dir, "");
        assert_eq!(rel.name, "song.flac");
    }

    #[test]
    fn dir_and_name_rebuild_stripped_path() {
        let all = roots(&["/srv/a", "/home/me/Music"]);
        for path in [
            "/srv/a/x/y/z.m4a",
            "/home/me/Music/Artist/Album/01 Intro.mp3",
            "/home/me/Music/loose.flac",
        ] {
            let rel = relativize(path, &all, "/");
            let rebuilt = if rel.dir.is_empty() {
                format!("/{}", rel.name)
            } else {
                format!("/{}/{}", rel.dir, rel.name)
            };
            assert_eq!(rebuilt, rel.file, "path {path}");
        }
    }

    #[test]
    fn normalizes_native_separator() {
        let rel = relativize(
            r"C:\Music\Jazz\Blue Train\01.flac",
            &roots(&[r"C:\Music"]),
            r"\",
        );
        assert_eq!(rel.file, "/Jazz/Blue Train/01.flac");
        assert_eq!(rel.dir, "Jazz/Blue Train");
        assert_eq!(rel.name, "01.flac");
    }

    #[test]
    fn strips_every_occurrence_of_root_text() {
        let rel = relativize("/m/a/m/b.mp3", &roots(&["/m"]), "/");
        assert_eq!(rel.file, "/a/b.mp3");
        assert_eq!(rel.dir, "a");
    }

    #[test]
    fn path_outside_roots_does_not_fail() {
        let rel = relativize("/other/x.mp3", &roots(&["/music"]), "/");
        assert_eq!(rel.file, "/other/x.mp3");
        assert_eq!(rel.name, "x.mp3");

        let bare = relativize("x.mp3", &[], "/");
        assert_eq!(bare.dir, "");
        assert_eq!(bare.name, "x.mp3");
    }
}
