//! Path helpers and safe file primitives for the organizer.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Maximum total path length. Windows defaults to 260; 255 leaves a
/// small buffer for prefixes and deduplication suffixes.
pub const MAX_TOTAL_PATH_LENGTH: usize = 255;

/// Maximum length for a single path component. NTFS allows 255 per
/// component; slightly lower leaves room for an extension and a " (1)"
/// suffix.
const MAX_COMPONENT_LENGTH: usize = 240;

/// Windows reserved device names that cannot be used as filenames.
const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Remove or replace characters that are invalid in filenames.
///
/// Also guards against Windows reserved device names (CON, PRN, AUX,
/// NUL, COM1-9, LPT1-9) and enforces a maximum component length.
pub fn sanitize_filename(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .collect();

    // Leading/trailing dots and spaces trip up Windows
    sanitized = sanitized.trim_matches(['.', ' ']).to_string();

    while sanitized.contains("__") {
        sanitized = sanitized.replace("__", "_");
    }

    // "CON", "con.mp3" are both invalid on Windows
    let stem = sanitized.split('.').next().unwrap_or("").to_uppercase();
    if WINDOWS_RESERVED_NAMES.contains(&stem.as_str()) {
        sanitized = format!("_{}", sanitized);
    }

    if sanitized.len() > MAX_COMPONENT_LENGTH {
        let mut cut = MAX_COMPONENT_LENGTH;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized = sanitized.trim_end_matches(['.', ' ']).to_string();
    }

    if sanitized.is_empty() {
        "Unknown".to_string()
    } else {
        sanitized
    }
}

/// Return a unique path by appending " (n)" before the extension.
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    let mut counter = 1;
    loop {
        let candidate = parent.join(format!("{} ({}){}", stem, counter, suffix));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Shorten a path that exceeds the total length cap.
///
/// The filename stem is truncated first (the extension survives); if
/// that is not enough, deep parent components are shortened too.
pub fn enforce_path_length(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    if path_str.len() <= MAX_TOTAL_PATH_LENGTH {
        return path.to_path_buf();
    }

    let overflow = path_str.len() - MAX_TOTAL_PATH_LENGTH;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();

    // Truncate the stem first
    if stem.len() > overflow + 3 {
        let mut cut = stem.len() - overflow - 3;
        while !stem.is_char_boundary(cut) {
            cut -= 1;
        }
        let shortened = parent.join(format!("{}...{}", &stem[..cut], suffix));
        if shortened.to_string_lossy().len() <= MAX_TOTAL_PATH_LENGTH {
            return shortened;
        }
    }

    // Shorten deep parent components (skip the root and the filename)
    let mut parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    for i in (1..parts.len().saturating_sub(1)).rev() {
        if parts[i].len() > 20 {
            let mut cut = 17;
            while !parts[i].is_char_boundary(cut) {
                cut -= 1;
            }
            parts[i] = format!("{}...", &parts[i][..cut]);
        }
        let shortened: PathBuf = parts.iter().collect();
        if shortened.to_string_lossy().len() <= MAX_TOTAL_PATH_LENGTH {
            return shortened;
        }
    }

    // Last resort: hard-truncate the stem to whatever fits
    let rebuilt: PathBuf = parts.iter().collect();
    let parent = rebuilt.parent().map(Path::to_path_buf).unwrap_or_default();
    let available = MAX_TOTAL_PATH_LENGTH
        .saturating_sub(parent.to_string_lossy().len() + suffix.len() + 5);
    if available > 0 {
        let mut cut = available.min(stem.len());
        while !stem.is_char_boundary(cut) {
            cut -= 1;
        }
        return parent.join(format!("{}...{}", &stem[..cut], suffix));
    }
    rebuilt
}

/// Copy a file, creating parent directories, and verify the copy's size
/// matches the source.
pub fn safe_copy(src: &Path, dst: &Path) -> io::Result<u64> {
    if !src.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("source file not found: {}", src.display()),
        ));
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }

    let src_size = src.metadata()?.len();
    let copied = fs::copy(src, dst)?;
    if copied != src_size {
        let _ = fs::remove_file(dst);
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "copy verification failed (src={}, dst={}): {}",
                src_size,
                copied,
                dst.display()
            ),
        ));
    }
    Ok(copied)
}

/// Move a file, creating parent directories as needed.
///
/// Same-device moves use an atomic rename. Cross-device moves copy
/// first, verify the destination size, and only then delete the source,
/// so an interrupted copy never loses data.
pub fn safe_move(src: &Path, dst: &Path) -> io::Result<()> {
    if !src.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("source file not found: {}", src.display()),
        ));
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            // Cross-device: copy, verify, then delete the source
            let src_size = src.metadata()?.len();
            fs::copy(src, dst)?;
            let dst_size = dst.metadata().map(|m| m.len()).unwrap_or(0);
            if dst_size != src_size {
                let _ = fs::remove_file(dst);
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "cross-device move failed: size mismatch (src={}, dst={}): {}",
                        src_size,
                        dst_size,
                        dst.display()
                    ),
                ));
            }
            fs::remove_file(src)?;
            Ok(())
        }
    }
}

/// A library root must sit at least two filesystem levels below the
/// root. Blocks `/`, `/usr`, `C:\Windows`, and other hazards.
pub fn is_safe_library_root(path: &Path) -> bool {
    let depth = path
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count();
    depth >= 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("AC/DC"), "AC_DC");
        assert_eq!(sanitize_filename("Track: Title"), "Track_ Title");
        assert_eq!(sanitize_filename("Valid Name"), "Valid Name");
        assert_eq!(sanitize_filename("What?"), "What_");
        assert_eq!(sanitize_filename("a<b>c"), "a_b_c");
        assert_eq!(sanitize_filename("pipe|test"), "pipe_test");
    }

    #[test]
    fn test_sanitize_strips_edge_dots_and_spaces() {
        assert_eq!(sanitize_filename("  name. "), "name");
        assert_eq!(sanitize_filename("..."), "Unknown");
    }

    #[test]
    fn test_sanitize_reserved_names() {
        assert_eq!(sanitize_filename("CON"), "_CON");
        assert_eq!(sanitize_filename("con.mp3"), "_con.mp3");
        assert_eq!(sanitize_filename("COM7"), "_COM7");
        assert_eq!(sanitize_filename("LPT1.wav"), "_LPT1.wav");
        assert_eq!(sanitize_filename("CONCERT"), "CONCERT");
    }

    #[test]
    fn test_sanitize_collapses_underscores() {
        assert_eq!(sanitize_filename("a**b"), "a_b");
    }

    #[test]
    fn test_sanitize_caps_component_length() {
        let long = "x".repeat(400);
        assert!(sanitize_filename(&long).len() <= MAX_COMPONENT_LENGTH);
    }

    #[test]
    fn test_unique_path_no_collision() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        assert_eq!(unique_path(&path), path);
    }

    #[test]
    fn test_unique_path_appends_counter_before_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, b"x").unwrap();
        assert_eq!(unique_path(&path), dir.path().join("song (1).mp3"));

        std::fs::write(dir.path().join("song (1).mp3"), b"x").unwrap();
        assert_eq!(unique_path(&path), dir.path().join("song (2).mp3"));
    }

    #[test]
    fn test_enforce_path_length_short_path_unchanged() {
        let path = Path::new("/music/Artist/Album/01 - Song.mp3");
        assert_eq!(enforce_path_length(path), path.to_path_buf());
    }

    #[test]
    fn test_enforce_path_length_truncates_stem_keeps_extension() {
        let long_title = "t".repeat(300);
        let path = PathBuf::from(format!("/music/Artist/Album/{}.mp3", long_title));
        let shortened = enforce_path_length(&path);
        assert!(shortened.to_string_lossy().len() <= MAX_TOTAL_PATH_LENGTH);
        assert_eq!(shortened.extension().unwrap(), "mp3");
        assert!(shortened.starts_with("/music/Artist/Album"));
    }

    #[test]
    fn test_safe_copy_verifies_and_creates_parents() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.mp3");
        std::fs::write(&src, b"0123456789").unwrap();

        let dst = dir.path().join("deep/nested/dst.mp3");
        let copied = safe_copy(&src, &dst).unwrap();
        assert_eq!(copied, 10);
        assert!(dst.exists());
        assert!(src.exists());
        assert_eq!(std::fs::read(&dst).unwrap(), b"0123456789");
    }

    #[test]
    fn test_safe_copy_missing_source_fails() {
        let dir = tempdir().unwrap();
        let result = safe_copy(&dir.path().join("nope.mp3"), &dir.path().join("dst.mp3"));
        assert!(result.is_err());
    }

    #[test]
    fn test_safe_move_renames() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.mp3");
        std::fs::write(&src, b"content").unwrap();

        let dst = dir.path().join("moved/dst.mp3");
        safe_move(&src, &dst).unwrap();
        assert!(!src.exists());
        assert_eq!(std::fs::read(&dst).unwrap(), b"content");
    }

    #[test]
    fn test_is_safe_library_root() {
        assert!(is_safe_library_root(Path::new("/home/user/Music")));
        assert!(is_safe_library_root(Path::new("/mnt/media")));
        assert!(!is_safe_library_root(Path::new("/")));
        assert!(!is_safe_library_root(Path::new("/usr")));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arbitrary_filename() -> impl Strategy<Value = String> {
        prop::string::string_regex("[a-zA-Z0-9 /:*?\"<>|._-]{1,60}")
            .unwrap()
            .prop_filter("non-empty", |s| !s.is_empty())
    }

    proptest! {
        /// Sanitized names never contain path separators
        #[test]
        fn sanitize_removes_path_separators(input in arbitrary_filename()) {
            let sanitized = sanitize_filename(&input);
            prop_assert!(!sanitized.contains('/'), "found / in: {}", sanitized);
            prop_assert!(!sanitized.contains('\\'), "found \\ in: {}", sanitized);
        }

        /// Sanitized names never contain Windows-invalid characters
        #[test]
        fn sanitize_removes_invalid_chars(input in arbitrary_filename()) {
            let sanitized = sanitize_filename(&input);
            for c in [':', '*', '?', '"', '<', '>', '|'] {
                prop_assert!(!sanitized.contains(c), "found {} in: {}", c, sanitized);
            }
        }

        /// Sanitized names are never empty and never edge-dotted
        #[test]
        fn sanitize_output_is_usable(input in arbitrary_filename()) {
            let sanitized = sanitize_filename(&input);
            prop_assert!(!sanitized.is_empty());
            prop_assert!(!sanitized.starts_with('.') || sanitized.len() > 1);
            prop_assert!(!sanitized.ends_with(' '));
        }

        /// Shortened paths always fit the cap and keep their extension
        #[test]
        fn enforce_length_fits_and_keeps_extension(stem in "[a-z]{1,400}") {
            let path = PathBuf::from(format!("/music/Artist/Album/{}.mp3", stem));
            let shortened = enforce_path_length(&path);
            prop_assert!(shortened.to_string_lossy().len() <= MAX_TOTAL_PATH_LENGTH);
            prop_assert_eq!(
                shortened.extension().and_then(|e| e.to_str()),
                Some("mp3")
            );
        }
    }
}
