//! Media job helpers: safe filenames, mime guessing, retention sweep.

use rstest::rstest;
use std::path::Path;

use creator_analytics_backend::services::media::{guess_mime, safe_filename, sweep_stale_uploads};

#[rstest]
#[case("clip final (1).mp4", "clip_final__1_.mp4")]
#[case("ok-name_2.webm", "ok-name_2.webm")]
#[case("weird name!@#.mov", "weird_name___.mov")]
#[case("", "download.mp4")]
fn filenames_keep_only_safe_characters(#[case] input: &str, #[case] expected: &str) {
    assert_eq!(safe_filename(input), expected);
}

#[test]
fn path_components_are_stripped() {
    assert_eq!(safe_filename("../../etc/passwd"), "passwd");
    assert_eq!(safe_filename("/abs/path/video.mp4"), "video.mp4");
}

#[rstest]
#[case("a.mp4", "video/mp4")]
#[case("a.mov", "video/quicktime")]
#[case("a.m4v", "video/x-m4v")]
#[case("a.webm", "video/webm")]
#[case("a.avi", "video/x-msvideo")]
#[case("a.mkv", "video/x-matroska")]
#[case("a.bin", "video/mp4")]
fn mime_is_guessed_from_extension(#[case] name: &str, #[case] expected: &str) {
    assert_eq!(guess_mime(Path::new(name)), expected);
}

#[test]
fn retention_sweep_keeps_fresh_files_and_tolerates_missing_roots() {
    let root = tempfile::tempdir().expect("temp upload root");
    let user_dir = root.path().join("user-1");
    std::fs::create_dir_all(&user_dir).expect("user dir");

    let fresh_file = user_dir.join("fresh_clip.mp4");
    std::fs::write(&fresh_file, b"fresh").expect("write fresh");

    sweep_stale_uploads(root.path().to_str().unwrap(), 24);
    assert!(fresh_file.exists());

    // A missing root is a no-op, not an error.
    sweep_stale_uploads("/nonexistent/spc/upload/root", 24);
}
