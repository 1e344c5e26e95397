/// The analyzer is single-language; this just filters the walker to
/// Python source files.
pub fn is_source_ext(path: &std::path::Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("py") | Some("pyi")
    )
}
