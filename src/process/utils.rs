use std::borrow::Cow;

/// Drop `,` thousands separators, e.g. `"1,200"` → `"1200"`.
pub fn strip_thousands(raw: &str) -> Cow<'_, str> {
    if raw.contains(',') {
        Cow::Owned(raw.replace(',', ""))
    } else {
        Cow::Borrowed(raw)
    }
}

/// File name component of `path` for log fields, falling back to the full path.
pub fn display_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
