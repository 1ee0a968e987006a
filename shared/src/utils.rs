use std::path::Path;

pub const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "json", "csv", "toml", "yaml", "yml", "html", "rs", "js", "ts", "py",
];

pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

pub fn is_supported_file(path: &Path) -> bool {
    let ext = extension_of(path);
    TEXT_EXTENSIONS.contains(&ext.as_str()) || matches!(ext.as_str(), "pdf" | "docx")
}

/// Single-line preview of `text`, cut at `max_chars` characters.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}
