//! Extension -> language label mapping used for file tagging and snippet
//! extraction (spec GLOSSARY: "Language mapping").

/// Detected language + MIME type for a file extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageInfo {
    pub language: String,
    pub mime_type: String,
}

/// Map a file extension (without leading dot, lowercase) to its detected
/// language and MIME type. Unknown extensions map to `text/plain` and a
/// language equal to the extension string itself.
pub fn detect_language(extension: &str) -> LanguageInfo {
    let ext = extension.to_ascii_lowercase();
    let (language, mime_type): (&str, &str) = match ext.as_str() {
        "go" => ("go", "text/x-go"),
        "py" | "pyi" => ("python", "text/x-python"),
        "ts" | "tsx" => ("typescript", "text/typescript"),
        "js" | "jsx" | "mjs" | "cjs" => ("javascript", "text/javascript"),
        "rs" => ("rust", "text/rust"),
        "c" | "h" => ("c", "text/x-c"),
        "cpp" | "cc" | "cxx" | "hpp" => ("cpp", "text/x-c++"),
        "java" => ("java", "text/x-java"),
        "kt" | "kts" => ("kotlin", "text/x-kotlin"),
        "rb" => ("ruby", "text/x-ruby"),
        "php" => ("php", "text/x-php"),
        "cs" => ("csharp", "text/x-csharp"),
        "sh" | "bash" => ("shell", "text/x-shellscript"),
        "sql" => ("sql", "text/x-sql"),
        "md" | "markdown" => ("markdown", "text/markdown"),
        "json" => ("json", "application/json"),
        "yaml" | "yml" => ("yaml", "text/yaml"),
        "toml" => ("toml", "text/x-toml"),
        "html" | "htm" => ("html", "text/html"),
        "css" => ("css", "text/css"),
        _ => {
            return LanguageInfo {
                language: ext.clone(),
                mime_type: "text/plain".to_string(),
            };
        }
    };
    LanguageInfo {
        language: language.to_string(),
        mime_type: mime_type.to_string(),
    }
}

/// Extract the lowercase extension (without leading dot) from a path, or the
/// empty string if the path has none.
pub fn extension_of(path: &str) -> String {
    std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions_map_correctly() {
        assert_eq!(detect_language("py").language, "python");
        assert_eq!(detect_language("TSX").language, "typescript");
        assert_eq!(detect_language("rs").mime_type, "text/rust");
    }

    #[test]
    fn unknown_extension_passes_through() {
        let info = detect_language("zig");
        assert_eq!(info.language, "zig");
        assert_eq!(info.mime_type, "text/plain");
    }

    #[test]
    fn extension_of_extracts_lowercase() {
        assert_eq!(extension_of("src/Main.RS"), "rs");
        assert_eq!(extension_of("README"), "");
    }
}
