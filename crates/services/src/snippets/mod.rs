use once_cell::sync::Lazy;
use regex::Regex;

/// A candidate snippet lifted from one source file. `SnippetStore::upsert`
/// is responsible for content-addressing it; this type only carries the
/// slice and its provenance.
#[derive(Debug, Clone)]
pub struct ExtractedSnippet {
    pub content: String,
    pub source_path: String,
}

/// Given a file's content, produce zero or more public-API-scoped slices
/// (spec §4.5). Implementations must be deterministic: identical bytes and
/// language always yield the identical snippet list.
pub trait SnippetExtractor: Send + Sync {
    fn extract(&self, path: &str, content: &str, language: &str) -> Vec<ExtractedSnippet>;
}

const BRACE_LANGUAGES: &[&str] = &["rust", "go", "c", "cpp", "java", "kotlin", "csharp", "javascript", "typescript", "php"];
const INDENT_LANGUAGES: &[&str] = &["python"];

static BRACE_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(pub\s+|export\s+|public\s+|private\s+|protected\s+|static\s+|async\s+)*(fn|func|struct|class|impl|interface|type|enum|struct)\s+\w").expect("valid regex")
});
static INDENT_DECL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\s*)(def|class)\s+\w").expect("valid regex"));

/// Line-oriented, per-language heuristic splitter: brace-matching for
/// C-family languages, indentation-matching for Python (SPEC_FULL §2
/// supplement — a documented simplification relative to a full tree-sitter
/// AST walk, since nothing downstream here needs a type-checked parse).
#[derive(Default)]
pub struct DefaultExtractor;

impl DefaultExtractor {
    pub fn new() -> Self {
        Self
    }

    fn extract_brace(&self, path: &str, content: &str) -> Vec<ExtractedSnippet> {
        let lines: Vec<&str> = content.lines().collect();
        let mut snippets = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            if BRACE_DECL.is_match(lines[i]) {
                let start = i;
                let mut depth = 0i32;
                let mut seen_open = false;
                let mut end = i;
                for (offset, line) in lines[i..].iter().enumerate() {
                    for ch in line.chars() {
                        match ch {
                            '{' => {
                                depth += 1;
                                seen_open = true;
                            }
                            '}' => depth -= 1,
                            _ => {}
                        }
                    }
                    end = i + offset;
                    if seen_open && depth <= 0 {
                        break;
                    }
                }
                let body = lines[start..=end.min(lines.len() - 1)].join("\n");
                snippets.push(ExtractedSnippet {
                    content: body,
                    source_path: path.to_string(),
                });
                i = end + 1;
            } else {
                i += 1;
            }
        }
        snippets
    }

    fn extract_indent(&self, path: &str, content: &str) -> Vec<ExtractedSnippet> {
        let lines: Vec<&str> = content.lines().collect();
        let mut snippets = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            if let Some(caps) = INDENT_DECL.captures(lines[i]) {
                let indent = caps.get(1).map(|m| m.as_str().len()).unwrap_or(0);
                let start = i;
                let mut end = i;
                for (offset, line) in lines[i + 1..].iter().enumerate() {
                    if line.trim().is_empty() {
                        end = i + 1 + offset;
                        continue;
                    }
                    let this_indent = line.len() - line.trim_start().len();
                    if this_indent <= indent {
                        break;
                    }
                    end = i + 1 + offset;
                }
                let body = lines[start..=end].join("\n");
                snippets.push(ExtractedSnippet {
                    content: body,
                    source_path: path.to_string(),
                });
                i = end + 1;
            } else {
                i += 1;
            }
        }
        snippets
    }
}

impl SnippetExtractor for DefaultExtractor {
    fn extract(&self, path: &str, content: &str, language: &str) -> Vec<ExtractedSnippet> {
        if BRACE_LANGUAGES.contains(&language) {
            self.extract_brace(path, content)
        } else if INDENT_LANGUAGES.contains(&language) {
            self.extract_indent(path, content)
        } else {
            // Non-source or unparseable files are skipped (spec §4.5).
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_rust_function_by_brace_matching() {
        let source = "use std::io;\n\npub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n\nfn helper() {\n    println!(\"hi\");\n}\n";
        let extractor = DefaultExtractor::new();
        let snippets = extractor.extract("src/lib.rs", source, "rust");
        assert_eq!(snippets.len(), 2);
        assert!(snippets[0].content.starts_with("pub fn add"));
        assert!(snippets[1].content.starts_with("fn helper"));
    }

    #[test]
    fn extracts_python_function_by_indentation() {
        let source = "import os\n\ndef greet(name):\n    print(name)\n    return None\n\nclass Foo:\n    def bar(self):\n        pass\n";
        let extractor = DefaultExtractor::new();
        let snippets = extractor.extract("a.py", source, "python");
        assert_eq!(snippets.len(), 2);
        assert!(snippets[0].content.starts_with("def greet"));
        assert!(snippets[1].content.starts_with("class Foo"));
    }

    #[test]
    fn deterministic_same_bytes_same_snippets() {
        let source = "fn a() {\n    1\n}\n";
        let extractor = DefaultExtractor::new();
        let first = extractor.extract("x.rs", source, "rust");
        let second = extractor.extract("x.rs", source, "rust");
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].content, second[0].content);
    }

    #[test]
    fn unknown_language_yields_no_snippets() {
        let extractor = DefaultExtractor::new();
        assert!(extractor.extract("a.bin", "whatever", "binary").is_empty());
    }
}
