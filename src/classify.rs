//! Closed-set file classification: which paths get indexed, which directories get skipped.
//!
//! No content sniffing. A path is either in one of these fixed sets or it isn't.

use std::path::Path;

const TEXT_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "jsx", "tsx", "java", "c", "cpp", "h", "hpp", "go", "rs", "rb", "php", "cs",
    "swift", "kt", "scala", "r", "html", "css", "scss", "sass", "less", "json", "yaml", "yml",
    "md", "txt", "xml", "sql", "sh", "bash", "zsh", "fish", "toml", "ini", "conf", "config",
    "env", "proto", "graphql", "vue", "svelte", "elm", "ex", "exs", "erl", "hrl", "clj", "lua",
    "pl", "pm", "raku", "vim", "el", "lisp", "scm", "gradle", "properties", "dockerfile",
    "makefile", "cmake",
];

const TEXT_FILENAMES: &[&str] = &[
    "makefile",
    "dockerfile",
    "rakefile",
    "gemfile",
    "procfile",
    "readme",
    "license",
    "changelog",
    "contributing",
    "authors",
];

const SKIP_DIRS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    ".bzr",
    "node_modules",
    "bower_components",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    "venv",
    ".venv",
    "env",
    ".env",
    "virtualenv",
    "target",
    "build",
    "dist",
    "out",
    ".idea",
    ".vscode",
    ".vs",
    "coverage",
    ".coverage",
    "htmlcov",
    ".next",
    ".nuxt",
    ".cache",
    "vendor",
];

/// True if `path` names a file this service should index — checked on extension first,
/// falling back to a fixed set of extensionless filenames (README, Makefile, ...).
pub fn is_indexable(path: &Path) -> bool {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        return TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str());
    }
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| TEXT_FILENAMES.contains(&n.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// True if a directory with this base name should be pruned from the walk entirely.
pub fn is_skipped_dir(name: &str) -> bool {
    SKIP_DIRS.contains(&name.to_ascii_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn recognizes_common_source_extensions() {
        for name in ["main.rs", "index.js", "app.py", "Widget.tsx", "style.css"] {
            assert!(is_indexable(&PathBuf::from(name)), "{name} should be indexable");
        }
    }

    #[test]
    fn recognizes_extensionless_conventional_filenames() {
        for name in ["README", "readme", "Makefile", "Dockerfile", "LICENSE"] {
            assert!(is_indexable(&PathBuf::from(name)), "{name} should be indexable");
        }
    }

    #[test]
    fn rejects_binary_and_unknown_extensions() {
        for name in ["photo.png", "archive.zip", "a.out", "data.bin"] {
            assert!(!is_indexable(&PathBuf::from(name)), "{name} should not be indexable");
        }
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        assert!(is_indexable(&PathBuf::from("Main.RS")));
        assert!(is_indexable(&PathBuf::from("NOTES.MD")));
    }

    #[test]
    fn skip_dirs_cover_common_vcs_and_build_output() {
        for d in [".git", "node_modules", "target", "__pycache__", "dist"] {
            assert!(is_skipped_dir(d), "{d} should be skipped");
        }
        assert!(!is_skipped_dir("src"));
        assert!(!is_skipped_dir("lib"));
    }
}
