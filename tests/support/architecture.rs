use std::fs;
use std::path::{Path, PathBuf};

/// A source line outside `#[cfg(test)]` modules.
#[derive(Debug)]
pub struct SourceLine {
    pub path: String,
    pub number: usize,
    pub text: String,
}

fn root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn rust_files(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = fs::read_dir(dir).unwrap_or_else(|e| panic!("failed to read {}: {e}", dir.display()));
    for entry in entries {
        let path = entry.unwrap_or_else(|e| panic!("failed to read dir entry: {e}")).path();
        if path.is_dir() {
            rust_files(&path, files);
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            files.push(path);
        }
    }
}

/// Non-test lines of every Rust file under `relative_dir` containing any
/// of `patterns`.
pub fn production_lines_containing(relative_dir: &str, patterns: &[&str]) -> Vec<SourceLine> {
    let mut files = Vec::new();
    rust_files(&root().join(relative_dir), &mut files);
    files.sort();

    let mut hits = Vec::new();
    for file in files {
        let content = fs::read_to_string(&file)
            .unwrap_or_else(|e| panic!("failed to read {}: {e}", file.display()));
        let relative = file
            .strip_prefix(root())
            .unwrap_or(&file)
            .to_string_lossy()
            .replace('\\', "/");

        for (idx, line) in content.lines().enumerate() {
            if line.trim() == "#[cfg(test)]" {
                break;
            }
            if patterns.iter().any(|p| line.contains(p)) {
                hits.push(SourceLine {
                    path: relative.clone(),
                    number: idx + 1,
                    text: line.to_string(),
                });
            }
        }
    }
    hits
}
