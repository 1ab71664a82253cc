//! Best-effort relative-import verification for proposed Python files.
//! `from .X import …` must resolve to a sibling module or package.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

fn relative_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"from\s+\.(\w+)\s+import").expect("static pattern"))
}

/// Returns a description of the first missing module, or `None` when every
/// relative import resolves (or the file is not Python).
pub fn validate_relative_imports(
    code: &str,
    filename: &str,
    base_path: &Path,
) -> Option<String> {
    if !filename.ends_with(".py") {
        return None;
    }

    let file_dir = Path::new(filename).parent().unwrap_or_else(|| Path::new(""));

    let mut missing = Vec::new();
    for caps in relative_import_re().captures_iter(code) {
        let module = &caps[1];
        let as_file = base_path.join(file_dir).join(format!("{module}.py"));
        let as_package = base_path.join(file_dir).join(module).join("__init__.py");
        if !as_file.exists() && !as_package.exists() {
            missing.push(module.to_string());
        }
    }

    if missing.is_empty() {
        None
    } else {
        Some(format!(
            "{} (expected beside {})",
            missing.join(", "),
            file_dir.display()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_sibling_module() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("engine")).unwrap();
        std::fs::write(dir.path().join("engine/helpers.py"), "x = 1\n").unwrap();

        let code = "from .helpers import x\n";
        assert!(validate_relative_imports(code, "engine/core.py", dir.path()).is_none());
    }

    #[test]
    fn resolves_sibling_package() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("engine/sub")).unwrap();
        std::fs::write(dir.path().join("engine/sub/__init__.py"), "").unwrap();

        let code = "from .sub import thing\n";
        assert!(validate_relative_imports(code, "engine/core.py", dir.path()).is_none());
    }

    #[test]
    fn reports_import_to_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("engine")).unwrap();

        let code = "from .ghost import haunt\n";
        let missing = validate_relative_imports(code, "engine/core.py", dir.path()).unwrap();
        assert!(missing.contains("ghost"));
    }

    #[test]
    fn non_python_files_skip_the_check() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_relative_imports("from .x import y", "notes.md", dir.path()).is_none());
    }

    #[test]
    fn absolute_imports_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let code = "import os\nfrom json import loads\n";
        assert!(validate_relative_imports(code, "mod.py", dir.path()).is_none());
    }
}
