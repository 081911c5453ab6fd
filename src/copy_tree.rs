use std::fs;
use std::path::{Path, PathBuf};

const SKIP_NAMES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    ".venv",
    "venv",
    "__pycache__",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    ".ruff_cache",
    "target",
    "dist",
    "build",
    ".next",
    ".nuxt",
    crate::state::STATE_FILE,
];

const SKIP_SUFFIXES: &[&str] = &[".pyc", ".pyo"];

fn should_skip(name: &str) -> bool {
    SKIP_NAMES.iter().any(|s| *s == name) || SKIP_SUFFIXES.iter().any(|s| name.ends_with(s))
}

fn copy_dir_filtered(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if should_skip(&name.to_string_lossy()) {
            continue;
        }
        let src_path = entry.path();
        let dst_path = dst.join(&name);
        let ft = entry.file_type()?;
        if ft.is_dir() {
            copy_dir_filtered(&src_path, &dst_path)?;
        } else if ft.is_file() {
            fs::copy(&src_path, &dst_path)?;
        }
        // Symlinks and special files stay behind.
    }
    Ok(())
}

/// Walk up from `source_file` to the nearest directory holding a project marker.
pub fn find_project_root(source_file: &Path) -> PathBuf {
    let markers = &[
        "pyproject.toml",
        "setup.py",
        "setup.cfg",
        "package.json",
        "Cargo.toml",
        "go.mod",
        ".git",
    ];
    let mut dir = source_file.parent().unwrap_or(source_file);
    loop {
        for marker in markers {
            if dir.join(marker).exists() {
                return dir.to_path_buf();
            }
        }
        match dir.parent() {
            Some(parent) if parent != dir => dir = parent,
            _ => break,
        }
    }
    source_file.parent().unwrap_or(source_file).to_path_buf()
}

/// Project root that contains every one of `files`.
pub fn common_project_root(files: &[PathBuf]) -> Option<PathBuf> {
    let mut root = find_project_root(files.first()?);
    while !files.iter().all(|f| f.starts_with(&root)) {
        root = root.parent()?.to_path_buf();
    }
    Some(root)
}

/// Working tree a run binds mutants into. The user's checkout is never written.
pub struct Sandbox {
    root: PathBuf,
    _temp_dir: tempfile::TempDir,
}

impl Sandbox {
    /// Copy `project_root` into a fresh temporary directory.
    pub fn prepare(project_root: &Path, session_id: &str) -> std::io::Result<Sandbox> {
        let temp_dir = tempfile::Builder::new()
            .prefix(&format!("mutscope-{session_id}-"))
            .tempdir()?;
        copy_dir_filtered(project_root, temp_dir.path())?;
        tracing::debug!(from = %project_root.display(), to = %temp_dir.path().display(), "sandbox ready");
        Ok(Sandbox {
            root: temp_dir.path().to_path_buf(),
            _temp_dir: temp_dir,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn prepare_copies_files_and_skips_git() {
        let src_dir = TempDir::new().unwrap();
        let src = src_dir.path();
        fs::write(src.join("app.py"), "x = 1").unwrap();
        fs::write(src.join("test_app.py"), "assert True").unwrap();
        fs::create_dir(src.join(".git")).unwrap();
        fs::write(src.join(".git").join("HEAD"), "ref").unwrap();
        fs::create_dir(src.join("__pycache__")).unwrap();
        fs::write(src.join("__pycache__").join("app.cpython-311.pyc"), "bytes").unwrap();

        let sandbox = Sandbox::prepare(src, "t1").unwrap();

        assert!(sandbox.root().join("app.py").exists());
        assert!(sandbox.root().join("test_app.py").exists());
        assert!(!sandbox.root().join(".git").exists());
        assert!(!sandbox.root().join("__pycache__").exists());
    }

    #[test]
    fn prepare_preserves_nested_structure() {
        let src_dir = TempDir::new().unwrap();
        let src = src_dir.path();
        fs::create_dir_all(src.join("src").join("utils")).unwrap();
        fs::write(src.join("src").join("utils").join("math.py"), "def add(a,b): return a+b").unwrap();
        fs::write(src.join("pyproject.toml"), "[project]").unwrap();

        let sandbox = Sandbox::prepare(src, "t2").unwrap();
        let copied = sandbox.root().join("src").join("utils").join("math.py");
        assert_eq!(fs::read_to_string(copied).unwrap(), "def add(a,b): return a+b");
    }

    #[test]
    fn sandbox_is_removed_on_drop() {
        let src_dir = TempDir::new().unwrap();
        fs::write(src_dir.path().join("app.py"), "x = 1").unwrap();
        let sandbox = Sandbox::prepare(src_dir.path(), "t3").unwrap();
        let root = sandbox.root().to_path_buf();
        drop(sandbox);
        assert!(!root.exists());
    }

    #[test]
    fn find_project_root_finds_pyproject() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("pyproject.toml"), "").unwrap();
        fs::write(root.join("src").join("app.py"), "").unwrap();

        assert_eq!(find_project_root(&root.join("src").join("app.py")), root);
    }

    #[test]
    fn find_project_root_fallback_to_parent() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src").join("app.py"), "").unwrap();

        assert_eq!(find_project_root(&root.join("src").join("app.py")), root.join("src"));
    }

    #[test]
    fn common_project_root_widens_to_cover_all_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("pkg")).unwrap();
        fs::create_dir_all(root.join("tests")).unwrap();
        fs::write(root.join("pkg").join("pyproject.toml"), "").unwrap();

        let files = vec![root.join("pkg").join("app.py"), root.join("tests").join("test_app.py")];
        assert_eq!(common_project_root(&files).unwrap(), root);
    }

    #[test]
    fn should_skip_filters_correctly() {
        assert!(should_skip(".git"));
        assert!(should_skip("node_modules"));
        assert!(should_skip("target"));
        assert!(should_skip(".mutscope-state.json"));
        assert!(should_skip("app.pyc"));
        assert!(!should_skip("app.py"));
        assert!(!should_skip("Cargo.toml"));
    }
}
