//! Path helpers shared by the declaration loader and the task engine

use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path: drop `.` segments and fold `..` into the
/// preceding segment. The filesystem is never consulted.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Fully-qualified task name: `workdir` relative to `root`, joined with
/// `name`, always `/`-separated. A task declared in `root` itself has the
/// bare name as fqn; one outside `root` starts with `..` segments.
pub fn task_fqn(root: &Path, workdir: &Path, name: &str) -> String {
    let mut segments = relative_segments(&normalize_path(root), &normalize_path(workdir));
    segments.push(name.to_string());
    segments.join("/")
}

fn relative_segments(root: &Path, workdir: &Path) -> Vec<String> {
    let root: Vec<Component> = root.components().collect();
    let workdir: Vec<Component> = workdir.components().collect();
    let shared = root
        .iter()
        .zip(&workdir)
        .take_while(|(a, b)| a == b)
        .count();

    let up = root[shared..]
        .iter()
        .filter(|c| matches!(c, Component::Normal(_)))
        .map(|_| "..".to_string());
    let down = workdir[shared..].iter().filter_map(|c| match c {
        Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
        Component::ParentDir => Some("..".to_string()),
        _ => None,
    });
    up.chain(down).collect()
}
