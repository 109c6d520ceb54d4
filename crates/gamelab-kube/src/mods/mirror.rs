//! Lowercase mirror of the workshop content tree
//!
//! Arma 3 on Linux only loads lowercase mod paths, while workshop items ship
//! mixed case. The mirror is a tree of symlinks (`cp -as`) whose entries are
//! renamed to lowercase bottom-up, so a directory is renamed only after
//! everything inside it.

use crate::pods::shell_quote;

use super::{content_dir, mirror_dir};

/// Separates installer noise from the listing in the prepare script output
pub const LISTING_MARKER: &str = "--- gamelab mirror listing ---";

/// Recreate the symlink mirror and list its entries
pub fn prepare_script() -> String {
    let mirror = mirror_dir();
    let parent = mirror.rsplit_once('/').map_or(mirror.as_str(), |(parent, _)| parent);

    [
        "set -e".to_string(),
        "command -v rename >/dev/null 2>&1 || (apt-get update && apt-get install -y rename)"
            .to_string(),
        format!("mkdir -p {}", shell_quote(parent)),
        format!("rm -rf {}", shell_quote(&mirror)),
        format!("cp -as {} {}", shell_quote(&content_dir()), shell_quote(&mirror)),
        format!("echo {}", shell_quote(LISTING_MARKER)),
        format!("find {} -mindepth 1 -depth -print", shell_quote(&mirror)),
    ]
    .join("\n")
}

/// Paths printed after [`LISTING_MARKER`] that lie under `root`
pub fn parse_listing<'a>(output: &'a str, root: &str) -> Vec<&'a str> {
    let prefix = format!("{}/", root.trim_end_matches('/'));
    output
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .skip_while(|line| *line != LISTING_MARKER)
        .skip(1)
        .filter(|line| line.starts_with(&prefix))
        .collect()
}

/// Entries whose name must be lowercased, deepest paths first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorPlan {
    renames: Vec<String>,
}

impl MirrorPlan {
    /// Plan from a listing of paths under `root`. `root` itself is never
    /// renamed.
    pub fn from_listing<'a>(root: &str, paths: impl IntoIterator<Item = &'a str>) -> Self {
        let root = root.trim_end_matches('/');
        let mut entries: Vec<(usize, &str)> = paths
            .into_iter()
            .map(|path| path.trim_end_matches('/'))
            .filter(|path| {
                path.strip_prefix(root)
                    .is_some_and(|rest| rest.starts_with('/') && rest.len() > 1)
            })
            .filter(|path| file_name(path).bytes().any(|b| b.is_ascii_uppercase()))
            .map(|path| (path[root.len()..].matches('/').count(), path))
            .collect();

        entries.sort_by(|(depth_a, path_a), (depth_b, path_b)| {
            depth_b.cmp(depth_a).then_with(|| path_a.cmp(path_b))
        });
        entries.dedup_by(|a, b| a.1 == b.1);

        let renames = entries.into_iter().map(|(_, path)| path.to_string()).collect();

        Self { renames }
    }

    pub fn renames(&self) -> &[String] {
        &self.renames
    }

    pub fn len(&self) -> usize {
        self.renames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renames.is_empty()
    }

    /// Shell script performing the renames in order, `None` if there is
    /// nothing to rename
    pub fn script(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }

        let mut lines = vec!["set -e".to_string()];
        lines.extend(
            self.renames
                .iter()
                .map(|path| format!("rename -f -d 'y/A-Z/a-z/' -- {}", shell_quote(path))),
        );
        Some(lines.join("\n"))
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
