//! Input Discovery
//!
//! Walks the input folder (including category subfolders) and turns every
//! image found into a `WorkItem`. The batch is sorted so every strategy sees
//! the same items in the same order.

use filterbench_ipc::WorkItem;
use std::path::{Path, PathBuf};

/// Extensions picked up by default (compared case-insensitively)
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Recursively collect files under `root` whose extension matches one of
/// `extensions`, sorted by path.
pub fn discover_images<S: AsRef<str>>(
    root: &Path,
    extensions: &[S],
) -> std::io::Result<Vec<PathBuf>> {
    let wanted: Vec<String> = extensions
        .iter()
        .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
        .collect();

    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() && has_extension(&path, &wanted) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

fn has_extension(path: &Path, wanted: &[String]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| wanted.iter().any(|w| *w == ext))
}

/// One work item per discovered path, all writing under `output_dir`
pub fn build_batch(paths: &[PathBuf], output_dir: &Path) -> Vec<WorkItem> {
    paths
        .iter()
        .map(|path| WorkItem::new(path, output_dir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovers_nested_images_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let pies = dir.path().join("apple_pie");
        let nested = dir.path().join("sushi").join("extra");
        std::fs::create_dir_all(&pies).unwrap();
        std::fs::create_dir_all(&nested).unwrap();

        std::fs::write(pies.join("b.JPG"), b"").unwrap();
        std::fs::write(pies.join("a.png"), b"").unwrap();
        std::fs::write(nested.join("c.jpeg"), b"").unwrap();
        std::fs::write(pies.join("notes.txt"), b"").unwrap();
        std::fs::write(dir.path().join("README"), b"").unwrap();

        let found = discover_images(dir.path(), IMAGE_EXTENSIONS).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();

        assert_eq!(
            names,
            vec![
                PathBuf::from("apple_pie/a.png"),
                PathBuf::from("apple_pie/b.JPG"),
                PathBuf::from("sushi/extra/c.jpeg"),
            ]
        );
    }

    #[test]
    fn test_custom_extensions_accept_leading_dot() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.bmp"), b"").unwrap();
        std::fs::write(dir.path().join("y.png"), b"").unwrap();

        let found = discover_images(dir.path(), &[".bmp"]).unwrap();
        assert_eq!(found, vec![dir.path().join("x.bmp")]);
    }

    #[test]
    fn test_missing_root_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_images(&dir.path().join("nope"), IMAGE_EXTENSIONS).is_err());
    }

    #[test]
    fn test_build_batch_shares_output_dir() {
        let paths = vec![PathBuf::from("in/a.png"), PathBuf::from("in/b.png")];
        let batch = build_batch(&paths, Path::new("out"));
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|item| item.output_dir == "out"));
        assert_eq!(batch[1].source, "in/b.png");
    }
}
