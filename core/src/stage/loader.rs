use std::fs;
use std::path::{Path, PathBuf};

use crate::error::LoadError;

use super::types::Stage;

/// Extension (without the leading dot) that marks a stage definition file.
pub const DEFAULT_STAGE_FILE_EXT: &str = "pbstage";

/// Loads stage definitions from files and directory trees.
#[derive(Debug, Clone)]
pub struct StageLoader {
    ext: String,
}

impl Default for StageLoader {
    fn default() -> Self {
        Self::new(DEFAULT_STAGE_FILE_EXT)
    }
}

impl StageLoader {
    pub fn new(ext: impl Into<String>) -> Self {
        let ext = ext.into();
        Self {
            ext: ext.trim_start_matches('.').to_string(),
        }
    }

    pub fn ext(&self) -> &str {
        &self.ext
    }

    /// Load a file into one stage, or a directory into one composite stage.
    ///
    /// Emits an error event naming the path before returning any failure.
    pub fn load_path(&self, path: &Path) -> Result<Stage, LoadError> {
        let result = self.load_path_inner(path);
        if let Err(err) = &result {
            tracing::error!(path = %path.display(), error = %err, "failed to process stage path");
        }
        result
    }

    fn load_path_inner(&self, path: &Path) -> Result<Stage, LoadError> {
        let meta = fs::metadata(path).map_err(|e| LoadError::io(path, e))?;
        if !meta.is_dir() {
            if !self.matches(path) {
                return Err(LoadError::NotAStageFile {
                    path: path.to_path_buf(),
                    ext: format!(".{}", self.ext),
                });
            }
            return self.load_file(path);
        }

        let files = discover_stage_files(path, &self.ext)?;
        let units = files
            .iter()
            .map(|f| self.load_file(f))
            .collect::<Result<Vec<_>, _>>()?;

        let mut composite = Stage::composite(Some(path.to_path_buf()));
        for unit in units {
            composite.merge_with(unit)?;
        }
        tracing::debug!(
            path = %path.display(),
            stages = composite.flatten().len(),
            "loaded stage directory"
        );
        Ok(composite)
    }

    /// Parse a single stage file. The id defaults to the file stem; relative
    /// query files are resolved against the file's directory.
    pub fn load_file(&self, path: &Path) -> Result<Stage, LoadError> {
        let raw = fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
        let mut stage: Stage = serde_json::from_str(&raw).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if stage.id.trim().is_empty() {
            stage.id = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
        }
        if stage.id.trim().is_empty() || stage.id.contains(char::is_whitespace) {
            return Err(LoadError::InvalidId {
                path: path.to_path_buf(),
                id: stage.id,
            });
        }

        if let Some(dir) = path.parent() {
            for file in &mut stage.payload.query_files {
                if file.is_relative() {
                    *file = dir.join(&*file);
                }
            }
        }
        stage.source = Some(path.to_path_buf());
        tracing::debug!(path = %path.display(), stage_id = %stage.id, "loaded stage file");
        Ok(stage)
    }

    fn matches(&self, path: &Path) -> bool {
        has_ext(path, &self.ext)
    }
}

fn has_ext(path: &Path, ext: &str) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy() == ext)
        .unwrap_or(false)
}

/// Walk `dir` depth-first and return every stage file in traversal order.
///
/// Entries of each directory are visited in file name order; a subdirectory is
/// expanded at its sorted position. Non-matching files are skipped.
pub fn discover_stage_files(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, LoadError> {
    let mut out = Vec::new();
    walk(dir, ext.trim_start_matches('.'), &mut out)?;
    Ok(out)
}

fn walk(dir: &Path, ext: &str, out: &mut Vec<PathBuf>) -> Result<(), LoadError> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| LoadError::io(dir, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| LoadError::io(dir, e))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| LoadError::io(&path, e))?;
        if file_type.is_dir() {
            walk(&path, ext, out)?;
        } else if has_ext(&path, ext) {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_single_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(tmp.path(), "a.pbstage", r#"{"queries": ["select 1"]}"#);

        let stage = StageLoader::default().load_path(&path).unwrap();
        assert_eq!(stage.id, "a");
        assert!(stage.is_leaf());
        assert_eq!(stage.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_wrong_extension_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(tmp.path(), "a.json", "{}");

        let err = StageLoader::default().load_path(&path).unwrap_err();
        assert!(matches!(err, LoadError::NotAStageFile { .. }));
    }

    #[test]
    fn test_missing_path_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = StageLoader::default()
            .load_path(&tmp.path().join("missing.pbstage"))
            .unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn test_directory_traversal_order() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "c.pbstage", r#"{"depends_on": ["b"]}"#);
        write(tmp.path(), "b.pbstage", "{}");
        write(tmp.path(), "notes.txt", "ignored");
        write(tmp.path(), "a_sub/z.pbstage", "{}");

        let files = discover_stage_files(tmp.path(), DEFAULT_STAGE_FILE_EXT).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["z.pbstage", "b.pbstage", "c.pbstage"]);

        let stage = StageLoader::default().load_path(tmp.path()).unwrap();
        assert_eq!(stage.leaf_ids(), vec!["z", "b", "c"]);
    }

    #[test]
    fn test_directory_aborts_on_first_bad_file() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.pbstage", "{}");
        write(tmp.path(), "b.pbstage", "{ not json");

        let err = StageLoader::default().load_path(tmp.path()).unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
    }

    #[test]
    fn test_query_files_resolved_relative_to_stage() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(tmp.path(), "q.pbstage", r#"{"query_files": ["sql/q1.sql"]}"#);

        let stage = StageLoader::default().load_file(&path).unwrap();
        assert_eq!(stage.payload.query_files, vec![tmp.path().join("sql/q1.sql")]);
    }

    #[test]
    fn test_custom_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(tmp.path(), "a.json", r#"{"id": "custom"}"#);
        let stage = StageLoader::new(".json").load_path(&path).unwrap();
        assert_eq!(stage.id, "custom");
    }
}
