//! File-backed persistence for [`PerProject`] accumulators.
//!
//! An accumulator is stored as a single document mapping `group:name` to an
//! array of items, in TOML or JSON. Writes go through a temp file and a rename
//! so a reader never sees a half-written document.
//!
//! The load-merge-save pass in [`PerProjectFile::merge`] does not lock the
//! file. Two concurrent passes against the same path can lose one side's items.

use std::fs;
use std::hash::Hash;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{AccrualError, FailOpen, Result};
use crate::key::GroupAndName;
use crate::per_project::PerProject;

/// Maximum store file size that will be read into memory (10 MB).
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// On-disk encoding of a store file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Toml,
    Json,
}

impl FileFormat {
    /// Pick a format from the file extension. Anything other than `.json` is TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }

    /// Parse `toml` or `json`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    fn encode<T: Serialize>(self, value: &T) -> Result<String> {
        match self {
            Self::Toml => Ok(toml::to_string_pretty(value)?),
            Self::Json => {
                let mut json = serde_json::to_string_pretty(value)?;
                json.push('\n');
                Ok(json)
            }
        }
    }

    fn decode<T: DeserializeOwned>(self, content: &str) -> Result<T> {
        match self {
            Self::Toml => Ok(toml::from_str(content)?),
            Self::Json => Ok(serde_json::from_str(content)?),
        }
    }
}

/// A [`PerProject`] accumulator persisted at a fixed path.
#[derive(Debug, Clone)]
pub struct PerProjectFile {
    path: PathBuf,
    format: FileFormat,
    max_file_size: u64,
}

impl PerProjectFile {
    /// Create a store for `path`, inferring the format from its extension.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = FileFormat::from_path(&path);
        Self {
            path,
            format,
            max_file_size: MAX_FILE_SIZE,
        }
    }

    /// Force a format regardless of extension.
    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = format;
        self
    }

    /// Override the maximum file size accepted by `load`.
    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// Get the path for a temp file used during atomic writes.
    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.path.with_file_name(format!(".{}.tmp", file_name))
    }

    fn read_limited(&self) -> Result<String> {
        let metadata = fs::metadata(&self.path).map_err(|e| AccrualError::storage(&self.path, e))?;

        let size = metadata.len();
        if size > self.max_file_size {
            return Err(AccrualError::storage(
                &self.path,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!(
                        "file is too large ({} bytes, max {} bytes)",
                        size, self.max_file_size
                    ),
                ),
            ));
        }

        fs::read_to_string(&self.path).map_err(|e| AccrualError::storage(&self.path, e))
    }

    /// Load the accumulator. A missing or blank file is the empty accumulator.
    pub fn load<T>(&self) -> Result<PerProject<T>>
    where
        T: DeserializeOwned + Eq + Hash,
    {
        if !self.path.exists() {
            tracing::debug!("{} does not exist, starting empty", self.path.display());
            return Ok(PerProject::empty());
        }

        let content = self.read_limited()?;
        if content.trim().is_empty() {
            return Ok(PerProject::empty());
        }

        self.format.decode(&content)
    }

    /// Load the accumulator, falling back to empty on any error.
    pub fn load_or_empty<T>(&self) -> PerProject<T>
    where
        T: DeserializeOwned + Eq + Hash,
    {
        self.load()
            .fail_open_default(&format!("loading {}", self.path.display()))
    }

    /// Write the accumulator atomically, creating parent directories.
    pub fn save<T: Serialize + Ord>(&self, accumulator: &PerProject<T>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| AccrualError::storage(parent, e))?;
            }
        }

        let content = self.format.encode(accumulator)?;
        let temp_path = self.temp_path();

        // Write to temp file
        {
            let mut file =
                fs::File::create(&temp_path).map_err(|e| AccrualError::storage(&temp_path, e))?;
            file.write_all(content.as_bytes())
                .map_err(|e| AccrualError::storage(&temp_path, e))?;
            file.sync_all()
                .map_err(|e| AccrualError::storage(&temp_path, e))?;
        }

        // Rename temp file to final path (atomic on POSIX)
        fs::rename(&temp_path, &self.path).map_err(|e| AccrualError::storage(&self.path, e))?;

        tracing::debug!(
            "saved {} project(s) to {}",
            accumulator.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Run one configuration pass: load, merge `items` into `key`, save.
    ///
    /// Returns the accumulator that was written.
    pub fn merge<T, I>(&self, key: &GroupAndName, items: I) -> Result<PerProject<T>>
    where
        T: Serialize + DeserializeOwned + Eq + Hash + Ord + Clone,
        I: IntoIterator<Item = T>,
    {
        let current: PerProject<T> = self.load()?;
        let merged = current.merge(key, items);

        if merged == current && self.path.exists() {
            tracing::trace!("nothing new for {}, leaving {} untouched", key, self.path.display());
            return Ok(merged);
        }

        self.save(&merged)?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaks::{AcceptedBreak, AcceptedBreaks};
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn lib() -> GroupAndName {
        GroupAndName::new("com.acme", "lib").unwrap()
    }

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(FileFormat::from_path(Path::new("a/b.json")), FileFormat::Json);
        assert_eq!(FileFormat::from_path(Path::new("a/b.JSON")), FileFormat::Json);
        assert_eq!(FileFormat::from_path(Path::new("a/b.toml")), FileFormat::Toml);
        assert_eq!(FileFormat::from_path(Path::new("a/b")), FileFormat::Toml);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(FileFormat::parse("toml"), Some(FileFormat::Toml));
        assert_eq!(FileFormat::parse("json"), Some(FileFormat::Json));
        assert_eq!(FileFormat::parse("yaml"), None);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = PerProjectFile::new(dir.path().join("missing.toml"));

        let acc: PerProject<String> = store.load().unwrap();
        assert!(acc.is_empty());
    }

    #[test]
    fn test_load_blank_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blank.json");
        fs::write(&path, "\n  \n").unwrap();

        let acc: PerProject<String> = PerProjectFile::new(&path).load().unwrap();
        assert!(acc.is_empty());
    }

    #[test]
    fn test_toml_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = PerProjectFile::new(dir.path().join("items.toml"));

        let acc = PerProject::empty().merge(&lib(), set(&["X1", "X2"]));
        store.save(&acc).unwrap();

        let loaded: PerProject<String> = store.load().unwrap();
        assert_eq!(loaded, acc);
    }

    #[test]
    fn test_json_save_and_load_breaks() {
        let dir = TempDir::new().unwrap();
        let store = PerProjectFile::new(dir.path().join("breaks.json"));

        let br = AcceptedBreak::new("java.method.removed", "internal")
            .unwrap()
            .with_old("method void Foo::bar()");
        let acc = AcceptedBreaks::empty().merge(&lib(), vec![br]);
        store.save(&acc).unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        assert!(content.contains("\"com.acme:lib\""));
        assert!(content.contains("java.method.removed"));

        let loaded: AcceptedBreaks = store.load().unwrap();
        assert_eq!(loaded, acc);
    }

    #[test]
    fn test_toml_breaks_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = PerProjectFile::new(dir.path().join("breaks.toml"));

        let acc = AcceptedBreaks::empty().merge(
            &lib(),
            vec![
                AcceptedBreak::new("java.class.removed", "unused").unwrap(),
                AcceptedBreak::new("java.method.added", "new API")
                    .unwrap()
                    .with_new("method void Foo::qux()"),
            ],
        );
        store.save(&acc).unwrap();

        let loaded: AcceptedBreaks = store.load().unwrap();
        assert_eq!(loaded, acc);
    }

    #[test]
    fn test_with_format_overrides_extension() {
        let dir = TempDir::new().unwrap();
        let store = PerProjectFile::new(dir.path().join("items.txt")).with_format(FileFormat::Json);
        assert_eq!(store.format(), FileFormat::Json);

        store
            .save(&PerProject::empty().merge(&lib(), set(&["X1"])))
            .unwrap();
        let content = fs::read_to_string(store.path()).unwrap();
        assert!(content.trim_start().starts_with('{'));
    }

    #[test]
    fn test_load_malformed_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let result: Result<PerProject<String>> = PerProjectFile::new(&path).load();
        assert!(matches!(result, Err(AccrualError::Serde { .. })));
    }

    #[test]
    fn test_load_bad_key_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad-key.json");
        fs::write(&path, r#"{"nocolon": ["X1"]}"#).unwrap();

        let result: Result<PerProject<String>> = PerProjectFile::new(&path).load();
        assert!(result.is_err());
    }

    #[test]
    fn test_toml_encoding_is_stable() {
        let items: Vec<String> = (0..20).map(|i| format!("X{}", i)).collect();
        let first = PerProject::empty().merge(&lib(), items.clone());
        let second = PerProject::empty()
            .merge(&lib(), items[10..].to_vec())
            .merge(&lib(), items[..10].to_vec());
        assert_eq!(first, second);

        let first_toml = FileFormat::Toml.encode(&first).unwrap();
        let second_toml = FileFormat::Toml.encode(&second).unwrap();
        assert_eq!(first_toml, second_toml);
    }

    #[test]
    fn test_load_rejects_invalid_break() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("breaks.json");
        fs::write(
            &path,
            r#"{"com.acme:lib":[{"code":"","justification":""}]}"#,
        )
        .unwrap();

        let result: Result<AcceptedBreaks> = PerProjectFile::new(&path).load();
        assert!(matches!(result, Err(AccrualError::Serde { .. })));
    }

    #[test]
    fn test_load_or_empty_fails_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "this is not valid toml [[[").unwrap();

        let acc: PerProject<String> = PerProjectFile::new(&path).load_or_empty();
        assert!(acc.is_empty());
    }

    #[test]
    fn test_load_rejects_oversized_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.json");
        fs::write(&path, format!("{{\"g:n\": [\"{}\"]}}", "x".repeat(200))).unwrap();

        let store = PerProjectFile::new(&path).with_max_file_size(100);
        let result: Result<PerProject<String>> = store.load();
        let err = result.unwrap_err().to_string();
        assert!(err.contains("too large"));
    }

    #[test]
    fn test_save_creates_parent_dirs_and_cleans_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(".accrual").join("items.toml");
        let store = PerProjectFile::new(&path);

        store
            .save(&PerProject::empty().merge(&lib(), set(&["X1"])))
            .unwrap();

        assert!(path.exists());
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_merge_accumulates_across_passes() {
        let dir = TempDir::new().unwrap();
        let store = PerProjectFile::new(dir.path().join("items.toml"));

        store.merge(&lib(), set(&["X1", "X2"])).unwrap();
        let after: PerProject<String> = store.merge(&lib(), set(&["X2", "X3"])).unwrap();
        assert_eq!(after.for_key(&lib()).into_owned(), set(&["X1", "X2", "X3"]));

        let reloaded: PerProject<String> = store.load().unwrap();
        assert_eq!(reloaded, after);
    }

    #[test]
    fn test_merge_keeps_other_projects() {
        let dir = TempDir::new().unwrap();
        let store = PerProjectFile::new(dir.path().join("items.json"));
        let other = GroupAndName::new("com.acme", "other").unwrap();

        store.merge(&lib(), set(&["X1"])).unwrap();
        store.merge(&other, set(&["Y1"])).unwrap();

        let reloaded: PerProject<String> = store.load().unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.for_key(&lib()).into_owned(), set(&["X1"]));
    }

    #[test]
    fn test_merge_with_nothing_new_writes_once() {
        let dir = TempDir::new().unwrap();
        let store = PerProjectFile::new(dir.path().join("items.toml"));

        let acc: PerProject<String> = store.merge(&lib(), HashSet::new()).unwrap();
        assert!(acc.is_empty());
        // First pass writes an empty document so the file exists
        assert!(store.path().exists());
    }
}
