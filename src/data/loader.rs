use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::clone::{Cloner, GitCloner};
use super::model::{TweetTable, REQUIRED_COLUMNS};
use super::npy::{self, NpyArray};
use super::registry::{self, Language};
use crate::config::LoaderConfig;
use crate::error::{DatasetError, Result};

// ---------------------------------------------------------------------------
// DatasetLoader
// ---------------------------------------------------------------------------

/// Fetches one named dataset from the hosting repository and loads it into a
/// [`TweetTable`].
///
/// Layout on disk: `<data_root>/<dataset>/` holds the cloned tree, the
/// `<dataset>.npy` file may sit at any depth inside it.
#[derive(Debug)]
pub struct DatasetLoader<C: Cloner = GitCloner> {
    dataset: Option<String>,
    data_root: PathBuf,
    repo_url: String,
    branch: String,
    cloner: C,
}

impl DatasetLoader<GitCloner> {
    /// Loader configured from the environment (see [`LoaderConfig::from_env`]).
    /// `dir_path` overrides the configured data root.
    pub fn new(dataset: Option<&str>, dir_path: Option<&Path>) -> Result<Self> {
        Self::with_config(dataset, dir_path, LoaderConfig::from_env()?)
    }

    /// Loader with an explicit configuration. The data root is created if
    /// absent; the dataset name is not checked against the registry here.
    pub fn with_config(
        dataset: Option<&str>,
        dir_path: Option<&Path>,
        config: LoaderConfig,
    ) -> Result<Self> {
        let data_root = dir_path
            .map(Path::to_path_buf)
            .unwrap_or(config.data_root);
        fs::create_dir_all(&data_root)?;
        debug!("Data root: {}", data_root.display());

        Ok(Self {
            dataset: dataset.map(str::to_string),
            data_root,
            repo_url: config.repo_url,
            branch: config.branch,
            cloner: GitCloner::default(),
        })
    }
}

impl<C: Cloner> DatasetLoader<C> {
    /// Swap the clone capability, keeping everything else.
    pub fn with_cloner<D: Cloner>(self, cloner: D) -> DatasetLoader<D> {
        DatasetLoader {
            dataset: self.dataset,
            data_root: self.data_root,
            repo_url: self.repo_url,
            branch: self.branch,
            cloner,
        }
    }

    /// The dataset name given at construction, unchanged.
    pub fn dataset_name(&self) -> Option<&str> {
        self.dataset.as_deref()
    }

    /// Language of the dataset according to the registry.
    pub fn dataset_language(&self) -> Result<Language> {
        registry::dataset_language(self.dataset.as_deref().unwrap_or("<unnamed>"))
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn repo_url(&self) -> &str {
        &self.repo_url
    }

    fn require_name(&self) -> Result<&str> {
        self.dataset
            .as_deref()
            .ok_or_else(|| DatasetError::transfer("no dataset name given"))
    }

    fn file_name(name: &str) -> String {
        format!("{name}.npy")
    }

    /// Directory the dataset is cloned into.
    pub fn local_path(&self) -> Result<PathBuf> {
        Ok(self.data_root.join(self.require_name()?))
    }

    /// Path of an already downloaded `<dataset>.npy`, if any.
    pub fn find_local(&self) -> Result<Option<PathBuf>> {
        let name = self.require_name()?;
        let dir = self.data_root.join(name);
        if !dir.is_dir() {
            return Ok(None);
        }
        find_file(&dir, &Self::file_name(name))
    }

    pub fn is_downloaded(&self) -> bool {
        matches!(self.find_local(), Ok(Some(_)))
    }

    /// Clone the dataset repository into the local dataset directory and
    /// return the path of `<dataset>.npy` inside it.
    ///
    /// Any previous content of the directory is replaced. On failure the
    /// directory is removed again before the error is returned.
    pub fn download(&self) -> Result<PathBuf> {
        let name = self.require_name()?;
        let target = self.data_root.join(name);
        if target.exists() {
            warn!("Removing stale dataset directory {}", target.display());
            fs::remove_dir_all(&target)?;
        }

        match self.clone_and_locate(name, &target) {
            Ok(path) => {
                info!("Dataset {name} available at {}", path.display());
                Ok(path)
            }
            Err(e) => {
                remove_partial(&target);
                Err(e)
            }
        }
    }

    fn clone_and_locate(&self, name: &str, target: &Path) -> Result<PathBuf> {
        self.cloner
            .clone_repo(&self.repo_url, &self.branch, target)
            .map_err(|e| match e {
                DatasetError::Transfer(_) => e,
                other => DatasetError::transfer(format!("cloning {}: {other}", self.repo_url)),
            })?;

        let file_name = Self::file_name(name);
        let found = if target.is_dir() {
            find_file(target, &file_name)?
        } else {
            None
        };
        found.ok_or_else(|| {
            DatasetError::transfer(format!(
                "{file_name} not found in {} after cloning {}",
                target.display(),
                self.repo_url
            ))
        })
    }

    /// Load the dataset, downloading it first when no local copy exists.
    pub fn load_data(&self) -> Result<TweetTable> {
        let path = match self.find_local()? {
            Some(path) => path,
            None => self.download()?,
        };
        info!("Loading {}", path.display());
        let array = npy::read_npy(&path)?;
        let table = table_from_array(array)?;
        info!("Loaded {} tweets", table.len());
        Ok(table)
    }
}

/// Best-effort removal of a partially written directory.
fn remove_partial(target: &Path) {
    if !target.exists() {
        return;
    }
    match fs::remove_dir_all(target) {
        Ok(()) => debug!("Removed partial download {}", target.display()),
        Err(e) => warn!("Failed to remove {}: {e}", target.display()),
    }
}

/// Depth-first search for a file called `file_name` below `dir`.
///
/// Entries are visited sorted by name and `.git` directories are skipped, so
/// when duplicates exist the first one in that order wins.
pub fn find_file(dir: &Path, file_name: &str) -> Result<Option<PathBuf>> {
    let mut entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if entry.file_name() == ".git" {
                continue;
            }
            if let Some(found) = find_file(&entry.path(), file_name)? {
                return Ok(Some(found));
            }
        } else if entry.file_name() == file_name {
            debug!("Found {}", entry.path().display());
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

/// Convert a decoded array into the fixed-schema table.
///
/// The array must be non-empty and 2-D with one column per entry of
/// [`REQUIRED_COLUMNS`].
pub fn table_from_array(array: NpyArray) -> Result<TweetTable> {
    if array.is_empty() {
        return Err(DatasetError::schema(format!(
            "array of shape {:?} is empty",
            array.shape
        )));
    }
    if array.ndim() != 2 {
        return Err(DatasetError::schema(format!(
            "expected a 2-D array, got shape {:?}",
            array.shape
        )));
    }
    if array.shape[1] != REQUIRED_COLUMNS.len() {
        return Err(DatasetError::schema(format!(
            "array has {} columns, expected {} ({})",
            array.shape[1],
            REQUIRED_COLUMNS.len(),
            REQUIRED_COLUMNS.join(", ")
        )));
    }
    TweetTable::from_rows(array.into_rows()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::CellValue;
    use crate::data::npy::tests::object_npy;
    use crate::data::pickle::tests::PickleWriter;
    use crate::data::pickle::OpCode;
    use std::cell::Cell;
    use tempfile::TempDir;

    /// Pretends to clone by writing `files` below the destination.
    struct FakeCloner {
        files: Vec<(PathBuf, Vec<u8>)>,
        fail: bool,
        calls: Cell<usize>,
    }

    impl FakeCloner {
        fn with_files(files: Vec<(PathBuf, Vec<u8>)>) -> Self {
            Self {
                files,
                fail: false,
                calls: Cell::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                files: vec![(PathBuf::from("partial/README"), b"half".to_vec())],
                fail: true,
                calls: Cell::new(0),
            }
        }
    }

    impl Cloner for FakeCloner {
        fn clone_repo(&self, _url: &str, _branch: &str, dest: &Path) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            for (rel, data) in &self.files {
                let path = dest.join(rel);
                fs::create_dir_all(path.parent().unwrap())?;
                fs::write(path, data)?;
            }
            if self.fail {
                return Err(DatasetError::transfer("Git clone failed"));
            }
            Ok(())
        }
    }

    fn row(i: usize) -> Vec<String> {
        REQUIRED_COLUMNS
            .iter()
            .map(|col| format!("{col}-{i}"))
            .collect()
    }

    fn npy_bytes(rows: &[Vec<String>]) -> Vec<u8> {
        let mut buf = Vec::new();
        npy::write_unicode(&mut buf, rows).unwrap();
        buf
    }

    fn loader(
        root: &TempDir,
        name: &str,
        cloner: FakeCloner,
    ) -> DatasetLoader<FakeCloner> {
        let config = LoaderConfig::default().with_data_root(root.path());
        DatasetLoader::with_config(Some(name), None, config)
            .unwrap()
            .with_cloner(cloner)
    }

    #[test]
    fn test_download_success() {
        let root = TempDir::new().unwrap();
        let cloner = FakeCloner::with_files(vec![(
            PathBuf::from("npy_data/test_dataset.npy"),
            npy_bytes(&[row(0)]),
        )]);
        let loader = loader(&root, "test_dataset", cloner);

        let path = loader.download().unwrap();
        assert!(path.ends_with("test_dataset.npy"));
        assert!(path.starts_with(root.path().join("test_dataset")));
        assert!(loader.is_downloaded());
    }

    #[test]
    fn test_download_failure_cleans_up() {
        let root = TempDir::new().unwrap();
        let loader = loader(&root, "test_dataset", FakeCloner::failing());

        let err = loader.download().unwrap_err();
        assert!(matches!(err, DatasetError::Transfer(_)));
        assert!(!root.path().join("test_dataset").exists());
    }

    #[test]
    fn test_download_missing_file_cleans_up() {
        let root = TempDir::new().unwrap();
        let cloner = FakeCloner::with_files(vec![(
            PathBuf::from("npy_data/other.npy"),
            npy_bytes(&[row(0)]),
        )]);
        let loader = loader(&root, "test_dataset", cloner);

        let err = loader.download().unwrap_err();
        assert!(matches!(err, DatasetError::Transfer(_)));
        assert!(err.to_string().contains("test_dataset.npy"));
        assert!(!root.path().join("test_dataset").exists());
    }

    #[test]
    fn test_download_replaces_stale_directory() {
        let root = TempDir::new().unwrap();
        let stale = root.path().join("MAVEN").join("leftover.txt");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "old").unwrap();

        let cloner =
            FakeCloner::with_files(vec![(PathBuf::from("MAVEN.npy"), npy_bytes(&[row(0)]))]);
        let loader = loader(&root, "MAVEN", cloner);
        loader.download().unwrap();
        assert!(!stale.exists());
    }

    #[test]
    fn test_download_without_name() {
        let root = TempDir::new().unwrap();
        let config = LoaderConfig::default().with_data_root(root.path());
        let loader = DatasetLoader::with_config(None, None, config).unwrap();
        assert!(matches!(loader.download(), Err(DatasetError::Transfer(_))));
        assert_eq!(loader.dataset_name(), None);
    }

    #[test]
    fn test_load_data_downloads_once() {
        let root = TempDir::new().unwrap();
        let rows: Vec<_> = (0..3).map(row).collect();
        let cloner = FakeCloner::with_files(vec![(
            PathBuf::from("npy_data/CrisisLexT26.npy"),
            npy_bytes(&rows),
        )]);
        let loader = loader(&root, "CrisisLexT26", cloner);

        let table = loader.load_data().unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.columns(), REQUIRED_COLUMNS);
        assert_eq!(
            table.get(2, "text"),
            Some(&CellValue::String("text-2".into()))
        );
        assert_eq!(
            table.get(1, "user_mentions"),
            Some(&CellValue::String("user_mentions-1".into()))
        );

        // Second load uses the local copy.
        loader.load_data().unwrap();
        assert_eq!(loader.cloner.calls.get(), 1);
    }

    /// One tweet row as numpy pickles an object array: an ndarray rebuilt via
    /// `_reconstruct`, `words` and `filtered_words` sharing one list object,
    /// and `created_at` as a `datetime`.
    fn object_row_npy() -> Vec<u8> {
        let pickle = PickleWriter::default()
            .proto(2)
            .global("numpy.core.multiarray", "_reconstruct")
            .global("numpy", "ndarray")
            .int1(0)
            .op(OpCode::Tuple1)
            .short_bytes(b"b")
            .op(OpCode::Tuple3)
            .op(OpCode::Reduce)
            .binput(0)
            .op(OpCode::Mark)
            .int1(1)
            .int1(1)
            .int1(11)
            .op(OpCode::Tuple2)
            .global("numpy", "dtype")
            .str("O8")
            .op(OpCode::NewFalse)
            .op(OpCode::NewTrue)
            .op(OpCode::Tuple3)
            .op(OpCode::Reduce)
            .op(OpCode::Mark)
            .int1(3)
            .str("|")
            .op(OpCode::None)
            .op(OpCode::None)
            .op(OpCode::None)
            .op(OpCode::Tuple)
            .op(OpCode::Build)
            .op(OpCode::NewFalse)
            .op(OpCode::Mark)
            // tweet_id, text, event_id
            .long1(255_000_000_000_000_001)
            .str("quake in Chile #quake")
            .int1(4)
            // words, then filtered_words as the same list
            .op(OpCode::EmptyList)
            .binput(1)
            .op(OpCode::Mark)
            .str("quake")
            .str("chile")
            .op(OpCode::Appends)
            .binget(1)
            // entities, user_id
            .op(OpCode::Mark)
            .str("Chile")
            .op(OpCode::List)
            .long1(12345)
            // created_at = datetime(2012, 10, 11, 8, 30, 5)
            .global("datetime", "datetime")
            .short_bytes(&[0x07, 0xdc, 10, 11, 8, 30, 5, 0, 0, 0])
            .op(OpCode::Tuple1)
            .op(OpCode::Reduce)
            // urls, hashtags, user_mentions
            .op(OpCode::EmptyList)
            .op(OpCode::EmptyList)
            .binput(2)
            .str("quake")
            .op(OpCode::Append)
            .op(OpCode::None)
            .op(OpCode::List)
            .op(OpCode::Tuple)
            .op(OpCode::Build)
            .finish();
        object_npy(vec![1, 11], pickle)
    }

    #[test]
    fn test_load_data_object_array() {
        let root = TempDir::new().unwrap();
        let cloner = FakeCloner::with_files(vec![(
            PathBuf::from("npy_data/Event2012_100.npy"),
            object_row_npy(),
        )]);
        let loader = loader(&root, "Event2012_100", cloner);

        let table = loader.load_data().unwrap();
        assert_eq!(table.len(), 1);
        let s = |v: &str| CellValue::String(v.into());
        let words = CellValue::List(vec![s("quake"), s("chile")]);
        assert_eq!(
            table.rows()[0],
            vec![
                CellValue::Integer(255_000_000_000_000_001),
                s("quake in Chile #quake"),
                CellValue::Integer(4),
                words.clone(),
                words,
                CellValue::List(vec![s("Chile")]),
                CellValue::Integer(12345),
                CellValue::Date("2012-10-11T08:30:05".into()),
                CellValue::List(vec![]),
                CellValue::List(vec![s("quake")]),
                CellValue::Null,
            ]
        );
    }

    #[test]
    fn test_load_data_uses_existing_file() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("KBP").join("nested").join("deeper");
        fs::create_dir_all(&dir).unwrap();
        npy::write_unicode_file(&dir.join("KBP.npy"), &[row(0), row(1)]).unwrap();

        let loader = loader(&root, "KBP", FakeCloner::failing());
        let table = loader.load_data().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(loader.cloner.calls.get(), 0);
    }

    #[test]
    fn test_load_data_wrong_column_count() {
        let root = TempDir::new().unwrap();
        let mut short = row(0);
        short.pop();
        let cloner =
            FakeCloner::with_files(vec![(PathBuf::from("HumAID.npy"), npy_bytes(&[short]))]);
        let loader = loader(&root, "HumAID", cloner);

        let err = loader.load_data().unwrap_err();
        assert!(matches!(err, DatasetError::Schema(_)));
        assert!(err.to_string().contains("10 columns"));
    }

    #[test]
    fn test_load_data_empty_array() {
        let root = TempDir::new().unwrap();
        let cloner = FakeCloner::with_files(vec![(PathBuf::from("KBP.npy"), npy_bytes(&[]))]);
        let loader = loader(&root, "KBP", cloner);
        assert!(matches!(loader.load_data(), Err(DatasetError::Schema(_))));
    }

    #[test]
    fn test_load_data_propagates_transfer_error() {
        let root = TempDir::new().unwrap();
        let loader = loader(&root, "MAVEN", FakeCloner::failing());
        assert!(matches!(loader.load_data(), Err(DatasetError::Transfer(_))));
        assert!(!root.path().join("MAVEN").exists());
    }

    #[test]
    fn test_name_and_language() {
        let root = TempDir::new().unwrap();
        let l = loader(&root, "test_dataset", FakeCloner::failing());
        assert_eq!(l.dataset_name(), Some("test_dataset"));
        assert!(matches!(l.dataset_language(), Err(DatasetError::Lookup { .. })));

        let l = loader(&root, "Event2018", FakeCloner::failing());
        assert_eq!(l.dataset_language().unwrap(), Language::French);
    }

    #[test]
    fn test_find_file_order_and_git_skip() {
        let root = TempDir::new().unwrap();
        for rel in [".git/x.npy", "b/x.npy", "a/deep/x.npy"] {
            let p = root.path().join(rel);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, "").unwrap();
        }
        let found = find_file(root.path(), "x.npy").unwrap().unwrap();
        assert_eq!(found, root.path().join("a/deep/x.npy"));
        assert_eq!(find_file(root.path(), "y.npy").unwrap(), None);
    }

    #[test]
    fn test_table_from_array_rejects_1d() {
        let arr = NpyArray {
            shape: vec![11],
            cells: vec![CellValue::Null; 11],
        };
        assert!(matches!(table_from_array(arr), Err(DatasetError::Schema(_))));
    }
}
