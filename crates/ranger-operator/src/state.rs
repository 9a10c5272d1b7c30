//! Persisted operator state: an opaque key-value store surviving across reconciliation passes.
use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::PathBuf,
};

use snafu::{ResultExt, Snafu};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read state file {path:?}"))]
    ReadStateFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse state file {path:?}"))]
    ParseStateFile {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[snafu(display("failed to serialize state"))]
    SerializeState { source: serde_yaml::Error },

    #[snafu(display("failed to write state file {path:?}"))]
    WriteStateFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// String keys mapping to string values, typically serialized YAML.
pub trait StateStore {
    fn get(&self, key: &str) -> Option<&str>;

    fn set(&mut self, key: &str, value: String);
}

impl StateStore for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        BTreeMap::get(self, key).map(String::as_str)
    }

    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_owned(), value);
    }
}

/// A [`StateStore`] backed by a YAML file. Changes are only written on [`FileStateStore::save`].
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FileStateStore {
    /// Loads the state from `path`. A missing file is an empty state.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => {
                serde_yaml::from_str(&contents).context(ParseStateFileSnafu { path: &path })?
            }
            Err(error) if error.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(error) => return Err(error).context(ReadStateFileSnafu { path }),
        };

        Ok(Self { path, values })
    }

    pub fn save(&self) -> Result<()> {
        let contents = serde_yaml::to_string(&self.values).context(SerializeStateSnafu)?;
        fs::write(&self.path, contents).context(WriteStateFileSnafu { path: &self.path })
    }
}

impl StateStore for FileStateStore {
    fn get(&self, key: &str) -> Option<&str> {
        StateStore::get(&self.values, key)
    }

    fn set(&mut self, key: &str, value: String) {
        self.values.set(key, value);
    }
}
