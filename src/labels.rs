//! Class names from exported model metadata.
//!
//! Ultralytics exports carry a `metadata.yaml` whose `names` key is either a
//! map keyed by class index or a plain list.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::YoloError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels {
    names: BTreeMap<usize, String>,
}

#[derive(Deserialize)]
struct Metadata {
    names: Names,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Names {
    Map(BTreeMap<usize, String>),
    List(Vec<String>),
}

impl Labels {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::<String>::into).enumerate().collect(),
        }
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, YoloError> {
        Self::parse(s, Path::new("<string>"))
    }

    pub fn load(path: &Path) -> Result<Self, YoloError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text, path)
    }

    fn parse(text: &str, path: &Path) -> Result<Self, YoloError> {
        let meta: Metadata = serde_yaml::from_str(text).map_err(|source| YoloError::YamlParse {
            path: path.to_path_buf(),
            source,
        })?;
        let names = match meta.names {
            Names::List(list) => list.into_iter().enumerate().collect(),
            Names::Map(map) => map,
        };
        Ok(Self { names })
    }

    pub fn get(&self, class_id: usize) -> Option<&str> {
        self.names.get(&class_id).map(String::as_str)
    }

    /// Number of named classes. Gaps in a sparse map are not counted.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
