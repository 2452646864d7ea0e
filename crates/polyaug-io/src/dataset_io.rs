//! Dataset JSON load and save.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use polyaug_pipeline::Dataset;

use crate::error::IoError;

/// Load a dataset from a JSON file.
///
/// # Errors
///
/// Returns [`IoError::DatasetFile`] if the file cannot be opened and
/// [`IoError::DatasetJson`] if it is not a valid dataset document.
pub fn load_dataset(path: &Path) -> Result<Dataset, IoError> {
    let file = File::open(path).map_err(|source| IoError::DatasetFile {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| IoError::DatasetJson {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a dataset as pretty-printed JSON, replacing any existing file.
///
/// # Errors
///
/// Returns [`IoError::DatasetFile`] on I/O failure and
/// [`IoError::DatasetJson`] if serialization fails.
pub fn save_dataset(path: &Path, dataset: &Dataset) -> Result<(), IoError> {
    let file_error = |source| IoError::DatasetFile {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(file_error)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, dataset).map_err(|source| {
        IoError::DatasetJson {
            path: path.to_path_buf(),
            source,
        }
    })?;
    writer.write_all(b"\n").map_err(file_error)?;
    writer.flush().map_err(file_error)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use polyaug_pipeline::{Annotation, Category, Image};

    use super::*;

    #[test]
    fn saved_dataset_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.json");
        let dataset = Dataset {
            images: vec![Image {
                id: "img-1".to_owned(),
                path: "img-1.jpg".to_owned(),
                intermediate_ids: vec![],
                width: 640,
                height: 480,
                size_kb: 52,
                group: "train".to_owned(),
                annotations: vec![Annotation {
                    id: "ann-1".to_owned(),
                    category_id: 7,
                    center: None,
                    bbox: None,
                    segmentation: Some(vec![0.1, 0.1, 0.4, 0.1, 0.4, 0.3]),
                    task: "segment".to_owned(),
                    conf: -1.0,
                    category_name: "leaf".to_owned(),
                    tags: vec!["reviewed".to_owned()],
                }],
            }],
            categories: vec![Category {
                id: 7,
                name: "leaf".to_owned(),
            }],
            groups: vec!["train".to_owned()],
        };
        save_dataset(&path, &dataset).unwrap();
        assert_eq!(load_dataset(&path).unwrap(), dataset);
    }

    #[test]
    fn missing_file_is_a_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_dataset(&dir.path().join("nope.json"));
        assert!(matches!(result, Err(IoError::DatasetFile { .. })));
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{\"images\": 3}").unwrap();
        assert!(matches!(load_dataset(&path), Err(IoError::DatasetJson { .. })));
    }
}
