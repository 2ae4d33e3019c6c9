use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tracing::{debug, error};
use xs_core::{ScriptSource, TestData};
use xs_parser::{parse_properties_data, parse_test_data, DataFormat};
use xs_runtime::TestDataProvider;

pub const PACKAGE_DATA_NAME: &str = "package_testdata";
pub const GLOBAL_DATA_FILE: &str = "global_testdata.properties";

/// Test data read from files next to the scripts.
///
/// A script's frame is the package data of every directory from the scripts root
/// down to its own (deeper overrides shallower), overridden by `<Script>_data.*`.
/// Global data comes from `global_testdata.properties` one level above the root.
#[derive(Debug)]
pub struct FileTestDataProvider {
    scripts_dir: PathBuf,
    scripts: DashMap<String, Arc<TestData>>,
    global: OnceLock<Arc<TestData>>,
}

impl FileTestDataProvider {
    pub fn new(scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            scripts: DashMap::new(),
            global: OnceLock::new(),
        }
    }

    fn load_script_data(&self, source: &ScriptSource) -> TestData {
        let relative_dir = Path::new(&source.path)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mut data = TestData::new();
        let mut dir = self.scripts_dir.clone();
        data.extend(first_data_file(&dir, PACKAGE_DATA_NAME));
        for component in relative_dir.components() {
            dir.push(component);
            data.extend(first_data_file(&dir, PACKAGE_DATA_NAME));
        }

        let base_name = source.file_name().trim_end_matches(".xml");
        data.extend(first_data_file(&dir, &format!("{}_data", base_name)));
        debug!(script = %source.name, entries = data.len(), "Loaded test data");
        data
    }

    fn load_global_data(&self) -> TestData {
        let Some(path) = self
            .scripts_dir
            .parent()
            .map(|parent| parent.join(GLOBAL_DATA_FILE))
            .filter(|path| path.is_file())
        else {
            return TestData::new();
        };
        match fs::read_to_string(&path) {
            Ok(text) => parse_properties_data(&text),
            Err(read_error) => {
                error!(
                    "Failed to read global test data file '{}': {}",
                    path.display(),
                    read_error
                );
                TestData::new()
            }
        }
    }
}

/// Data of the first existing `<dir>/<base>.{xml,csv,properties}`; empty when none
/// exists or the file cannot be parsed.
fn first_data_file(dir: &Path, base: &str) -> TestData {
    let Some((format, path)) = DataFormat::LOOKUP_ORDER.iter().find_map(|format| {
        let path = dir.join(format!("{}.{}", base, format.extension()));
        path.is_file().then_some((*format, path))
    }) else {
        return TestData::new();
    };

    let parsed = fs::read_to_string(&path)
        .map_err(|read_error| read_error.to_string())
        .and_then(|text| parse_test_data(format, &text).map_err(|error| error.to_string()));
    match parsed {
        Ok(data) => data,
        Err(message) => {
            error!("Failed to load test data file '{}': {}", path.display(), message);
            TestData::new()
        }
    }
}

impl TestDataProvider for FileTestDataProvider {
    fn data_for(&self, source: &ScriptSource) -> Arc<TestData> {
        if let Some(data) = self.scripts.get(&source.name) {
            return Arc::clone(data.value());
        }
        let loaded = Arc::new(self.load_script_data(source));
        Arc::clone(
            self.scripts
                .entry(source.name.clone())
                .or_insert(loaded)
                .value(),
        )
    }

    fn global_data(&self) -> Arc<TestData> {
        Arc::clone(
            self.global
                .get_or_init(|| Arc::new(self.load_global_data())),
        )
    }
}
