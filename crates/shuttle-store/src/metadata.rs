//! YAML-file-backed [`MetadataSource`] (C11 loader): reads `<tool>.yaml`
//! from a configured directory. An absent file is not an error; a
//! malformed one surfaces to the caller, per the metadata-file contract.

use std::path::PathBuf;

use shuttle_core::error::Error;
use shuttle_core::metadata::{MetadataSource, ToolMetadata};

pub struct YamlMetadataSource {
    dir: PathBuf,
}

impl YamlMetadataSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, tool_name: &str) -> PathBuf {
        self.dir.join(format!("{tool_name}.yaml"))
    }
}

impl MetadataSource for YamlMetadataSource {
    fn load(&self, tool_name: &str) -> Result<Option<ToolMetadata>, Error> {
        let path = self.path_for(tool_name);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(Error::Io)?;
        let metadata: ToolMetadata = serde_yml::from_str(&content)
            .map_err(|e| Error::Config(format!("malformed tool metadata for '{tool_name}': {e}")))?;
        Ok(Some(metadata))
    }
}
