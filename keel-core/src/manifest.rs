//! Manifest loading.
//!
//! Every file is parsed with serde_yaml, so JSON documents load too (YAML is a
//! superset). Load errors carry the offending path.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{io_err, ManifestError};
use crate::types::{Inputs, RenderRequest, TemplateValue};

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

fn read_manifest(path: &Path) -> Result<String, ManifestError> {
    if !path.exists() {
        return Err(ManifestError::NotFound {
            path: path.to_path_buf(),
        });
    }
    std::fs::read_to_string(path).map_err(|e| io_err(path, e))
}

fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ManifestError> {
    let contents = read_manifest(path)?;
    serde_yaml::from_str(&contents).map_err(|source| ManifestError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a [`RenderRequest`] (component type, component, workload, …) from disk.
///
/// Returns `ManifestError::NotFound` if absent,
/// `ManifestError::Parse` (with path + line context) if malformed.
pub fn load_render_request(path: &Path) -> Result<RenderRequest, ManifestError> {
    load_yaml(path)
}

/// Load a raw template document.
pub fn load_template(path: &Path) -> Result<TemplateValue, ManifestError> {
    load_yaml(path)
}

/// Load evaluation inputs. The document must be a mapping; an empty file
/// yields empty inputs.
pub fn load_inputs(path: &Path) -> Result<Inputs, ManifestError> {
    let contents = read_manifest(path)?;
    if contents.trim().is_empty() {
        return Ok(Inputs::new());
    }
    let doc: TemplateValue =
        serde_yaml::from_str(&contents).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    match doc {
        TemplateValue::Object(map) => Ok(map),
        TemplateValue::Null => Ok(Inputs::new()),
        _ => Err(ManifestError::NotAMapping {
            path: path.to_path_buf(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Save
// ---------------------------------------------------------------------------

/// Serialize any manifest value to a YAML string.
pub fn to_yaml_string<T: serde::Serialize>(value: &T) -> Result<String, ManifestError> {
    Ok(serde_yaml::to_string(value)?)
}
