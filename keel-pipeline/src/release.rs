//! Release assembly and the hash-gated atomic release writer.
//!
//! ## `write_release` — protocol
//!
//! 1. Serialize the release to YAML.
//! 2. SHA-256 hash the serialized content.
//! 3. Hash the existing file, if any → skip if identical.
//! 4. Write to `<path>.keel.tmp`.
//! 5. Rename to final path (atomic on POSIX).

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use keel_core::{manifest, Release, ReleaseResource, RenderRequest, TemplateValue};
use keel_renderer::functions::{generate_name_with_limit, MAX_LABEL_LENGTH};

use crate::error::{io_err, PipelineError};
use crate::pipeline::RenderOutput;

// ---------------------------------------------------------------------------
// Resource IDs
// ---------------------------------------------------------------------------

/// `{lowercase kind}-{name}`, or `resource-{index}` when either is missing.
/// IDs longer than a DNS label are shortened through name generation.
pub fn resource_id(resource: &TemplateValue, index: usize) -> String {
    let kind = resource.get("kind").and_then(TemplateValue::as_str).unwrap_or("");
    let name = resource
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(TemplateValue::as_str)
        .unwrap_or("");

    if kind.is_empty() || name.is_empty() {
        return format!("resource-{index}");
    }
    let kind = kind.to_lowercase();
    let id = format!("{kind}-{name}");
    if id.len() > MAX_LABEL_LENGTH {
        generate_name_with_limit(&[kind.as_str(), name], MAX_LABEL_LENGTH)
    } else {
        id
    }
}

/// Wrap rendered resources into a [`Release`] for the request's environment.
pub fn build_release(request: &RenderRequest, output: &RenderOutput) -> Release {
    let resources = output
        .resources
        .iter()
        .enumerate()
        .map(|(i, object)| ReleaseResource {
            id: resource_id(object, i),
            object: object.clone(),
        })
        .collect();
    Release {
        name: request.metadata.name.clone(),
        namespace: request.metadata.namespace.clone(),
        environment: request.environment.clone(),
        resources,
    }
}

// ---------------------------------------------------------------------------
// Write result
// ---------------------------------------------------------------------------

/// Outcome of writing a release file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// File was written (content changed or did not previously exist).
    Written { path: PathBuf },
    /// File was skipped: content on disk already matches.
    Unchanged { path: PathBuf },
    /// `--dry-run` mode: the file *would* have been written.
    WouldWrite { path: PathBuf },
}

impl WriteResult {
    pub fn path(&self) -> &Path {
        match self {
            WriteResult::Written { path }
            | WriteResult::Unchanged { path }
            | WriteResult::WouldWrite { path } => path,
        }
    }
}

// ---------------------------------------------------------------------------
// write_release
// ---------------------------------------------------------------------------

/// Serialize `release` as YAML and write it atomically to `path`.
pub fn write_release(
    path: &Path,
    release: &Release,
    dry_run: bool,
) -> Result<WriteResult, PipelineError> {
    let content = manifest::to_yaml_string(release)?;
    atomic_write(path, &content, dry_run)
}

/// Write `content` to `path` through a temporary file, unless the file
/// already holds exactly this content.
pub fn atomic_write(path: &Path, content: &str, dry_run: bool) -> Result<WriteResult, PipelineError> {
    let tmp = PathBuf::from(format!("{}.keel.tmp", path.display()));
    atomic_write_with_tmp(path, content, dry_run, &tmp)
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn atomic_write_with_tmp(
    path: &Path,
    content: &str,
    dry_run: bool,
    tmp: &Path,
) -> Result<WriteResult, PipelineError> {
    let digest = sha256_hex(content.as_bytes());

    if path.exists() {
        let existing = std::fs::read(path).map_err(|e| io_err(path, e))?;
        if sha256_hex(&existing) == digest {
            tracing::debug!("unchanged: {}", path.display());
            return Ok(WriteResult::Unchanged {
                path: path.to_path_buf(),
            });
        }
    }

    if dry_run {
        tracing::info!("[dry-run] would write: {}", path.display());
        return Ok(WriteResult::WouldWrite {
            path: path.to_path_buf(),
        });
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    if let Some(tmp_parent) = tmp.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(tmp_parent).map_err(|e| io_err(tmp_parent, e))?;
    }
    std::fs::write(tmp, content).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::info!("wrote: {}", path.display());
    Ok(WriteResult::Written {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::fs;

    use rstest::rstest;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[rstest]
    #[case(json!({"kind": "Deployment", "metadata": {"name": "api"}}), 0, "deployment-api")]
    #[case(json!({"kind": "HorizontalPodAutoscaler", "metadata": {"name": "api"}}), 2, "horizontalpodautoscaler-api")]
    #[case(json!({"kind": "Service"}), 3, "resource-3")]
    #[case(json!({"metadata": {"name": "x"}}), 0, "resource-0")]
    #[case(json!({"kind": "", "metadata": {"name": "x"}}), 1, "resource-1")]
    #[case(json!("not-an-object"), 4, "resource-4")]
    fn id_is_kind_and_name_or_index(
        #[case] resource: TemplateValue,
        #[case] index: usize,
        #[case] expected: &str,
    ) {
        assert_eq!(resource_id(&resource, index), expected);
    }

    #[test]
    fn long_ids_are_shortened() {
        let name = "n".repeat(70);
        let r = json!({"kind": "ConfigMap", "metadata": {"name": name.clone()}});
        let id = resource_id(&r, 0);
        assert!(id.len() <= MAX_LABEL_LENGTH, "{id}");
        assert!(id.starts_with("configmap-nnn"));
        assert_eq!(id, generate_name_with_limit(&["configmap", name.as_str()], MAX_LABEL_LENGTH));
    }

    #[test]
    fn first_write_returns_written() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("release.yaml");
        let result = atomic_write(&path, "hello", false).expect("write");
        assert!(matches!(result, WriteResult::Written { .. }));
        assert_eq!(fs::read_to_string(&path).expect("read"), "hello");
    }

    #[test]
    fn same_content_returns_unchanged() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("release.yaml");
        atomic_write(&path, "same", false).expect("first");
        let result = atomic_write(&path, "same", false).expect("second");
        assert!(matches!(result, WriteResult::Unchanged { .. }));
    }

    #[test]
    fn changed_content_returns_written() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("release.yaml");
        atomic_write(&path, "v1", false).expect("first");
        let result = atomic_write(&path, "v2", false).expect("second");
        assert!(matches!(result, WriteResult::Written { .. }));
    }

    #[test]
    fn dry_run_does_not_write_file() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("nope.yaml");
        let result = atomic_write(&path, "content", true).expect("dry run");
        assert!(matches!(result, WriteResult::WouldWrite { .. }));
        assert!(!path.exists(), "dry-run must not create files");
    }

    #[test]
    fn tmp_file_removed_and_parents_created() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("releases").join("dev").join("api.yaml");
        atomic_write(&path, "data", false).expect("write");
        assert!(path.exists());
        let tmp_path = PathBuf::from(format!("{}.keel.tmp", path.display()));
        assert!(!tmp_path.exists(), ".keel.tmp must be cleaned up");
    }

    #[test]
    #[cfg(unix)]
    fn rename_failure_leaves_original_and_cleans_tmp() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().expect("root");
        let readonly_dir = root.path().join("readonly");
        fs::create_dir_all(&readonly_dir).expect("mkdir");
        let path = readonly_dir.join("release.yaml");
        fs::write(&path, "original").expect("seed");

        let mut perms = fs::metadata(&readonly_dir).expect("meta").permissions();
        perms.set_mode(0o555);
        fs::set_permissions(&readonly_dir, perms).expect("chmod");

        let tmp_dir = TempDir::new().expect("tmp dir");
        let tmp_path = tmp_dir.path().join("release.yaml.keel.tmp");
        let result = atomic_write_with_tmp(&path, "new content", false, &tmp_path);

        let mut perms = fs::metadata(&readonly_dir).expect("meta").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&readonly_dir, perms).expect("chmod");

        // Running as root bypasses directory permissions.
        if result.is_ok() {
            return;
        }
        assert_eq!(fs::read_to_string(&path).expect("read"), "original");
        assert!(!tmp_path.exists(), ".keel.tmp should be cleaned up");
    }
}
