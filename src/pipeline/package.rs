//! Packager: wrap the output file(s) in a single deflate-compressed zip.
//!
//! Inputs land in the archive at their base names only — the deliverable
//! carries no directory structure. Created via temp file + rename so an
//! interrupted run cannot leave a half-written archive at the final path.

use crate::error::AnsEtlError;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Compress `inputs` into a zip at `archive_path`, each entry stored at its
/// base name.
pub async fn package(
    inputs: &[PathBuf],
    archive_path: &Path,
) -> Result<(), AnsEtlError> {
    let inputs = inputs.to_vec();
    let archive = archive_path.to_path_buf();

    tokio::task::spawn_blocking(move || package_blocking(&inputs, &archive))
        .await
        .map_err(|e| AnsEtlError::Internal(format!("Packaging task panicked: {e}")))?
}

fn package_blocking(inputs: &[PathBuf], archive_path: &Path) -> Result<(), AnsEtlError> {
    let fail = |detail: String| AnsEtlError::Packaging {
        path: archive_path.to_path_buf(),
        detail,
    };

    if let Some(parent) = archive_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| fail(format!("cannot create output dir: {e}")))?;
        }
    }

    let tmp = archive_path.with_extension("zip.tmp");
    if let Err(e) = fill_archive(inputs, &tmp) {
        let _ = std::fs::remove_file(&tmp);
        return Err(fail(e));
    }

    std::fs::rename(&tmp, archive_path)
        .map_err(|e| fail(format!("cannot finalize archive: {e}")))?;

    info!("Created archive {}", archive_path.display());
    Ok(())
}

fn fill_archive(inputs: &[PathBuf], tmp: &Path) -> Result<(), String> {
    let file = std::fs::File::create(tmp).map_err(|e| format!("cannot create archive: {e}"))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for input in inputs {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| format!("input has no file name: '{}'", input.display()))?;

        writer
            .start_file(name, options)
            .map_err(|e| format!("cannot start entry: {e}"))?;
        let mut source = std::fs::File::open(input)
            .map_err(|e| format!("cannot read '{}': {e}", input.display()))?;
        io::copy(&mut source, &mut writer)
            .map_err(|e| format!("compression failed for '{}': {e}", input.display()))?;
    }

    writer
        .finish()
        .map_err(|e| format!("cannot finalize archive: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[tokio::test]
    async fn archive_holds_input_at_base_name() {
        let dir = TempDir::new().unwrap();
        let csv = dir.path().join("sub").join("Rol_Procedimentos.csv");
        std::fs::create_dir_all(csv.parent().unwrap()).unwrap();
        std::fs::write(&csv, "PROCEDIMENTO;DUT\nCONSULTA;064\n").unwrap();

        let archive = dir.path().join("Teste_Rol_Procedimentos.zip");
        package(&[csv.clone()], &archive).await.unwrap();

        let file = std::fs::File::open(&archive).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        assert_eq!(zip.len(), 1);

        let mut entry = zip.by_name("Rol_Procedimentos.csv").unwrap();
        let mut contents = String::new();
        entry.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "PROCEDIMENTO;DUT\nCONSULTA;064\n");
    }

    #[tokio::test]
    async fn missing_input_is_a_packaging_error() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("out.zip");
        let err = package(&[dir.path().join("nonexistent.csv")], &archive)
            .await
            .unwrap_err();
        assert!(matches!(err, AnsEtlError::Packaging { .. }));
        assert!(!archive.exists(), "failed run must not leave an archive");
    }

    #[tokio::test]
    async fn no_temp_archive_left_behind() {
        let dir = TempDir::new().unwrap();
        let csv = dir.path().join("data.csv");
        std::fs::write(&csv, "a;b\n").unwrap();

        let archive = dir.path().join("out.zip");
        package(&[csv], &archive).await.unwrap();

        assert!(archive.exists());
        assert!(!archive.with_extension("zip.tmp").exists());
    }
}
