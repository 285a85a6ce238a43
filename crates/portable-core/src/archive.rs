//! Archive extraction for runtime distributions.
//!
//! Dispatches on the archive filename: `.zip` for Windows builds,
//! `.tar.gz` for macOS and `.tar.xz` for Linux. Extraction happens
//! entirely in-process; no external unzip or tar binary is required.
//!
//! The source archive is only deleted after a fully successful
//! extraction, so a failed unpack leaves the download intact for
//! inspection or retry.

use crate::error::{PortableError, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};

/// Recognized archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
    TarXz,
}

impl ArchiveFormat {
    /// Detect the format from a filename.
    pub fn detect(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if name.ends_with(".zip") {
            Ok(ArchiveFormat::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(ArchiveFormat::TarGz)
        } else if name.ends_with(".tar.xz") {
            Ok(ArchiveFormat::TarXz)
        } else {
            Err(PortableError::UnsupportedArchive(name.to_string()))
        }
    }
}

/// Extract an archive into `dest_dir`, creating it if needed.
///
/// When `delete_archive` is set the source file is removed, but only
/// after extraction succeeded.
pub async fn extract(archive_path: &Path, dest_dir: &Path, delete_archive: bool) -> Result<()> {
    let format = ArchiveFormat::detect(archive_path)?;
    info!(
        "Extracting {} to {}",
        archive_path.display(),
        dest_dir.display()
    );

    std::fs::create_dir_all(dest_dir).map_err(|e| PortableError::io_with_path(e, dest_dir))?;

    match format {
        ArchiveFormat::Zip => extract_zip(archive_path, dest_dir)?,
        ArchiveFormat::TarGz => extract_tar_gz(archive_path, dest_dir)?,
        ArchiveFormat::TarXz => extract_tar_xz(archive_path, dest_dir).await?,
    }

    if delete_archive {
        debug!("Removing archive {}", archive_path.display());
        std::fs::remove_file(archive_path)
            .map_err(|e| PortableError::io_with_path(e, archive_path))?;
    }

    Ok(())
}

fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file =
        File::open(archive_path).map_err(|e| PortableError::io_with_path(e, archive_path))?;

    let mut archive = zip::ZipArchive::new(file).map_err(|e| PortableError::ExtractionFailed {
        message: format!("Invalid zip archive: {e}"),
    })?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| PortableError::ExtractionFailed {
                message: format!("Failed to read zip entry {i}: {e}"),
            })?;

        // enclosed_name rejects entries that escape the target directory
        let outpath = match entry.enclosed_name() {
            Some(path) => dest_dir.join(path),
            None => continue,
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)
                .map_err(|e| PortableError::io_with_path(e, &outpath))?;
        } else {
            if let Some(parent) = outpath.parent() {
                if !parent.exists() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| PortableError::io_with_path(e, parent))?;
                }
            }

            let mut outfile =
                File::create(&outpath).map_err(|e| PortableError::io_with_path(e, &outpath))?;

            std::io::copy(&mut entry, &mut outfile)
                .map_err(|e| PortableError::io_with_path(e, &outpath))?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode)).ok();
            }
        }
    }

    Ok(())
}

fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file =
        File::open(archive_path).map_err(|e| PortableError::io_with_path(e, archive_path))?;

    let decoder = flate2::read::GzDecoder::new(BufReader::new(file));
    let mut archive = tar::Archive::new(decoder);

    archive
        .unpack(dest_dir)
        .map_err(|e| PortableError::ExtractionFailed {
            message: format!("Failed to extract tarball: {e}"),
        })?;

    Ok(())
}

/// xz decompresses to a scratch tar first, then unpacks.
async fn extract_tar_xz(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    use async_compression::tokio::bufread::XzDecoder;
    use tokio::io::BufReader as AsyncBufReader;

    let scratch = tempfile::tempdir().map_err(|e| PortableError::ExtractionFailed {
        message: format!("Failed to create scratch directory: {e}"),
    })?;
    let tar_path = scratch.path().join("archive.tar");

    let input = tokio::fs::File::open(archive_path)
        .await
        .map_err(|e| PortableError::io_with_path(e, archive_path))?;
    let mut output = tokio::fs::File::create(&tar_path)
        .await
        .map_err(|e| PortableError::io_with_path(e, &tar_path))?;

    let mut decoder = XzDecoder::new(AsyncBufReader::new(input));
    tokio::io::copy(&mut decoder, &mut output)
        .await
        .map_err(|e| PortableError::ExtractionFailed {
            message: format!("Failed to decompress xz archive: {e}"),
        })?;

    let tar_file = File::open(&tar_path).map_err(|e| PortableError::io_with_path(e, &tar_path))?;
    let mut archive = tar::Archive::new(BufReader::new(tar_file));
    archive
        .unpack(dest_dir)
        .map_err(|e| PortableError::ExtractionFailed {
            message: format!("Failed to extract tarball: {e}"),
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_format_detection() {
        assert_eq!(
            ArchiveFormat::detect(Path::new("node-v22.19.0-win-x64.zip")).unwrap(),
            ArchiveFormat::Zip
        );
        assert_eq!(
            ArchiveFormat::detect(Path::new("node-v22.19.0-darwin-arm64.tar.gz")).unwrap(),
            ArchiveFormat::TarGz
        );
        assert_eq!(
            ArchiveFormat::detect(Path::new("node-v22.19.0-linux-x64.tar.xz")).unwrap(),
            ArchiveFormat::TarXz
        );
        assert!(matches!(
            ArchiveFormat::detect(Path::new("runtime.rar")),
            Err(PortableError::UnsupportedArchive(_))
        ));
    }

    #[tokio::test]
    async fn test_extract_zip_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let archive_path = tmp.path().join("bundle.zip");

        let file = File::create(&archive_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        writer.add_directory("bundle/bin/", options).unwrap();
        writer.start_file("bundle/bin/node", options).unwrap();
        writer.write_all(b"#!binary").unwrap();
        writer.finish().unwrap();

        let dest = tmp.path().join("out");
        extract(&archive_path, &dest, true).await.unwrap();

        assert_eq!(
            std::fs::read(dest.join("bundle/bin/node")).unwrap(),
            b"#!binary"
        );
        // delete_archive removed the source
        assert!(!archive_path.exists());
    }

    #[tokio::test]
    async fn test_extract_tar_gz_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let archive_path = tmp.path().join("bundle.tar.gz");

        let file = File::create(&archive_path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let payload = b"runtime payload";
        let mut header = tar::Header::new_gnu();
        header.set_size(payload.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "bundle/README.md", &payload[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let dest = tmp.path().join("out");
        extract(&archive_path, &dest, false).await.unwrap();

        assert_eq!(
            std::fs::read(dest.join("bundle/README.md")).unwrap(),
            payload
        );
        // archive kept when delete_archive is false
        assert!(archive_path.exists());
    }

    #[tokio::test]
    async fn test_extract_failure_keeps_archive() {
        let tmp = tempfile::TempDir::new().unwrap();
        let archive_path = tmp.path().join("broken.zip");
        std::fs::write(&archive_path, b"not actually a zip").unwrap();

        let dest = tmp.path().join("out");
        let err = extract(&archive_path, &dest, true).await.unwrap_err();

        assert!(matches!(err, PortableError::ExtractionFailed { .. }));
        assert!(archive_path.exists());
    }
}
