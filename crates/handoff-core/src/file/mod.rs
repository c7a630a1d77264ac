//! File operations for Handoff.
//!
//! - Validating the file a listener serves
//! - Validating and preparing the receiver's destination directory
//! - Turning an untrusted header name into a bare file name
//! - Writing the received body to disk

use std::path::{Component, Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::protocol::FileHeader;

/// Reduce a name received from a peer to a bare file name.
///
/// Everything up to the last `/`, `\` or `:` is dropped, control characters
/// are removed, and the rest must be a single normal path component, so the
/// result can be joined onto the destination directory without escaping it
/// on any platform (including drive-relative names such as `C:evil.txt`).
///
/// Returns `None` if nothing usable remains.
#[must_use]
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\', ':']).next().unwrap_or(name);
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();

    let mut components = Path::new(cleaned).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Some(cleaned.to_string()),
        _ => None,
    }
}

/// Format a file size for display.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{size:.2} {}", UNITS[unit])
}

/// Check that `path` names an existing, readable regular file.
///
/// # Errors
///
/// Returns [`Error::FileNotFound`] if nothing exists at `path` and
/// [`Error::FileUnreadable`] if it is not a regular file or cannot be opened.
pub async fn validate_source(path: &Path) -> Result<()> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        Err(e) => {
            return Err(Error::FileUnreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
    };

    if !metadata.is_file() {
        return Err(Error::FileUnreadable {
            path: path.to_path_buf(),
            reason: "not a regular file".to_string(),
        });
    }

    File::open(path).await.map_err(|e| Error::FileUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    Ok(())
}

/// The name a served file is announced under.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the path has no usable file name or
/// the name does not fit the header.
pub fn source_name(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .and_then(|n| sanitize_file_name(&n))
        .ok_or_else(|| {
            Error::InvalidInput(format!("'{}' has no usable file name", path.display()))
        })?;

    FileHeader::new(name, 0).map(|h| h.name)
}

/// Open the served file and build its header from the open handle.
///
/// The size is taken from the handle, so it matches the bytes that will be
/// read even if the path is replaced afterwards.
///
/// # Errors
///
/// Returns [`Error::FileSystem`] if the file cannot be opened or its
/// metadata read.
pub async fn open_source(path: &Path) -> Result<(File, FileHeader)> {
    let name = source_name(path)?;

    let file = File::open(path)
        .await
        .map_err(|e| Error::file_system(path, e))?;
    let metadata = file
        .metadata()
        .await
        .map_err(|e| Error::file_system(path, e))?;

    Ok((file, FileHeader::new(name, metadata.len())?))
}

/// Check that `dir` is an existing directory, or could be created as one.
///
/// Nothing is created here; the connector creates the directory once a
/// header has arrived.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `dir` is empty, exists as something
/// other than a directory, or its nearest existing ancestor is not a
/// directory.
pub fn validate_destination_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() {
        return Err(Error::InvalidInput(
            "destination directory is empty".to_string(),
        ));
    }

    for ancestor in dir.ancestors() {
        if ancestor.as_os_str().is_empty() {
            // Relative path with no existing prefix: it resolves under the
            // working directory.
            return Ok(());
        }
        match std::fs::metadata(ancestor) {
            Ok(m) if m.is_dir() => return Ok(()),
            Ok(_) => {
                return Err(Error::InvalidInput(format!(
                    "'{}' is not a directory",
                    ancestor.display()
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::InvalidInput(format!(
                    "cannot use '{}' as destination: {e}",
                    ancestor.display()
                )));
            }
        }
    }

    Ok(())
}

/// Suffix of the file a download is written to before it is complete.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Writer for the received file body.
///
/// Bytes go to a sibling `<name>.part` file, which only replaces the target
/// in [`FileWriter::finalize`]. A failed download never touches an existing
/// file of the same name.
#[derive(Debug)]
pub struct FileWriter {
    /// Final output file path
    pub output_path: PathBuf,
    /// Expected total file size
    pub expected_size: u64,
    /// Path the body is written to until it is complete
    part_path: PathBuf,
    /// File handle
    file: Option<File>,
    /// Bytes written so far
    bytes_written: u64,
}

impl FileWriter {
    /// Create (or truncate) the partial file next to `output_path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileSystem`] if the file cannot be created.
    pub async fn new(output_path: PathBuf, expected_size: u64) -> Result<Self> {
        let part_path = partial_path(&output_path);
        let file = File::create(&part_path)
            .await
            .map_err(|e| Error::file_system(&part_path, e))?;

        Ok(Self {
            output_path,
            expected_size,
            part_path,
            file: Some(file),
            bytes_written: 0,
        })
    }

    /// Append a chunk to the file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileSystem`] if the write fails.
    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        if let Some(ref mut file) = self.file {
            file.write_all(data)
                .await
                .map_err(|e| Error::file_system(&self.part_path, e))?;
        }
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Flush and sync the partial file, then move it onto the output path.
    ///
    /// On failure the partial file is left in place; pass the writer's
    /// [`part_path`](Self::part_path) to cleanup if it should go.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileSystem`] if the file cannot be synced or renamed.
    pub async fn finalize(mut self) -> Result<PathBuf> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| Error::file_system(&self.part_path, e))?;
            file.sync_all()
                .await
                .map_err(|e| Error::file_system(&self.part_path, e))?;
        }
        tokio::fs::rename(&self.part_path, &self.output_path)
            .await
            .map_err(|e| Error::file_system(&self.output_path, e))?;
        Ok(self.output_path)
    }

    /// Close and delete the partial file.
    pub async fn discard(mut self) {
        drop(self.file.take());
        remove_partial(&self.part_path).await;
    }

    /// Flush and close the partial file, leaving it on disk.
    pub async fn keep(mut self) {
        if let Some(mut file) = self.file.take() {
            if let Err(e) = file.flush().await {
                tracing::warn!(
                    "Failed to flush partial file {}: {}",
                    self.part_path.display(),
                    e
                );
            }
        }
        tracing::debug!("Kept partial file {}", self.part_path.display());
    }

    /// Path of the partial file.
    #[must_use]
    pub fn part_path(&self) -> &Path {
        &self.part_path
    }

    /// Get the current bytes written count.
    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Get the expected file size.
    #[must_use]
    pub const fn expected_size(&self) -> u64 {
        self.expected_size
    }
}

/// Path a download of `output_path` is written to until it is complete.
#[must_use]
pub fn partial_path(output_path: &Path) -> PathBuf {
    let mut name = output_path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    output_path.with_file_name(name)
}

/// Delete a partial file, logging rather than failing.
pub async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!("Failed to remove partial file {}: {}", path.display(), e);
    } else {
        tracing::debug!("Removed partial file {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_plain_name() {
        assert_eq!(
            sanitize_file_name("report.pdf"),
            Some("report.pdf".to_string())
        );
    }

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(
            sanitize_file_name("../../../etc/passwd"),
            Some("passwd".to_string())
        );
        assert_eq!(
            sanitize_file_name("C:\\Users\\me\\notes.txt"),
            Some("notes.txt".to_string())
        );
        assert_eq!(
            sanitize_file_name("/absolute/path.bin"),
            Some("path.bin".to_string())
        );
    }

    #[test]
    fn test_sanitize_rejects_traversal_only_names() {
        assert_eq!(sanitize_file_name(".."), None);
        assert_eq!(sanitize_file_name("dir/.."), None);
        assert_eq!(sanitize_file_name("."), None);
        assert_eq!(sanitize_file_name("trailing/"), None);
        assert_eq!(sanitize_file_name(""), None);
        assert_eq!(sanitize_file_name("C:"), None);
    }

    #[test]
    fn test_sanitize_strips_drive_prefixes() {
        assert_eq!(
            sanitize_file_name("C:evil.txt"),
            Some("evil.txt".to_string())
        );
        assert_eq!(
            sanitize_file_name("\\\\?\\C:\\x"),
            Some("x".to_string())
        );
        assert_eq!(
            sanitize_file_name("\\\\server\\share\\doc.pdf"),
            Some("doc.pdf".to_string())
        );
    }

    #[test]
    fn test_sanitize_removes_control_characters() {
        assert_eq!(
            sanitize_file_name("evil\u{0}name\n.txt"),
            Some("evilname.txt".to_string())
        );
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0.00 B");
        assert_eq!(format_size(512), "512.00 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(10_000), "9.77 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024 * 1024), "3.00 TB");
    }

    #[tokio::test]
    async fn test_validate_source() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let file_path = temp_dir.path().join("data.bin");
        std::fs::write(&file_path, b"payload").expect("write file");

        validate_source(&file_path).await.expect("valid source");

        assert!(matches!(
            validate_source(&temp_dir.path().join("missing.bin")).await,
            Err(Error::FileNotFound(_))
        ));
        assert!(matches!(
            validate_source(temp_dir.path()).await,
            Err(Error::FileUnreadable { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_source() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let file_path = temp_dir.path().join("report.pdf");
        std::fs::write(&file_path, vec![0u8; 1234]).expect("write file");

        let (_file, header) = open_source(&file_path).await.expect("open");
        assert_eq!(header.name, "report.pdf");
        assert_eq!(header.size, 1234);
    }

    #[tokio::test]
    async fn test_open_source_missing() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let result = open_source(&temp_dir.path().join("gone.bin")).await;
        assert!(matches!(result, Err(Error::FileSystem { .. })));
    }

    #[test]
    fn test_validate_destination_dir() {
        let temp_dir = TempDir::new().expect("create temp dir");

        validate_destination_dir(temp_dir.path()).expect("existing dir");
        validate_destination_dir(&temp_dir.path().join("new/nested")).expect("creatable dir");

        let file_path = temp_dir.path().join("plain.txt");
        std::fs::write(&file_path, b"x").expect("write file");
        assert!(matches!(
            validate_destination_dir(&file_path),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            validate_destination_dir(&file_path.join("below")),
            Err(Error::InvalidInput(_))
        ));
        assert!(validate_destination_dir(Path::new("")).is_err());
    }

    #[tokio::test]
    async fn test_file_writer_finalize() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let output = temp_dir.path().join("out.bin");

        let mut writer = FileWriter::new(output.clone(), 6).await.expect("writer");
        writer.write_chunk(b"abc").await.expect("write");
        writer.write_chunk(b"def").await.expect("write");
        assert_eq!(writer.bytes_written(), writer.expected_size());

        let path = writer.finalize().await.expect("finalize");
        assert_eq!(std::fs::read(path).expect("read"), b"abcdef");
    }

    #[tokio::test]
    async fn test_file_writer_uses_partial_file() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let output = temp_dir.path().join("out.bin");

        let mut writer = FileWriter::new(output.clone(), 3).await.expect("writer");
        writer.write_chunk(b"abc").await.expect("write");
        assert_eq!(writer.part_path(), temp_dir.path().join("out.bin.part"));
        assert!(writer.part_path().exists());
        assert!(!output.exists());

        writer.finalize().await.expect("finalize");
        assert!(output.exists());
        assert!(!temp_dir.path().join("out.bin.part").exists());
    }

    #[tokio::test]
    async fn test_file_writer_discard_keeps_existing_file() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let output = temp_dir.path().join("notes.txt");
        std::fs::write(&output, b"precious user data").expect("write file");

        let mut writer = FileWriter::new(output.clone(), 100).await.expect("writer");
        writer.write_chunk(b"only a bit").await.expect("write");
        writer.discard().await;

        assert_eq!(std::fs::read(&output).expect("read"), b"precious user data");
        assert!(!temp_dir.path().join("notes.txt.part").exists());
    }

    #[tokio::test]
    async fn test_file_writer_finalize_replaces_existing_file() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let output = temp_dir.path().join("notes.txt");
        std::fs::write(&output, b"stale content that is longer").expect("write file");

        let mut writer = FileWriter::new(output.clone(), 5).await.expect("writer");
        writer.write_chunk(b"fresh").await.expect("write");
        writer.finalize().await.expect("finalize");

        assert_eq!(std::fs::read(&output).expect("read"), b"fresh");
    }

    #[tokio::test]
    async fn test_file_writer_keep_leaves_partial_file() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let output = temp_dir.path().join("notes.txt");

        let mut writer = FileWriter::new(output.clone(), 100).await.expect("writer");
        writer.write_chunk(b"abc").await.expect("write");
        writer.keep().await;

        assert!(!output.exists());
        let partial = temp_dir.path().join("notes.txt.part");
        assert_eq!(std::fs::read(partial).expect("read"), b"abc");
    }
}
