//! Async file helpers shared by the on-disk stores.

use std::io;
use std::path::Path;

/// Write `contents` to `path` atomically: write a sibling temp file, then rename over the target.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
  let file_name = path
    .file_name()
    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
  let mut temp_name = file_name.to_os_string();
  temp_name.push(".tmp");
  let temp_path = path.with_file_name(temp_name);

  tokio::fs::write(&temp_path, contents).await?;
  tokio::fs::rename(&temp_path, path).await
}

/// Read a UTF-8 file, mapping "not found" to `None`.
pub async fn read_optional(path: &Path) -> io::Result<Option<String>> {
  match tokio::fs::read_to_string(path).await {
    Ok(content) => Ok(Some(content)),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(e),
  }
}
