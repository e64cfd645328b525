//! Input byte stream of a run.

use std::io::Cursor;
use std::path::Path;

use bytes::Bytes;
use tokio::io::AsyncRead;

/// A named byte stream with a known total size.
pub struct SourceFile {
    pub name: String,
    pub size: u64,
    reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl SourceFile {
    pub fn from_reader(
        name: impl Into<String>,
        size: u64,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            reader: Box::new(reader),
        }
    }

    pub fn from_bytes(name: impl Into<String>, data: Bytes) -> Self {
        let size = data.len() as u64;
        Self::from_reader(name, size, Cursor::new(data))
    }

    /// Open a file on disk. The source is named after the last path component.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Ok(Self::from_reader(name, size, file))
    }

    pub(crate) fn into_reader(self) -> Box<dyn AsyncRead + Send + Unpin> {
        self.reader
    }
}

impl std::fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceFile")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}
