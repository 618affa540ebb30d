use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::PathBuf;

/// Where HTML documents are read from. Implementations must be safe to share
/// between extraction tasks.
pub trait DocumentSource: Send + Sync + 'static {
    fn read(&self, reference: &str) -> impl Future<Output = io::Result<Vec<u8>>> + Send;
}

/// Documents stored as files under a root directory.
#[derive(Debug, Clone)]
pub struct FsDocumentSource {
    root: PathBuf,
}

impl FsDocumentSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, reference: &str) -> PathBuf {
        self.root.join(reference)
    }
}

impl DocumentSource for FsDocumentSource {
    fn read(&self, reference: &str) -> impl Future<Output = io::Result<Vec<u8>>> + Send {
        let path = self.resolve(reference);
        async move { tokio::fs::read(path).await }
    }
}

/// Documents held in memory, keyed by reference. Missing keys read as `NotFound`.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentSource {
    documents: HashMap<String, Vec<u8>>,
}

impl MemoryDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.documents.insert(reference.into(), body.into());
    }
}

impl FromIterator<(String, String)> for MemoryDocumentSource {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            documents: iter
                .into_iter()
                .map(|(k, v)| (k, v.into_bytes()))
                .collect(),
        }
    }
}

impl DocumentSource for MemoryDocumentSource {
    fn read(&self, reference: &str) -> impl Future<Output = io::Result<Vec<u8>>> + Send {
        let body = self.documents.get(reference).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no document {:?}", reference))
        });
        async move { body }
    }
}

/// Best-effort UTF-8: invalid sequences become U+FFFD, a leading BOM is dropped.
pub fn decode_document(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_is_lossy_and_strips_bom() {
        assert_eq!(decode_document(b"\xEF\xBB\xBF<p>hi</p>"), "<p>hi</p>");
        let decoded = decode_document(b"<p>caf\xE9</p>");
        assert!(decoded.starts_with("<p>caf"));
        assert!(decoded.contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn fs_source_reads_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.html"), "<html></html>").unwrap();
        let source = FsDocumentSource::new(dir.path());
        assert_eq!(source.read("a.html").await.unwrap(), b"<html></html>");
        let err = source.read("missing.html").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn memory_source_reports_missing_documents() {
        let mut source = MemoryDocumentSource::new();
        source.insert("x", "<b>x</b>");
        assert_eq!(source.read("x").await.unwrap(), b"<b>x</b>");
        assert!(source.read("y").await.is_err());
    }
}
