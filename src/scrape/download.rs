//! Direct PDF download into the artifact store

use crate::error::{Error, Result};
use crate::store::{clean_filename, ArtifactStore};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Streams PDFs over HTTP into the store directory
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(Error::Http)?;
        Ok(Self { client })
    }

    /// Download one PDF into the store under a cleaned, collision-free name
    /// derived from `suggested_name`, and record it under `identifier`.
    ///
    /// Returns the path of the stored file.
    pub async fn download(
        &self,
        url: &str,
        suggested_name: &str,
        store: &mut ArtifactStore,
        identifier: &str,
    ) -> Result<PathBuf> {
        let mut base_name = clean_filename(suggested_name);
        if !base_name.to_lowercase().ends_with(".pdf") {
            base_name.push_str(".pdf");
        }
        let file_name = store.unique_name(&base_name);
        let path = store.dir().join(&file_name);

        debug!("Downloading {} -> {}", url, file_name);

        let response = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::Download(format!("GET {} failed: {}", url, e)))?;

        let mut file = tokio::fs::File::create(&path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Download(format!("Stream from {} failed: {}", url, e)))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        store.record(identifier, &file_name)?;
        info!("Saved {}", file_name);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn pdf_server(body: &[u8]) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_download_stores_and_records() {
        let server = pdf_server(b"%PDF-1.4 fake").await;
        let tmp = TempDir::new().unwrap();
        let mut store = ArtifactStore::open(tmp.path()).unwrap();
        let downloader = Downloader::new(10).unwrap();

        let url = format!("{}/doc.pdf", server.uri());
        let stored = downloader
            .download(&url, "DEED 2024:001", &mut store, "DEED_2024_001")
            .await
            .unwrap();

        assert!(stored.ends_with("DEED 2024_001.pdf"));
        assert_eq!(std::fs::read(&stored).unwrap(), b"%PDF-1.4 fake");
        assert!(store.exists_for("DEED_2024_001"));
    }

    #[tokio::test]
    async fn test_download_appends_pdf_extension() {
        let server = pdf_server(b"bytes").await;
        let tmp = TempDir::new().unwrap();
        let mut store = ArtifactStore::open(tmp.path()).unwrap();
        let downloader = Downloader::new(10).unwrap();

        let url = format!("{}/doc.pdf", server.uri());
        let stored = downloader
            .download(&url, "row_1_page_1", &mut store, "row_1_page_1")
            .await
            .unwrap();
        assert!(stored.ends_with("row_1_page_1.pdf"));
    }

    #[tokio::test]
    async fn test_download_avoids_name_collisions() {
        let server = pdf_server(b"second").await;
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("doc.pdf"), b"first").unwrap();
        let mut store = ArtifactStore::open(tmp.path()).unwrap();
        let downloader = Downloader::new(10).unwrap();

        let url = format!("{}/doc.pdf", server.uri());
        let stored = downloader
            .download(&url, "doc.pdf", &mut store, "doc")
            .await
            .unwrap();

        assert!(stored.ends_with("doc_1.pdf"));
        assert_eq!(std::fs::read(tmp.path().join("doc.pdf")).unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_download_http_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let mut store = ArtifactStore::open(tmp.path()).unwrap();
        let downloader = Downloader::new(10).unwrap();

        let url = format!("{}/missing.pdf", server.uri());
        let result = downloader.download(&url, "missing", &mut store, "missing").await;
        assert!(result.is_err());
        assert!(!store.exists_for("missing"));
    }
}
