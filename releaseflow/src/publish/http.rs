//! Upload client for the legacy package-index upload API.

use super::{read_distributions, DistributionFilename, PackageIndex, PublishCredential, PublishReceipt};
use crate::errors::PublishRejection;
use crate::store::ArtifactFile;
use crate::utils::{md5_hex, now_utc};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::path::Path;

const ALREADY_EXISTS_MARKER: &str = "file already exists";
const BODY_EXCERPT_CHARS: usize = 300;

/// Uploads distributions one file at a time with `__token__` basic auth.
///
/// Files are sent in name order and the first rejection stops the call.
/// The upload API has no batch endpoint, so this is not atomic: files
/// accepted before the rejection stay on the index.
#[derive(Debug, Clone)]
pub struct HttpPackageIndex {
    client: Client,
    repository_url: String,
}

impl HttpPackageIndex {
    /// Creates a client for `repository_url`.
    #[must_use]
    pub fn new(repository_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), repository_url)
    }

    /// Creates a client reusing an existing `reqwest::Client`.
    #[must_use]
    pub fn with_client(client: Client, repository_url: impl Into<String>) -> Self {
        Self {
            client,
            repository_url: repository_url.into(),
        }
    }

    async fn upload(
        &self,
        dist: &DistributionFilename,
        file: &ArtifactFile,
        credential: &PublishCredential,
    ) -> Result<(), PublishRejection> {
        let boundary = format!(
            "----releaseflow{}",
            &file.sha256[..file.sha256.len().min(12)]
        );
        let body = build_upload_body(&boundary, dist, file);

        tracing::info!(file = %dist.file_name, url = %self.repository_url, "Uploading distribution");
        let response = self
            .client
            .post(&self.repository_url)
            .basic_auth("__token__", Some(credential.token()))
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| PublishRejection::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        classify_response(status, &text, &dist.file_name)
    }
}

#[async_trait]
impl PackageIndex for HttpPackageIndex {
    async fn publish(
        &self,
        dist_dir: &Path,
        credential: &PublishCredential,
    ) -> Result<PublishReceipt, PublishRejection> {
        let distributions = read_distributions(dist_dir).await?;

        let mut published = Vec::with_capacity(distributions.len());
        for (dist, file) in &distributions {
            if let Err(rejection) = self.upload(dist, file, credential).await {
                if !published.is_empty() {
                    tracing::error!(
                        accepted = ?published,
                        rejected = %dist.file_name,
                        "Index rejected a file after accepting others; the release is incomplete"
                    );
                }
                return Err(rejection);
            }
            published.push(dist.file_name.clone());
        }

        Ok(PublishReceipt {
            repository: self.repository_url.clone(),
            files: published,
            published_at: now_utc(),
        })
    }
}

fn classify_response(
    status: StatusCode,
    body: &str,
    file_name: &str,
) -> Result<(), PublishRejection> {
    if status.is_success() {
        return Ok(());
    }

    let message: String = body.trim().chars().take(BODY_EXCERPT_CHARS).collect();
    if status == StatusCode::FORBIDDEN || status == StatusCode::UNAUTHORIZED {
        return Err(PublishRejection::Forbidden { message });
    }
    if status == StatusCode::CONFLICT
        || (status == StatusCode::BAD_REQUEST
            && message.to_ascii_lowercase().contains(ALREADY_EXISTS_MARKER))
    {
        return Err(PublishRejection::AlreadyExists {
            file_name: file_name.to_string(),
        });
    }
    Err(PublishRejection::Status {
        status: status.as_u16(),
        file_name: file_name.to_string(),
        message,
    })
}

fn build_upload_body(boundary: &str, dist: &DistributionFilename, file: &ArtifactFile) -> Vec<u8> {
    let mut body = Vec::with_capacity(file.contents.len() + 1024);
    append_form_field(&mut body, boundary, ":action", "file_upload");
    append_form_field(&mut body, boundary, "protocol_version", "1");
    append_form_field(&mut body, boundary, "metadata_version", "2.1");
    append_form_field(&mut body, boundary, "name", &dist.name);
    append_form_field(&mut body, boundary, "version", &dist.version);
    append_form_field(&mut body, boundary, "filetype", dist.filetype());
    append_form_field(&mut body, boundary, "pyversion", dist.pyversion());
    append_form_field(&mut body, boundary, "sha256_digest", &file.sha256);
    append_form_field(&mut body, boundary, "md5_digest", &md5_hex(&file.contents));
    append_file_field(&mut body, boundary, "content", &dist.file_name, &file.contents);
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

fn append_form_field(buf: &mut Vec<u8>, boundary: &str, name: &str, value: &str) {
    buf.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    buf.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
    );
    buf.extend_from_slice(value.as_bytes());
    buf.extend_from_slice(b"\r\n");
}

fn append_file_field(buf: &mut Vec<u8>, boundary: &str, name: &str, filename: &str, bytes: &[u8]) {
    buf.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    buf.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    buf.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    buf.extend_from_slice(bytes);
    buf.extend_from_slice(b"\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::CredentialSource;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn test_upload_body_fields() {
        let dist = DistributionFilename::parse("demo-1.0-cp311-cp311-win_amd64.whl").unwrap();
        let file = ArtifactFile::new(&dist.file_name, b"wheel-bytes".to_vec()).unwrap();
        let body = build_upload_body("BOUNDARY", &dist, &file);
        let text = String::from_utf8(body).unwrap();

        assert!(text.contains("name=\":action\"\r\n\r\nfile_upload\r\n"));
        assert!(text.contains("name=\"filetype\"\r\n\r\nbdist_wheel\r\n"));
        assert!(text.contains("name=\"pyversion\"\r\n\r\ncp311\r\n"));
        assert!(text.contains(&format!("name=\"sha256_digest\"\r\n\r\n{}\r\n", file.sha256)));
        assert!(text.contains(&format!(
            "name=\"md5_digest\"\r\n\r\n{}\r\n",
            md5_hex(b"wheel-bytes")
        )));
        assert!(text.contains("filename=\"demo-1.0-cp311-cp311-win_amd64.whl\""));
        assert!(text.ends_with("--BOUNDARY--\r\n"));
    }

    #[test]
    fn test_classify_success() {
        assert!(classify_response(StatusCode::OK, "", "a.whl").is_ok());
    }

    #[test]
    fn test_classify_already_exists() {
        let err = classify_response(
            StatusCode::BAD_REQUEST,
            "400 File already exists ('demo-1.0.tar.gz', with blake2_256 hash 'abc').",
            "demo-1.0.tar.gz",
        )
        .unwrap_err();
        assert_eq!(
            err,
            PublishRejection::AlreadyExists {
                file_name: "demo-1.0.tar.gz".to_string()
            }
        );
    }

    /// Serves one scripted response per connection and records the uploaded
    /// file names.
    async fn scripted_index(
        responses: Vec<(u16, &'static str)>,
    ) -> (String, Arc<Mutex<Vec<String>>>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/legacy/", listener.local_addr().unwrap());
        let uploaded = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&uploaded);
        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let mut request = Vec::new();
                let mut chunk = [0u8; 8192];
                loop {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&chunk[..n]);
                    let text = String::from_utf8_lossy(&request).to_string();
                    let Some(head_end) = text.find("\r\n\r\n") else {
                        continue;
                    };
                    let length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + length {
                        break;
                    }
                }
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(start) = text.find("filename=\"") {
                    let rest = &text[start + 10..];
                    record.lock().push(rest[..rest.find('"').unwrap()].to_string());
                }
                let reply = format!(
                    "HTTP/1.1 {status} Scripted\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });
        (url, uploaded)
    }

    #[tokio::test]
    async fn test_publish_stops_at_first_rejection_and_keeps_earlier_uploads() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "demo-1.0-cp311-cp311-manylinux_2_17_x86_64.whl",
            "demo-1.0-cp312-cp312-manylinux_2_17_x86_64.whl",
            "demo-1.0.tar.gz",
        ] {
            std::fs::write(dir.path().join(name), name.as_bytes()).unwrap();
        }
        let (url, uploaded) = scripted_index(vec![
            (200, "OK"),
            (400, "File already exists ('demo-1.0-cp312-cp312-manylinux_2_17_x86_64.whl')."),
            (200, "OK"),
        ])
        .await;

        let index = HttpPackageIndex::new(url);
        let credential = PublishCredential::new("upload-token", "pypi", CredentialSource::Static);
        let err = index.publish(dir.path(), &credential).await.unwrap_err();

        assert_eq!(
            err,
            PublishRejection::AlreadyExists {
                file_name: "demo-1.0-cp312-cp312-manylinux_2_17_x86_64.whl".to_string()
            }
        );
        assert_eq!(
            *uploaded.lock(),
            vec![
                "demo-1.0-cp311-cp311-manylinux_2_17_x86_64.whl".to_string(),
                "demo-1.0-cp312-cp312-manylinux_2_17_x86_64.whl".to_string(),
            ]
        );
    }

    #[test]
    fn test_classify_forbidden_and_other() {
        assert!(matches!(
            classify_response(StatusCode::FORBIDDEN, "Invalid API Token", "a.whl"),
            Err(PublishRejection::Forbidden { .. })
        ));
        assert!(matches!(
            classify_response(StatusCode::BAD_REQUEST, "Invalid value for version", "a.whl"),
            Err(PublishRejection::Status { status: 400, .. })
        ));
    }
}
