use std::io::ErrorKind;
use std::time::Duration;

use log::{debug, error};
use tokio::io::AsyncReadExt;

use crate::config::{Access, Format, USERNAME_PLACEHOLDER};
use crate::images::tools::{decode_raw, FetchError, RAW_LEN};
use crate::models::Image;

/// Substitute the username into a path or URL template.
///
/// The username is inserted verbatim; callers are trusted to pass names that
/// are safe in a path or URL.
pub fn resolve(template: &str, username: &str) -> String {
    template.replace(USERNAME_PLACEHOLDER, username)
}

/// Reads skin bytes from disk or over HTTP and decodes them.
pub struct SkinFetcher {
    access: Access,
    format: Format,
    client: reqwest::Client,
}

impl SkinFetcher {
    pub fn new(access: Access, format: Format, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            access,
            format,
            client,
        })
    }

    /// Fetch and decode the image at `locator`.
    ///
    /// Every failure (missing file, refused connection, timeout, bad status,
    /// corrupt data) is logged and reported as `None`.
    pub async fn fetch(&self, locator: &str) -> Option<Image> {
        match self.try_fetch(locator).await {
            Ok(img) => Some(img),
            Err(FetchError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                debug!("No image at {}", locator);
                None
            }
            Err(e) => {
                error!("Can't get image {}: {}", locator, e);
                None
            }
        }
    }

    async fn try_fetch(&self, locator: &str) -> Result<Image, FetchError> {
        let data = match self.access {
            Access::File => {
                debug!("Read image from file: {}", locator);
                self.read_file(locator).await?
            }
            Access::Url => {
                debug!("Read image from url: {}", locator);
                self.download(locator).await?
            }
        };

        self.decode(&data)
    }

    // Raw streams have a fixed size, so nothing past it is worth reading.
    fn read_limit(&self) -> Option<usize> {
        match self.format {
            Format::Common => None,
            Format::Byte => Some(RAW_LEN),
        }
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        match self.read_limit() {
            None => Ok(tokio::fs::read(path).await?),
            Some(limit) => {
                let file = tokio::fs::File::open(path).await?;
                let mut data = Vec::with_capacity(limit);
                // One extra byte so an oversized file still fails to decode.
                file.take(limit as u64 + 1).read_to_end(&mut data).await?;
                Ok(data)
            }
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let limit = self.read_limit();
        if let (Some(limit), Some(length)) = (limit, response.content_length()) {
            if length > limit as u64 {
                return Err(FetchError::RawLength {
                    expected: limit,
                    actual: length as usize,
                });
            }
        }

        let mut data = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            data.extend_from_slice(&chunk);
            if let Some(limit) = limit {
                if data.len() > limit {
                    return Err(FetchError::RawLength {
                        expected: limit,
                        actual: data.len(),
                    });
                }
            }
        }
        Ok(data)
    }

    fn decode(&self, data: &[u8]) -> Result<Image, FetchError> {
        match self.format {
            Format::Common => Ok(Image::decode(data)?),
            Format::Byte => decode_raw(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::tools::RAW_LEN;
    use image::{Rgba, RgbaImage};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn fetcher(access: Access, format: Format) -> SkinFetcher {
        SkinFetcher::new(access, format, Duration::from_secs(2)).unwrap()
    }

    fn sample_png() -> (Image, Vec<u8>) {
        let img = Image::from_rgba(RgbaImage::from_fn(8, 4, |x, y| {
            Rgba([x as u8 * 30, y as u8 * 60, 5, 255])
        }));
        let png = img.to_png().unwrap();
        (img, png)
    }

    // Serves `body` with `status_line` to a single connection, returning the
    // base URL.
    async fn serve_once(status_line: &'static str, body: Vec<u8>) -> String {
        serve(status_line, body, true).await
    }

    // Like `serve_once`, but without Content-Length: the body ends when the
    // connection closes.
    async fn serve_once_unsized(body: Vec<u8>) -> String {
        serve("200 OK", body, false).await
    }

    async fn serve(status_line: &'static str, body: Vec<u8>, sized: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let head = if sized {
                format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status_line,
                    body.len()
                )
            } else {
                format!("HTTP/1.1 {}\r\nConnection: close\r\n\r\n", status_line)
            };
            socket.write_all(head.as_bytes()).await.ok();
            socket.write_all(&body).await.ok();
            socket.shutdown().await.ok();
        });

        format!("http://{}", addr)
    }

    #[test]
    fn resolve_substitutes_username_verbatim() {
        assert_eq!(resolve("/skins/{username}.png", "Alice_1"), "/skins/Alice_1.png");
        assert_eq!(
            resolve("http://host/{username}/{username}", " a "),
            "http://host/ a / a "
        );
        assert_eq!(resolve("/static.png", "bob"), "/static.png");
    }

    #[tokio::test]
    async fn file_common_decodes_png() {
        let dir = tempfile::tempdir().unwrap();
        let (img, png) = sample_png();
        let path = dir.path().join("alice.png");
        std::fs::write(&path, png).unwrap();

        let fetched = fetcher(Access::File, Format::Common)
            .fetch(path.to_str().unwrap())
            .await;

        assert_eq!(fetched, Some(img));
    }

    #[tokio::test]
    async fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nobody.png");

        let fetched = fetcher(Access::File, Format::Common)
            .fetch(path.to_str().unwrap())
            .await;

        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn corrupt_png_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let (_, png) = sample_png();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, &png[..png.len() / 2]).unwrap();

        let fetched = fetcher(Access::File, Format::Common)
            .fetch(path.to_str().unwrap())
            .await;

        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn file_byte_decodes_raw_stream() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..RAW_LEN).map(|i| (i % 251) as u8).collect();
        let path = dir.path().join("raw.bin");
        std::fs::write(&path, &data).unwrap();

        let img = fetcher(Access::File, Format::Byte)
            .fetch(path.to_str().unwrap())
            .await
            .unwrap();

        assert_eq!(img.as_rgba().as_raw(), &data);
    }

    #[tokio::test]
    async fn byte_mode_rejects_png_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let (_, png) = sample_png();
        let path = dir.path().join("alice.png");
        std::fs::write(&path, png).unwrap();

        let fetched = fetcher(Access::File, Format::Byte)
            .fetch(path.to_str().unwrap())
            .await;

        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn url_common_downloads_png() {
        let (img, png) = sample_png();
        let base = serve_once("200 OK", png).await;

        let fetched = fetcher(Access::Url, Format::Common)
            .fetch(&format!("{}/alice.png", base))
            .await;

        assert_eq!(fetched, Some(img));
    }

    #[tokio::test]
    async fn url_byte_downloads_raw_stream() {
        let mut data = vec![0u8; RAW_LEN];
        data[..4].copy_from_slice(&[1, 2, 3, 4]);
        let base = serve_once("200 OK", data).await;

        let img = fetcher(Access::Url, Format::Byte)
            .fetch(&format!("{}/alice", base))
            .await
            .unwrap();

        assert_eq!(img.rgba(0, 0), [1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn url_short_raw_stream_is_none() {
        let base = serve_once("200 OK", vec![7u8; 100]).await;

        let fetched = fetcher(Access::Url, Format::Byte)
            .fetch(&format!("{}/alice", base))
            .await;

        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn url_oversized_raw_stream_is_none() {
        let base = serve_once("200 OK", vec![0u8; RAW_LEN * 8]).await;

        let fetched = fetcher(Access::Url, Format::Byte)
            .fetch(&format!("{}/alice", base))
            .await;

        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn url_unsized_raw_stream_is_capped() {
        let fetcher = fetcher(Access::Url, Format::Byte);

        let base = serve_once_unsized(vec![0u8; RAW_LEN * 8]).await;
        match fetcher.download(&format!("{}/alice", base)).await {
            Err(FetchError::RawLength { expected, actual }) => {
                assert_eq!(expected, RAW_LEN);
                assert!(actual > RAW_LEN);
            }
            other => panic!("expected length error, got {:?}", other.map(|d| d.len())),
        }

        let mut data = vec![0u8; RAW_LEN];
        data[RAW_LEN - 4..].copy_from_slice(&[9, 8, 7, 6]);
        let base = serve_once_unsized(data).await;
        let img = fetcher.fetch(&format!("{}/bob", base)).await.unwrap();
        assert_eq!(img.rgba(63, 63), [9, 8, 7, 6]);
    }

    #[tokio::test]
    async fn file_byte_reads_at_most_one_extra_byte() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.bin");
        std::fs::write(&path, vec![0u8; RAW_LEN * 8]).unwrap();
        let fetcher = fetcher(Access::File, Format::Byte);

        let data = fetcher.read_file(path.to_str().unwrap()).await.unwrap();
        assert_eq!(data.len(), RAW_LEN + 1);
        assert!(fetcher.fetch(path.to_str().unwrap()).await.is_none());
    }

    #[tokio::test]
    async fn url_error_status_is_none() {
        let (_, png) = sample_png();
        let base = serve_once("404 Not Found", png).await;

        let fetched = fetcher(Access::Url, Format::Common)
            .fetch(&format!("{}/ghost.png", base))
            .await;

        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn refused_connection_is_none() {
        // Bind then drop to get a port with nothing listening on it.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let fetched = fetcher(Access::Url, Format::Common)
            .fetch(&format!("http://{}/alice.png", addr))
            .await;

        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn malformed_url_is_none() {
        let fetched = fetcher(Access::Url, Format::Common)
            .fetch("not a url/{username}")
            .await;

        assert!(fetched.is_none());
    }
}
