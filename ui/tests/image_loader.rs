use api_client::{MediaItem, MediaType};
use httpmock::prelude::*;
use std::time::Duration;
use tempfile::tempdir;
use ui::{ImageLoader, ImageLoaderError};

fn image_at(id: &str, url: String) -> MediaItem {
    MediaItem {
        id: id.into(),
        media_type: MediaType::Image,
        media_url: Some(url),
        thumbnail_url: None,
        caption: None,
        permalink: None,
        timestamp: None,
        username: None,
    }
}

fn short_timeout(ms: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(ms))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_thumbnail_cached() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/img.jpg");
        then.status(200).body("thumb");
    });

    let dir = tempdir().unwrap();
    let loader = ImageLoader::new(dir.path().to_path_buf(), 4);
    let item = image_at("1", server.url("/img.jpg"));

    loader.load_thumbnail(&item).await.unwrap();
    assert!(dir.path().join("thumbnails").join("1.jpg").exists());
    assert!(loader.cached_thumbnail("1").is_some());
    mock.assert_hits(1);

    // Second call should use cache
    loader.load_thumbnail(&item).await.unwrap();
    mock.assert_hits(1);
}

#[tokio::test]
async fn test_thumbnail_not_found() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/missing.jpg");
        then.status(404);
    });

    let dir = tempdir().unwrap();
    let loader = ImageLoader::with_client(dir.path().to_path_buf(), short_timeout(1000));
    let item = image_at("1", server.url("/missing.jpg"));

    let err = loader.load_thumbnail(&item).await.err().unwrap();
    assert_eq!(err, ImageLoaderError::NotFound);
    assert!(loader.cached_thumbnail("1").is_none());
}

#[tokio::test]
async fn test_thumbnail_without_url() {
    let dir = tempdir().unwrap();
    let loader = ImageLoader::new(dir.path().to_path_buf(), 1);
    let mut item = image_at("1", String::new());
    item.media_url = None;

    let err = loader.load_thumbnail(&item).await.err().unwrap();
    assert_eq!(err, ImageLoaderError::NotFound);
}

#[tokio::test]
async fn test_thumbnail_timeout() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/slow.jpg");
        then.status(200).body("img").delay(Duration::from_millis(500));
    });

    let dir = tempdir().unwrap();
    let loader = ImageLoader::with_client(dir.path().to_path_buf(), short_timeout(50));
    let item = image_at("1", server.url("/slow.jpg"));

    let err = loader.load_thumbnail(&item).await.err().unwrap();
    assert_eq!(err, ImageLoaderError::Timeout);
}

#[tokio::test]
async fn test_network_error() {
    let dir = tempdir().unwrap();
    let loader = ImageLoader::with_client(dir.path().to_path_buf(), short_timeout(100));

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let item = image_at("1", format!("http://{}/img.jpg", addr));
    match loader.load_thumbnail(&item).await {
        Err(ImageLoaderError::Network(_)) => (),
        other => panic!("expected network error, got {:?}", other.err()),
    }
}
