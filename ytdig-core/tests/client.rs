use serde_json::json;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};
use ytdig_core::{CatalogError, Session, SessionUser, YoutubeClient};

fn session() -> Session {
    Session::new(
        SessionUser {
            id: "user-1".into(),
            name: Some("Test User".into()),
            email: None,
            image: None,
        },
        "test-token",
    )
}

#[derive(Debug, serde::Deserialize)]
struct Entry {
    n: u32,
}

fn page(items: &[u32], next: Option<&str>) -> serde_json::Value {
    let items: Vec<_> = items.iter().map(|n| json!({ "n": n })).collect();
    match next {
        Some(token) => json!({ "items": items, "nextPageToken": token }),
        None => json!({ "items": items }),
    }
}

#[tokio::test]
async fn resolve_channel_id_sends_bearer_token_and_caches_result() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/youtube/v3/channels"))
        .and(query_param("part", "id"))
        .and(query_param("mine", "true"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "id": "UCself" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = YoutubeClient::with_base_url(&server.uri()).unwrap();
    let mut session = session();

    assert_eq!(client.resolve_channel_id(&mut session).await.unwrap(), "UCself");
    assert_eq!(session.channel_id.as_deref(), Some("UCself"));
    assert_eq!(client.resolve_channel_id(&mut session).await.unwrap(), "UCself");
}

#[tokio::test]
async fn resolve_channel_id_without_items_fails() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/youtube/v3/channels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .mount(&server)
        .await;

    let client = YoutubeClient::with_base_url(&server.uri()).unwrap();
    let err = client.resolve_channel_id(&mut session()).await.unwrap_err();

    assert!(matches!(err, CatalogError::MissingItem(_)));
}

#[tokio::test]
async fn list_paginated_concatenates_pages_in_order() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&[1, 2], Some("p1"))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("pageToken", "p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&[3], Some("p2"))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&[4, 5], Some(""))))
        .mount(&server)
        .await;

    let client = YoutubeClient::with_base_url(&server.uri()).unwrap();
    let url = url::Url::parse(&format!("{}/list", server.uri())).unwrap();
    let entries: Vec<Entry> = client.list_paginated(&url, "test-token").await.unwrap();

    let numbers: Vec<u32> = entries.iter().map(|e| e.n).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn list_paginated_rejects_repeated_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&[1], Some("p1"))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("pageToken", "p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&[2], Some("p1"))))
        .expect(1)
        .mount(&server)
        .await;

    let client = YoutubeClient::with_base_url(&server.uri()).unwrap();
    let url = url::Url::parse(&format!("{}/list", server.uri())).unwrap();
    let err = client
        .list_paginated::<Entry>(&url, "test-token")
        .await
        .unwrap_err();

    assert!(matches!(err, CatalogError::Protocol(_)));
}

#[tokio::test]
async fn list_paginated_stops_at_page_limit() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&[1], Some("p1"))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("pageToken", "p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&[2], Some("p2"))))
        .mount(&server)
        .await;

    let client = YoutubeClient::with_base_url(&server.uri())
        .unwrap()
        .with_max_pages(2);
    let url = url::Url::parse(&format!("{}/list", server.uri())).unwrap();
    let err = client
        .list_paginated::<Entry>(&url, "test-token")
        .await
        .unwrap_err();

    assert!(matches!(err, CatalogError::Protocol(_)));
}

#[tokio::test]
async fn error_payload_becomes_upstream_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/youtube/v3/videos"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {
                "code": 403,
                "message": "The request cannot be completed because you have exceeded your quota.",
                "errors": [{ "reason": "quotaExceeded" }]
            }
        })))
        .mount(&server)
        .await;

    let client = YoutubeClient::with_base_url(&server.uri()).unwrap();
    let err = client.video_details(&session(), "v1").await.unwrap_err();

    match err {
        CatalogError::Upstream { code, message } => {
            assert_eq!(code, 403);
            assert!(message.contains("quota"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn error_payload_with_success_status_is_still_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/youtube/v3/channels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": { "code": 401, "message": "Invalid Credentials" }
        })))
        .mount(&server)
        .await;

    let client = YoutubeClient::with_base_url(&server.uri()).unwrap();
    let err = client.channel_details(&session(), "UC1").await.unwrap_err();

    assert!(matches!(err, CatalogError::Upstream { code: 401, .. }));
}

#[tokio::test]
async fn unreachable_catalog_is_transport_error() {
    let client = YoutubeClient::with_base_url("http://127.0.0.1:9").unwrap();
    let err = client.channel_details(&session(), "UC1").await.unwrap_err();

    assert!(matches!(err, CatalogError::Transport(_)));
    assert!(!err.is_item_scoped());
}

#[tokio::test]
async fn list_subscriptions_normalizes_snippets() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/youtube/v3/subscriptions"))
        .and(query_param("channelId", "UCself"))
        .and(query_param("maxResults", "2"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nextPageToken": "next",
            "items": [{
                "snippet": {
                    "title": "Rust Weekly",
                    "description": "news",
                    "resourceId": { "kind": "youtube#channel", "channelId": "UCrust" },
                    "thumbnails": { "default": { "url": "https://img.example/r.jpg" } }
                }
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/youtube/v3/subscriptions"))
        .and(query_param("pageToken", "next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "snippet": {
                    "title": "Ferris Cooks",
                    "resourceId": { "channelId": "UCcrab" }
                }
            }]
        })))
        .mount(&server)
        .await;

    let client = YoutubeClient::with_base_url(&server.uri())
        .unwrap()
        .with_page_size(2);
    let mut session = session().with_channel_id("UCself");
    let channels = client.list_subscriptions(&mut session).await.unwrap();

    assert_eq!(channels.len(), 2);
    assert_eq!(channels[0].id, "UCrust");
    assert_eq!(channels[0].title.as_deref(), Some("Rust Weekly"));
    let thumbnails = channels[0].thumbnails.as_ref().unwrap();
    assert_eq!(
        thumbnails.default.as_ref().unwrap().url,
        "https://img.example/r.jpg"
    );
    assert_eq!(channels[1].id, "UCcrab");
    assert_eq!(channels[1].description, None);
    assert_eq!(channels[1].subscriber_count, None);
}

#[tokio::test]
async fn channel_details_reads_statistics_and_upload_playlist() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/youtube/v3/channels"))
        .and(query_param("id", "UCrust"))
        .and(query_param("part", "snippet,contentDetails,statistics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "id": "UCrust",
                "snippet": { "title": "ignored", "customUrl": "@rustweekly" },
                "statistics": {
                    "viewCount": "5000",
                    "subscriberCount": "120",
                    "videoCount": "42"
                },
                "contentDetails": { "relatedPlaylists": { "uploads": "UUrust" } }
            }]
        })))
        .mount(&server)
        .await;

    let client = YoutubeClient::with_base_url(&server.uri()).unwrap();
    let channel = client.channel_details(&session(), "UCrust").await.unwrap();

    assert_eq!(channel.subscriber_count, Some(120));
    assert_eq!(channel.video_count, Some(42));
    assert_eq!(channel.view_count, Some(5000));
    assert_eq!(channel.upload_playlist_id.as_deref(), Some("UUrust"));
    assert_eq!(channel.custom_url.as_deref(), Some("@rustweekly"));
    assert_eq!(channel.title, None);
}

#[tokio::test]
async fn playlist_videos_and_details_normalize() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/youtube/v3/playlistItems"))
        .and(query_param("playlistId", "UUrust"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "snippet": {
                    "title": "Episode 1",
                    "description": "first",
                    "publishedAt": "2024-01-01T00:00:00Z",
                    "position": 0,
                    "thumbnails": { "high": { "url": "https://img.example/1.jpg", "width": 480, "height": 360 } }
                },
                "contentDetails": { "videoId": "vid1" },
                "status": { "privacyStatus": "public" }
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/youtube/v3/videos"))
        .and(query_param("id", "vid1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "id": "vid1",
                "snippet": { "tags": ["rust", "news"], "categoryId": "28" },
                "contentDetails": { "duration": "PT12M3S" },
                "statistics": { "viewCount": "900", "likeCount": "80", "commentCount": "12" },
                "topicDetails": { "topicCategories": ["https://en.wikipedia.org/wiki/Technology"] }
            }]
        })))
        .mount(&server)
        .await;

    let client = YoutubeClient::with_base_url(&server.uri()).unwrap();
    let session = session();
    let videos = client
        .list_playlist_videos(&session, "UUrust")
        .await
        .unwrap();

    assert_eq!(videos.len(), 1);
    assert_eq!(videos[0].id, "vid1");
    assert_eq!(videos[0].position, Some(0));
    assert_eq!(videos[0].privacy_status.as_deref(), Some("public"));
    assert_eq!(
        videos[0].thumbnails.as_ref().unwrap().high.as_ref().unwrap().width,
        Some(480)
    );

    let detail = client.video_details(&session, "vid1").await.unwrap();
    assert_eq!(detail.duration.as_deref(), Some("PT12M3S"));
    assert_eq!(detail.like_count, Some(80));
    assert_eq!(detail.tags.as_ref().map(Vec::len), Some(2));
    assert_eq!(detail.topics.as_ref().map(Vec::len), Some(1));
    assert_eq!(detail.title, None);
}
