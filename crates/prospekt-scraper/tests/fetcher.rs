//! Integration tests for `FlyerFetcher` against a local `wiremock` upstream.

use std::io::Cursor;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use prospekt_core::{FlyerReference, ListingFormat, PageLocator};
use prospekt_scraper::{FetchFailureReason, FlyerFetcher, HttpClient};

fn fetcher(max_retries: u32) -> FlyerFetcher {
    let client =
        HttpClient::new(5, "prospekt-test/0.1", max_retries, 0).expect("failed to build client");
    FlyerFetcher::new(client, 2)
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .expect("encode png");
    buf
}

fn png_response(width: u32, height: u32) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "image/png")
        .set_body_bytes(png_bytes(width, height))
}

fn image_reference(server: &MockServer, pages: usize) -> FlyerReference {
    FlyerReference {
        retailer_key: "lidl".to_string(),
        format: ListingFormat::Lidl,
        ordinal: 1,
        title: "Aktionsprospekt".to_string(),
        source_url: format!("{}/l/prospekte/a", server.uri()),
        validity: None,
        page_locators: (1..=pages)
            .map(|n| PageLocator::Image {
                url: format!("{}/media/p{n}.png", server.uri()),
            })
            .collect(),
    }
}

#[tokio::test]
async fn failed_page_is_isolated_and_order_is_preserved() {
    let server = MockServer::start().await;
    for n in [1, 2, 4] {
        Mock::given(method("GET"))
            .and(path(format!("/media/p{n}.png")))
            .respond_with(png_response(40 + n, 60))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/media/p3.png"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1) // permanent, never retried
        .mount(&server)
        .await;

    let results = fetcher(3).fetch(&image_reference(&server, 4)).await;

    assert_eq!(results.len(), 4);
    let page_one = results[0].as_ref().expect("page 1 fetched");
    assert_eq!(page_one.page_number, 1);
    assert_eq!((page_one.width, page_one.height), (41, 60));
    assert_eq!(results[1].as_ref().expect("page 2 fetched").page_number, 2);
    let failure = results[2].as_ref().expect_err("page 3 fails");
    assert_eq!(failure.page_number, 3);
    assert_eq!(failure.reason, FetchFailureReason::NotFound);
    assert_eq!(results[3].as_ref().expect("page 4 fetched").width, 44);
}

#[tokio::test]
async fn non_image_content_type_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/p1.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string("<html>consent wall</html>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let results = fetcher(3).fetch(&image_reference(&server, 1)).await;
    let failure = results[0].as_ref().expect_err("page fails");
    assert_eq!(failure.reason, FetchFailureReason::DecodeError);
}

#[tokio::test]
async fn transient_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/p1.png"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/media/p1.png"))
        .respond_with(png_response(32, 32))
        .expect(1)
        .mount(&server)
        .await;

    let results = fetcher(2).fetch(&image_reference(&server, 1)).await;
    assert!(results[0].is_ok(), "expected Ok, got: {:?}", results[0]);
}

#[tokio::test]
async fn server_error_after_exhausted_retries_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/p1.png"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let results = fetcher(1).fetch(&image_reference(&server, 1)).await;
    let failure = results[0].as_ref().expect_err("page fails");
    assert_eq!(failure.reason, FetchFailureReason::Unavailable);
}

#[tokio::test]
async fn corrupt_image_bytes_are_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/p1.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(b"not really a png".to_vec()),
        )
        .mount(&server)
        .await;

    let results = fetcher(0).fetch(&image_reference(&server, 1)).await;
    let failure = results[0].as_ref().expect_err("page fails");
    assert_eq!(failure.reason, FetchFailureReason::DecodeError);
}

#[tokio::test]
async fn viewer_page_image_is_extracted_then_downloaded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lidl/prospekt/woche-ab-06-01-2025-bis-11-01-2025/seite-2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<img src="/img/banner.jpg" width="728" height="90">
               <img data-src="/prospekt/lidl/p2.png" alt="Seite 2">"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/prospekt/lidl/p2.png"))
        .respond_with(png_response(30, 50))
        .mount(&server)
        .await;

    let locator = PageLocator::Viewer {
        url: format!(
            "{}/lidl/prospekt/woche-ab-06-01-2025-bis-11-01-2025/seite-2",
            server.uri()
        ),
    };
    let page = fetcher(0)
        .fetch_page(ListingFormat::Angebote, 2, &locator)
        .await
        .expect("viewer page fetched");

    assert_eq!(page.page_number, 2);
    assert_eq!(page.source_url, format!("{}/prospekt/lidl/p2.png", server.uri()));
    assert_eq!((page.width, page.height), (30, 50));
}
