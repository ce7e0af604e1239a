//! Unit tests for request shaping and response decoding.

use rstest::rstest;
use serde_json::json;

use super::*;

#[rstest]
#[case("https://api.digitalocean.com/v2", "droplets/7")]
#[case("https://api.digitalocean.com/v2/", "/droplets/7")]
fn urls_join_without_doubled_slashes(#[case] base: &str, #[case] path: &str) {
    let client = DigitalOceanClient::new(base, "token");
    assert_eq!(client.url(path), "https://api.digitalocean.com/v2/droplets/7");
}

#[test]
fn debug_output_omits_token() {
    let client = DigitalOceanClient::new("https://api.example", "secret-token");
    assert!(!format!("{client:?}").contains("secret-token"));
}

#[rstest]
#[case(None, None)]
#[case(Some(ImageKind::User), Some(("private", "true")))]
#[case(Some(ImageKind::Application), Some(("type", "application")))]
#[case(Some(ImageKind::Distribution), Some(("type", "distribution")))]
fn image_kinds_map_to_list_filters(
    #[case] kind: Option<ImageKind>,
    #[case] expected: Option<(&str, &str)>,
) {
    assert_eq!(kind_filter(kind), expected);
}

#[test]
fn page_query_requests_full_pages() {
    let query = page_query(3, Some(("type", "application")));
    assert_eq!(
        query,
        [
            ("per_page", String::from("200")),
            ("page", String::from("3")),
            ("type", String::from("application")),
        ]
    );
}

#[test]
fn image_pages_report_following_page() {
    let body = json!({
        "images": [{"id": 5, "name": "web", "regions": ["nyc3"], "created_at": "2024-01-01T00:00:00Z"}],
        "links": {"pages": {"next": "https://api.digitalocean.com/v2/images?page=2"}}
    });
    let page: ImagePage = decode("list images", body.to_string().as_bytes()).expect("page decodes");
    assert!(page.links.has_next());
    assert_eq!(page.images.first().map(|image| image.id), Some(5));
    assert!(page.is_last(), "a short page ends the listing");
}

#[test]
fn full_page_with_next_link_continues() {
    let images: Vec<_> = (0..PAGE_SIZE)
        .map(|id| json!({"id": id, "name": format!("image-{id}")}))
        .collect();
    let body = json!({
        "images": images,
        "links": {"pages": {"next": "https://api.digitalocean.com/v2/images?page=2"}}
    });
    let page: ImagePage = decode("list images", body.to_string().as_bytes()).expect("page decodes");
    assert_eq!(page.images.len(), PAGE_SIZE);
    assert!(!page.is_last());
}

#[test]
fn snapshot_listing_decodes_as_final_page() {
    let body = json!({"snapshots": [{"id": 9, "name": "golden"}], "links": {}});
    let page: ImagePage =
        decode("list droplet snapshots", body.to_string().as_bytes()).expect("page decodes");
    assert!(!page.links.has_next());
    assert!(page.is_last());
    assert_eq!(page.images.len(), 1);
}

#[test]
fn undecodable_body_is_a_decode_error() {
    let err = decode::<ImagePage>("list images", b"<html>").expect_err("html is not json");
    assert!(matches!(err, CloudError::Decode { ref operation, .. } if operation == "list images"));
}

#[rstest]
#[case(br#"{"id":"not_found","message":"The resource was not found."}"#, "The resource was not found.")]
#[case(b"  upstream timeout \n", "upstream timeout")]
fn api_errors_prefer_provider_message(#[case] body: &[u8], #[case] expected: &str) {
    assert_eq!(api_message(body), expected);
}

#[test]
fn action_bodies_skip_unused_fields() {
    let transfer = ActionRequest {
        kind: "transfer",
        name: None,
        region: Some("ams3"),
    };
    assert_eq!(
        serde_json::to_value(&transfer).expect("serialises"),
        json!({"type": "transfer", "region": "ams3"})
    );
}

#[test]
fn tag_request_names_image_resource() {
    assert_eq!(
        serde_json::to_value(tag_request(42)).expect("serialises"),
        json!({"resources": [{"resource_id": "42", "resource_type": "image"}]})
    );
}
