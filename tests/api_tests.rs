//! Registry protocol over a real socket

mod common;

use common::fixtures::{self, SAMPLE_ARMOR, SAMPLE_KEY_ID};
use common::TestServer;
use reqwest::StatusCode;
use tfregistry_core::Shasum;
use tfregistry_service::{PlatformRequest, ProviderDownload, ProviderVersionsResponse};

#[tokio::test]
async fn test_publish_upload_and_download_binary() {
    let server = TestServer::spawn("memory").await;
    let registry = &server.registry;
    let ctx = &registry.ctx;
    let client = server.client();

    let binary = b"pretend this is a zip".to_vec();
    let shasum = Shasum::compute(&binary);

    registry
        .services
        .publish()
        .create_provider(ctx, &fixtures::widget())
        .await
        .unwrap();
    registry
        .services
        .gpg()
        .add_key(ctx, "acme", SAMPLE_ARMOR)
        .await
        .unwrap();
    registry
        .services
        .publish()
        .create_version(ctx, &fixtures::new_version("1.0.0"))
        .await
        .unwrap();
    let upload = registry
        .services
        .publish()
        .create_platform(
            ctx,
            PlatformRequest {
                shasum: shasum.clone(),
                ..fixtures::platform_request("1.0.0", "linux", "amd64", "00")
            },
        )
        .await
        .unwrap();

    let response = client
        .put(&upload.upload_url)
        .body(binary.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let download: ProviderDownload = client
        .get(server.url("/v1/providers/org1/acme/widget/1.0.0/download/linux/amd64"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(download.shasum, shasum.as_str());
    assert_eq!(download.signing_keys.gpg_public_keys[0].key_id, SAMPLE_KEY_ID);
    assert!(download.download_url.starts_with(&server.address));

    let fetched = client
        .get(&download.download_url)
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(fetched.as_ref(), binary.as_slice());
    assert_eq!(Shasum::compute(&fetched), shasum);
}

#[tokio::test]
async fn test_version_listing_and_unknown_platform() {
    let server = TestServer::spawn("document-memory").await;
    let registry = &server.registry;
    let ctx = &registry.ctx;
    let client = server.client();

    registry
        .services
        .publish()
        .create_provider(ctx, &fixtures::widget())
        .await
        .unwrap();
    registry
        .services
        .gpg()
        .add_key(ctx, "acme", SAMPLE_ARMOR)
        .await
        .unwrap();
    registry
        .services
        .publish()
        .create_version(ctx, &fixtures::new_version("1.0.0"))
        .await
        .unwrap();
    registry
        .services
        .publish()
        .create_platform(ctx, fixtures::platform_request("1.0.0", "linux", "amd64", "abc123"))
        .await
        .unwrap();

    let listing: ProviderVersionsResponse = client
        .get(server.url("/v1/providers/org1/acme/widget/versions"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing.versions[0].version, "1.0.0");
    assert_eq!(listing.versions[0].platforms[0].arch, "amd64");

    let response = client
        .get(server.url("/v1/providers/org1/acme/widget/1.0.0/download/linux/arm64"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_module_download_answers_with_header() {
    let server = TestServer::spawn("sql").await;
    let registry = &server.registry;
    let ctx = &registry.ctx;
    let module = fixtures::vpc();

    registry
        .services
        .publish()
        .create_module(ctx, &module)
        .await
        .unwrap();
    registry
        .services
        .publish()
        .create_module_version(ctx, &module.version("0.3.1").unwrap(), "v0.3.1")
        .await
        .unwrap();

    let response = server
        .client()
        .get(server.url("/v1/modules/org1/acme/vpc/aws/0.3.1/download"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let location = response.headers()["x-terraform-get"].to_str().unwrap();
    assert!(location.starts_with(&format!("{}/asset/download/", server.address)));
    assert!(location.ends_with("/vpc-aws-0.3.1.tar.gz"));

    let listing: serde_json::Value = server
        .client()
        .get(server.url("/v1/modules/org1/acme/vpc/aws/versions"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["modules"][0]["versions"][0]["version"], "0.3.1");
}

#[tokio::test]
async fn test_health_names_engine() {
    let server = TestServer::spawn("sql").await;

    let response = server.client().get(server.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["checks"]["backend"]["message"], "sql");
}
