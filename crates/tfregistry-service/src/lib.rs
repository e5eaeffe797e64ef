//! Service layer for the Terraform registry
//!
//! Sits between the HTTP surface and the storage engines. Services only see
//! the backend contract and the asset storage contract, never a concrete
//! engine.
//!
//! - **PublishService**: provider, version, platform and module publishing
//! - **GpgKeyService**: signing key registration
//! - **DiscoveryService**: version listings and download resolution
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tfregistry_service::ServiceRegistry;
//!
//! # async fn example(
//! #     backend: Arc<dyn tfregistry_db::Backend>,
//! #     storage: Arc<dyn tfregistry_storage::AssetBackend>,
//! # ) {
//! let services = ServiceRegistry::new(backend, storage);
//! let publish = services.publish();
//! # }
//! ```

pub mod discovery;
pub mod dto;
pub mod error;
pub mod gpg;
pub mod naming;
pub mod publish;

pub use dto::*;
pub use error::{ServiceError, ServiceResult};

pub use discovery::{DefaultDiscoveryService, DiscoveryService};
pub use gpg::{DefaultGpgKeyService, GpgKeyService};
pub use publish::{DefaultPublishService, PublishService};

use std::sync::Arc;
use tfregistry_db::Backend;
use tfregistry_storage::AssetBackend;

/// Service registry that holds all service instances
#[derive(Clone)]
pub struct ServiceRegistry {
    pub publish: Arc<dyn PublishService>,
    pub gpg: Arc<dyn GpgKeyService>,
    pub discovery: Arc<dyn DiscoveryService>,
}

impl ServiceRegistry {
    /// Create a registry with the default implementations over one backend and one asset store
    pub fn new(backend: Arc<dyn Backend>, storage: Arc<dyn AssetBackend>) -> Self {
        Self {
            publish: Arc::new(DefaultPublishService::new(backend.clone(), storage.clone())),
            gpg: Arc::new(DefaultGpgKeyService::new(backend.clone())),
            discovery: Arc::new(DefaultDiscoveryService::new(backend, storage)),
        }
    }

    /// Create a registry with custom implementations
    pub fn with_services(
        publish: Arc<dyn PublishService>,
        gpg: Arc<dyn GpgKeyService>,
        discovery: Arc<dyn DiscoveryService>,
    ) -> Self {
        Self {
            publish,
            gpg,
            discovery,
        }
    }

    pub fn publish(&self) -> &Arc<dyn PublishService> {
        &self.publish
    }

    pub fn gpg(&self) -> &Arc<dyn GpgKeyService> {
        &self.gpg
    }

    pub fn discovery(&self) -> &Arc<dyn DiscoveryService> {
        &self.discovery
    }
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tfregistry_core::{
        CreatePolicy, ErrorKind, ModuleKey, NewProviderVersion, Platform, ProviderKey,
        PublishState, RegistryTier, RequestContext, Shasum,
    };
    use tfregistry_db::{EngineLifecycle, KeyValueBackend};
    use tfregistry_storage::{AssetPath, AssetStorage, LocalAssetStorage, TokenSigner};

    const ARMOR: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----

mDMEatXVLhYJKwYBBAHaRw8BAQdAWzRx2HxTQUC3aEVHs/aB/a61uR8dUj8FevSQ
mJS2Any0HUFjbWUgVGVzdCA8dGVzdEBhY21lLmV4YW1wbGU+iJAEExYIADgWIQRu
XyXZ5TYcbxNdwkqQXA1tfQ5uHQUCatXVLgIbAwULCQgHAgYVCgkICwIEFgIDAQIe
AQIXgAAKCRCQXA1tfQ5uHU7zAQCz7s8p//EuB3NHIgZuKyJBjCu8/TjtX/wEtp+z
VPCkHQD7Bb1ERCWWhsjTwtiomHnwj2wlbEV1QE9hxP66aZS8/A4=
=Xal4
-----END PGP PUBLIC KEY BLOCK-----
";

    struct Harness {
        _dir: TempDir,
        ctx: RequestContext,
        local: Arc<LocalAssetStorage>,
        services: ServiceRegistry,
    }

    async fn harness() -> Harness {
        let ctx = RequestContext::new();
        let backend = Arc::new(KeyValueBackend::memory(CreatePolicy::CreateOrGet));
        backend.configure(&ctx).await.unwrap();

        let dir = TempDir::new().unwrap();
        let signer = Arc::new(TokenSigner::new(b"service-test-secret").unwrap());
        let local =
            Arc::new(LocalAssetStorage::new(dir.path(), "http://registry.test", signer).unwrap());
        local.configure(&ctx).await.unwrap();

        let services = ServiceRegistry::new(backend, local.clone());
        Harness {
            _dir: dir,
            ctx,
            local,
            services,
        }
    }

    fn provider_key() -> ProviderKey {
        ProviderKey::new("org1", RegistryTier::Private, "acme", "widget").unwrap()
    }

    fn token_of(url: &str, op: &str) -> String {
        let rest = url
            .split(&format!("/asset/{}/", op))
            .nth(1)
            .expect("transfer url");
        rest.split('/').next().unwrap().to_string()
    }

    async fn publish_widget(h: &Harness) -> String {
        let key = provider_key();
        h.services.publish().create_provider(&h.ctx, &key).await.unwrap();
        let gpg = h.services.gpg().add_key(&h.ctx, "acme", ARMOR).await.unwrap();

        let params =
            NewProviderVersion::new(key.version("1.0.0").unwrap(), vec!["5.0".into()], &gpg.key_id)
                .unwrap();
        h.services.publish().create_version(&h.ctx, &params).await.unwrap();

        h.services
            .publish()
            .create_platform(
                &h.ctx,
                PlatformRequest {
                    version: params.key.clone(),
                    platform: Platform::new("linux", "amd64").unwrap(),
                    filename: None,
                    shasum: Shasum::new("abc123").unwrap(),
                },
            )
            .await
            .unwrap();
        gpg.key_id
    }

    #[tokio::test]
    async fn test_resolve_download_binds_platform_file() {
        let h = harness().await;
        let key_id = publish_widget(&h).await;
        let version = provider_key().version("1.0.0").unwrap();

        let download = h
            .services
            .discovery()
            .resolve_provider_download(&h.ctx, &version, "linux", "amd64")
            .await
            .unwrap();

        assert_eq!(download.shasum, "abc123");
        assert_eq!(download.filename, "terraform-provider-widget_1.0.0_linux_amd64.zip");
        assert_eq!(download.signing_keys.gpg_public_keys[0].key_id, key_id);

        let grant = h
            .local
            .authorize_download(&token_of(&download.download_url, "download"))
            .unwrap();
        let expected = AssetPath::for_provider(&version, &download.filename).unwrap();
        assert_eq!(grant.path, expected);
    }

    #[tokio::test]
    async fn test_platform_filename_cannot_shadow_other_objects() {
        let h = harness().await;
        publish_widget(&h).await;
        let version = provider_key().version("1.0.0").unwrap();
        let request = |arch: &str, filename: &str| PlatformRequest {
            version: version.clone(),
            platform: Platform::new("darwin", arch).unwrap(),
            filename: Some(filename.to_string()),
            shasum: Shasum::new("def456").unwrap(),
        };

        for reserved in [
            "terraform-provider-widget_1.0.0_SHA256SUMS",
            "terraform-provider-widget_1.0.0_SHA256SUMS.sig",
        ] {
            let err = h
                .services
                .publish()
                .create_platform(&h.ctx, request("arm64", reserved))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }

        let err = h
            .services
            .publish()
            .create_platform(
                &h.ctx,
                request("arm64", "terraform-provider-widget_1.0.0_linux_amd64.zip"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let created = h
            .services
            .publish()
            .create_platform(&h.ctx, request("arm64", "widget-darwin.zip"))
            .await
            .unwrap();
        assert_eq!(created.platform.filename, "widget-darwin.zip");
    }

    #[tokio::test]
    async fn test_resolve_unknown_platform_is_not_found() {
        let h = harness().await;
        publish_widget(&h).await;
        let discovery = h.services.discovery();

        let version = provider_key().version("1.0.0").unwrap();
        let err = discovery
            .resolve_provider_download(&h.ctx, &version, "linux", "arm64")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("linux/arm64"));

        let missing = provider_key().version("9.9.9").unwrap();
        let err = discovery
            .resolve_provider_download(&h.ctx, &missing, "linux", "amd64")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_duplicate_platform_conflicts() {
        let h = harness().await;
        publish_widget(&h).await;

        let err = h
            .services
            .publish()
            .create_platform(
                &h.ctx,
                PlatformRequest {
                    version: provider_key().version("1.0.0").unwrap(),
                    platform: Platform::new("Linux", "AMD64").unwrap(),
                    filename: None,
                    shasum: Shasum::new("def456").unwrap(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_version_listing() {
        let h = harness().await;
        publish_widget(&h).await;

        let listing = h
            .services
            .discovery()
            .list_provider_versions(&h.ctx, &provider_key())
            .await
            .unwrap();
        assert_eq!(listing.versions.len(), 1);
        assert_eq!(listing.versions[0].version, "1.0.0");
        assert_eq!(listing.versions[0].platforms[0].os, "linux");
    }

    #[tokio::test]
    async fn test_version_state_follows_uploads() {
        let h = harness().await;
        publish_widget(&h).await;
        let version = provider_key().version("1.0.0").unwrap();
        let publish = h.services.publish();

        let state = publish.version_state(&h.ctx, &version).await.unwrap();
        assert_eq!(state, PublishState::PartiallyPublished);

        for file in [naming::shasums(&version), naming::shasums_signature(&version)] {
            let path = AssetPath::for_provider(&version, &file).unwrap();
            h.local.put_object(&h.ctx, &path, b"manifest").await.unwrap();
        }
        let binary = AssetPath::for_provider(
            &version,
            &naming::provider_binary(&version, &Platform::new("linux", "amd64").unwrap()),
        )
        .unwrap();
        h.local.put_object(&h.ctx, &binary, b"zip").await.unwrap();

        let state = publish.version_state(&h.ctx, &version).await.unwrap();
        assert_eq!(state, PublishState::Published);
    }

    #[tokio::test]
    async fn test_add_key_twice_is_deterministic() {
        let h = harness().await;
        let gpg = h.services.gpg();

        let first = gpg.add_key(&h.ctx, "acme", ARMOR).await.unwrap();
        let second = gpg.add_key(&h.ctx, "acme", ARMOR).await.unwrap();
        assert_eq!(first.key_id, second.key_id);
        assert_eq!(first.id, second.id);
        assert_eq!(gpg.list_keys(&h.ctx, "acme").await.unwrap().len(), 1);

        let err = gpg.add_key(&h.ctx, "acme", "not a key").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_version_requires_registered_key() {
        let h = harness().await;
        let key = provider_key();
        h.services.publish().create_provider(&h.ctx, &key).await.unwrap();

        let params = NewProviderVersion::new(
            key.version("1.0.0").unwrap(),
            vec!["5.0".into()],
            "905C0D6D7D0E6E1D",
        )
        .unwrap();
        let err = h
            .services
            .publish()
            .create_version(&h.ctx, &params)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_module_publish_and_download() {
        let h = harness().await;
        let module = ModuleKey::new("org1", RegistryTier::Private, "acme", "vpc", "aws").unwrap();
        let version = module.version("0.3.1").unwrap();

        h.services.publish().create_module(&h.ctx, &module).await.unwrap();
        let upload = h
            .services
            .publish()
            .create_module_version(&h.ctx, &version, "v0.3.1")
            .await
            .unwrap();
        assert_eq!(upload.version.filename, "vpc-aws-0.3.1.tar.gz");

        let grant = h
            .local
            .authorize_upload(&token_of(&upload.upload_url, "upload"))
            .unwrap();
        assert_eq!(grant.path.file_name(), "vpc-aws-0.3.1.tar.gz");

        let listing = h
            .services
            .discovery()
            .list_module_versions(&h.ctx, &module)
            .await
            .unwrap();
        assert_eq!(listing.modules[0].versions[0].version, "0.3.1");

        let download = h
            .services
            .discovery()
            .resolve_module_download(&h.ctx, &version)
            .await
            .unwrap();
        assert!(download.download_url.ends_with("/vpc-aws-0.3.1.tar.gz"));
    }
}
