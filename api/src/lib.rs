pub mod cmd;
pub mod config;
pub mod error;
pub mod jobs;
pub mod obfuscate_errors;
pub mod panic_handler;
pub mod routes;
pub mod shared_state;
pub mod tagging;
pub mod tracing_config;
pub mod worker_pool;

pub use error::{Error, Result};

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use axum::{extract::DefaultBodyLimit, routing::IntoMakeService, Router};
use eyre::eyre;
use hyper::server::conn::AddrIncoming;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::{event, Level};
use visuasort_auth::{AuthenticationLayer, Authenticator, ManagedIdentity, StaticCredentials};
use visuasort_convert::PipelineConfig;
use visuasort_db::{
    CacheBackend, CacheTtls, ImageRepository, MemoryCache, MemoryStore, MetadataStore, PgStore,
    ReadThroughCache, RedisCache,
};
use visuasort_storage::{AssetStore, ProviderConfig, ProviderKind, S3ProviderConfig};

use crate::{
    config::{CacheKind, Config},
    obfuscate_errors::ObfuscateErrorLayer,
    shared_state::{AppState, InnerState},
    tagging::{HuggingFaceTagger, ImaggaTagger, Tagger, TaggingService},
    worker_pool::WorkerPool,
};

/// Room for multipart framing and the option fields on top of the image itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub struct Server {
    pub host: String,
    pub port: u16,
    pub server: axum::Server<AddrIncoming, IntoMakeService<Router>>,
}

impl Server {
    /// Serve until the process receives Ctrl-C.
    pub async fn run(self) -> Result<()> {
        self.server
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    event!(Level::ERROR, error = %e, "failed to listen for shutdown signal");
                    std::future::pending::<()>().await;
                }
                event!(Level::INFO, "shutting down");
            })
            .await?;
        Ok(())
    }
}

async fn metadata_store(config: &Config) -> Result<Arc<dyn MetadataStore>, eyre::Report> {
    match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.db_max_connections)?;
            store.run_migrations().await?;
            Ok(Arc::new(store))
        }
        None => {
            event!(Level::WARN, "no database configured, records are kept in memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn cache_backend(config: &Config) -> Result<Option<Arc<dyn CacheBackend>>, eyre::Report> {
    let backend: Arc<dyn CacheBackend> = match config.cache {
        CacheKind::None => return Ok(None),
        CacheKind::Memory => Arc::new(MemoryCache::new()),
        CacheKind::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| eyre!("--redis-url is required for the redis cache"))?;
            Arc::new(RedisCache::connect(url).await?)
        }
    };

    Ok(Some(backend))
}

fn provider_config(config: &Config) -> Result<ProviderConfig, eyre::Report> {
    Ok(match config.storage_provider {
        ProviderKind::Memory => ProviderConfig::Memory,
        ProviderKind::Local => ProviderConfig::Local {
            base: PathBuf::from(&config.storage_base),
        },
        ProviderKind::S3 => ProviderConfig::S3 {
            config: S3ProviderConfig {
                endpoint: config.s3_endpoint.as_deref().map(str::parse).transpose()?,
                region: config.s3_region.clone(),
                access_key_id: config.s3_access_key_id.clone(),
                secret_key: config.s3_secret_key.clone(),
                virtual_host_style: None,
            },
            base_location: config.storage_base.clone(),
        },
    })
}

pub fn authenticator(config: &Config) -> Result<Authenticator, eyre::Report> {
    let static_credential = match &config.jwt_secret {
        Some(secret) => {
            let users = match &config.static_users {
                Some(json) => StaticCredentials::users_from_json(json)?,
                None => Vec::new(),
            };
            Some(StaticCredentials::new(secret.as_bytes(), users)?)
        }
        None => None,
    };

    let managed_identity = match &config.managed_identity_jwks {
        Some(path) => Some(ManagedIdentity::from_jwks_file(
            path,
            config.managed_identity_issuer.clone(),
            config.managed_identity_audience.clone(),
        )?),
        None => None,
    };

    match (static_credential, managed_identity) {
        (Some(static_credential), Some(managed_identity)) => Ok(Authenticator::Hybrid {
            static_credential,
            managed_identity,
        }),
        (Some(creds), None) => Ok(Authenticator::StaticCredential(creds)),
        (None, Some(provider)) => Ok(Authenticator::ManagedIdentity(provider)),
        (None, None) => Err(eyre!(
            "No authentication configured; set --jwt-secret or --managed-identity-jwks"
        )),
    }
}

fn tagging_service(config: &Config, cache: Option<Arc<dyn CacheBackend>>) -> TaggingService {
    let mut providers: Vec<Box<dyn Tagger>> = Vec::new();
    if let (Some(key), Some(secret)) = (&config.imagga_key, &config.imagga_secret) {
        providers.push(Box::new(ImaggaTagger::new(
            config.imagga_url.clone(),
            key.clone(),
            secret.clone(),
        )));
    }
    if let Some(key) = &config.huggingface_key {
        providers.push(Box::new(HuggingFaceTagger::new(
            config.huggingface_url.clone(),
            key.clone(),
        )));
    }

    let service = TaggingService::new(providers, cache);
    event!(Level::INFO, providers = ?service.providers().collect::<Vec<_>>(), "tagging configured");
    service
}

/// Connect to the stores and assemble the shared state from `config`.
pub async fn build_state(config: &Config) -> Result<InnerState, eyre::Report> {
    let store = metadata_store(config).await?;
    let cache = cache_backend(config).await?;
    let repository = ImageRepository::new(
        store,
        cache
            .clone()
            .map(|backend| ReadThroughCache::new(backend, CacheTtls::default())),
    );

    let assets: Arc<dyn AssetStore> =
        Arc::new(provider_config(config)?.create_operator().await?);

    let workers = WorkerPool::new(
        config.workers(),
        config.processing_timeout_secs.map(Duration::from_secs),
    );
    event!(Level::INFO, workers = workers.size(), "image worker pool ready");

    Ok(InnerState {
        production: config.production(),
        repository,
        assets,
        authenticator: Arc::new(authenticator(config)?),
        workers,
        tagger: Arc::new(tagging_service(config, cache)),
        pipeline: PipelineConfig {
            profile: config.processing_profile,
            watermark_text: config.watermark_text.clone(),
        },
        strict_filters: config.strict_filters,
        max_upload_bytes: config.max_upload_bytes,
    })
}

/// Bind the listener and wrap the routes in the global middleware.
pub fn serve(config: &Config, state: AppState) -> Result<Server, eyre::Report> {
    let production = state.production;
    let authenticator = state.authenticator.clone();
    let body_limit = state.max_upload_bytes + MULTIPART_OVERHEAD;

    let app = routes::configure_routes()
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            // Global middlewares
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(move |err| {
                    panic_handler::handle_panic(production, err)
                }))
                .layer(ObfuscateErrorLayer::new(production))
                .compression()
                .decompression()
                .set_x_request_id(MakeRequestUuid)
                .propagate_x_request_id()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO)),
                )
                .layer(AuthenticationLayer::new(authenticator))
                .into_inner(),
        );

    let bind_ip: IpAddr = config.host.parse()?;
    let addr = SocketAddr::from((bind_ip, config.port));
    let builder = axum::Server::try_bind(&addr)?;
    let server = builder.serve(app.into_make_service());
    let port = server.local_addr().port();
    event!(Level::INFO, "Listening on {}:{}", config.host, port);

    Ok(Server {
        host: config.host.clone(),
        port,
        server,
    })
}

pub async fn create_server(config: Config) -> Result<Server, eyre::Report> {
    let state = build_state(&config).await?;
    serve(&config, Arc::new(state))
}
