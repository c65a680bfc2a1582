use std::{future::Future, sync::Arc, time::Duration};

use chrono::Utc;
use clap::Parser;
use eyre::Result;
use once_cell::sync::Lazy;
use reqwest::{multipart, RequestBuilder};
use visuasort_api::{build_state, config::Config, serve, Server};
use visuasort_auth::{Identity, Role};
use visuasort_db::{
    CacheTtls, ImageId, ImageRecord, ImageRepository, MemoryCache, MemoryStore, MetadataStore,
    ReadThroughCache,
};
use visuasort_storage::AssetStore;
use wiremock::MockServer;

const JWT_SECRET: &str = "integration test secret";
pub const LOGIN_USER: &str = "dana";
pub const LOGIN_PASSWORD: &str = "correct horse battery staple";

/// Hashing is slow, so every test shares one hash.
static LOGIN_HASH: Lazy<String> = Lazy::new(|| {
    visuasort_auth::password::new_hash(LOGIN_PASSWORD).expect("hashing test password")
});

#[derive(Clone, Debug)]
pub struct TestClient {
    pub base: String,
    pub token: Option<String>,
    pub client: reqwest::Client,
}

impl TestClient {
    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base, path.trim_start_matches('/'));
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.request(reqwest::Method::GET, path)
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.request(reqwest::Method::POST, path)
    }

    pub fn put(&self, path: &str) -> RequestBuilder {
        self.request(reqwest::Method::PUT, path)
    }

    pub fn patch(&self, path: &str) -> RequestBuilder {
        self.request(reqwest::Method::PATCH, path)
    }

    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.request(reqwest::Method::DELETE, path)
    }

    fn with_token(&self, token: String) -> TestClient {
        TestClient {
            token: Some(token),
            ..self.clone()
        }
    }

    /// Upload `bytes` as `filename` with the given text fields.
    pub async fn upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        fields: &[(&str, &str)],
    ) -> Result<reqwest::Response> {
        let part = multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("image/jpeg")?;
        let form = fields
            .iter()
            .fold(multipart::Form::new().part("image", part), |form, (k, v)| {
                form.text(k.to_string(), v.to_string())
            });

        Ok(self.post("images/upload").multipart(form).send().await?)
    }
}

pub struct TestApp {
    /// A client without credentials.
    pub client: TestClient,
    pub alice: TestClient,
    pub bob: TestClient,
    pub admin: TestClient,
    /// The metadata store behind the server, for seeding and outages.
    pub store: Arc<MemoryStore>,
    /// The asset store behind the server, standing in for direct uploads.
    pub assets: Arc<dyn AssetStore>,
    /// Stands in for the tagging provider. Nothing is mounted by default, so
    /// tagging fails until a test mounts a response.
    pub tagger: MockServer,
    pub base_url: String,
}

async fn start_app() -> Result<TestApp> {
    Lazy::force(&visuasort_test::TRACING);

    let tagger = MockServer::start().await;
    let static_users = serde_json::json!([
        { "username": LOGIN_USER, "password_hash": LOGIN_HASH.as_str(), "role": "user" }
    ])
    .to_string();
    let huggingface_url = format!("{}/hf", tagger.uri());

    let config = Config::try_parse_from([
        "visuasort",
        "--host",
        "127.0.0.1",
        // Bind to random port
        "--port",
        "0",
        "--env",
        "development",
        "--storage-provider",
        "memory",
        "--cache",
        "memory",
        "--workers",
        "2",
        "--processing-profile",
        "light",
        "--jwt-secret",
        JWT_SECRET,
        "--static-users",
        &static_users,
        "--huggingface-key",
        "hf-test-key",
        "--huggingface-url",
        &huggingface_url,
    ])?;

    let mut state = build_state(&config).await?;
    let store = Arc::new(MemoryStore::new());
    state.repository = ImageRepository::new(
        store.clone(),
        Some(ReadThroughCache::new(
            Arc::new(MemoryCache::new()),
            CacheTtls::default(),
        )),
    );

    let creds = state
        .authenticator
        .static_credentials()
        .ok_or_else(|| eyre::eyre!("static credentials not configured"))?;
    let token = |subject: &str, role: Role| -> Result<String> {
        Ok(creds.issue(&Identity::new(subject, role))?.token)
    };
    let alice = token("alice", Role::User)?;
    let bob = token("bob", Role::User)?;
    let admin = token("root", Role::Admin)?;

    let assets = state.assets.clone();
    let Server { server, host, port } = serve(&config, Arc::new(state))?;
    tokio::task::spawn(server);

    let base_url = format!("http://{host}:{port}/api");
    let client = TestClient {
        base: base_url.clone(),
        token: None,
        client: reqwest::ClientBuilder::new()
            .timeout(Duration::from_secs(60))
            .build()?,
    };

    Ok(TestApp {
        alice: client.with_token(alice),
        bob: client.with_token(bob),
        admin: client.with_token(admin),
        client,
        store,
        assets,
        tagger,
        base_url,
    })
}

pub async fn run_app_test<F, R>(f: F)
where
    F: FnOnce(TestApp) -> R,
    R: Future<Output = Result<()>>,
{
    let app = start_app().await.expect("Starting app");
    f(app).await.unwrap();
}

impl TestApp {
    /// Insert a record straight into the store, bypassing the pipeline.
    pub async fn seed(&self, owner: &str, filename: &str, size: u64, tags: &[&str]) -> ImageRecord {
        let id = ImageId::new();
        let record = ImageRecord {
            id,
            owner: owner.to_string(),
            filename: filename.to_string(),
            display_name: filename.to_string(),
            original_key: format!("{owner}/{id}-original.jpg"),
            enhanced_key: format!("{owner}/{id}-enhanced.jpg"),
            thumbnail_key: format!("{owner}/{id}-thumbnail.jpg"),
            web_key: format!("{owner}/{id}-web.webp"),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            size,
            upload_date: Utc::now(),
            has_enhancements: false,
        };

        self.store.insert(&record).await.expect("seeding record");
        record
    }
}

pub async fn json(response: reqwest::Response) -> Result<serde_json::Value> {
    Ok(response.json().await?)
}
