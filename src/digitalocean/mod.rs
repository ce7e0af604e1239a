//! DigitalOcean API v2 implementation of [`CloudClient`].
//!
//! Requests go through one shared `reqwest` client with a bearer token. Error
//! bodies are reduced to the provider's `message` field when present.

use std::sync::LazyLock;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cloud::{
    Action, CloudClient, CloudError, CloudFuture, CustomImageRequest, Droplet,
    DropletCreateRequest, Image, ImageKind,
};
use crate::config::BuildConfig;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SIZE: usize = 200;
const MAX_PAGES: u32 = 1000;

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("dropsmith/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

#[derive(Deserialize)]
struct DropletEnvelope {
    droplet: Droplet,
}

#[derive(Deserialize)]
struct ActionEnvelope {
    action: Action,
}

#[derive(Deserialize)]
struct ImageEnvelope {
    image: Image,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    #[serde(default)]
    pages: Option<Pages>,
}

#[derive(Debug, Default, Deserialize)]
struct Pages {
    #[serde(default)]
    next: Option<String>,
}

impl Links {
    fn has_next(&self) -> bool {
        self.pages
            .as_ref()
            .and_then(|pages| pages.next.as_deref())
            .is_some_and(|next| !next.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ImagePage {
    #[serde(default, alias = "snapshots")]
    images: Vec<Image>,
    #[serde(default)]
    links: Links,
}

impl ImagePage {
    /// A short page ends the listing even when a next link is present.
    fn is_last(&self) -> bool {
        !self.links.has_next() || self.images.len() < PAGE_SIZE
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Serialize)]
struct ActionRequest<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<&'a str>,
}

#[derive(Serialize)]
struct TagResource {
    resource_id: String,
    resource_type: &'static str,
}

#[derive(Serialize)]
struct TagResourcesRequest {
    resources: Vec<TagResource>,
}

/// HTTP client for the DigitalOcean API.
#[derive(Clone)]
pub struct DigitalOceanClient {
    base_url: String,
    token: String,
}

impl std::fmt::Debug for DigitalOceanClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigitalOceanClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl DigitalOceanClient {
    /// Creates a client for `base_url` authenticating with `token`.
    #[must_use]
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.to_owned(),
        }
    }

    /// Creates a client from the API URL and token in `config`.
    #[must_use]
    pub fn from_config(config: &BuildConfig) -> Self {
        Self::new(&config.api_url, config.token())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Vec<u8>, CloudError> {
        let transport = |err: reqwest::Error| CloudError::Transport {
            operation: operation.to_owned(),
            message: err.to_string(),
        };
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport)?;
        debug!(operation, status = status.as_u16(), "api response");

        if status.is_success() {
            return Ok(body.to_vec());
        }
        Err(CloudError::Api {
            operation: operation.to_owned(),
            status: status.as_u16(),
            message: api_message(&body),
        })
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, CloudError> {
        let body = self.send(operation, request).await?;
        decode(operation, &body)
    }

    async fn list_pages(
        &self,
        operation: &str,
        path: &str,
        filter: Option<(&'static str, &'static str)>,
    ) -> Result<Vec<Image>, CloudError> {
        let url = self.url(path);
        let mut images = Vec::new();
        let mut page: u32 = 1;
        loop {
            let query = page_query(page, filter);
            let batch: ImagePage = self
                .fetch(operation, HTTP_CLIENT.get(&url).query(&query))
                .await?;
            let last = batch.is_last();
            images.extend(batch.images);
            if last {
                return Ok(images);
            }
            if page >= MAX_PAGES {
                warn!(operation, pages = page, "stopping listing at page limit");
                return Ok(images);
            }
            page += 1;
        }
    }

    async fn create_droplet_request(
        &self,
        request: &DropletCreateRequest,
    ) -> Result<Droplet, CloudError> {
        let envelope: DropletEnvelope = self
            .fetch(
                "create droplet",
                HTTP_CLIENT.post(self.url("droplets")).json(request),
            )
            .await?;
        Ok(envelope.droplet)
    }

    async fn get_droplet_request(&self, droplet_id: u64) -> Result<Droplet, CloudError> {
        let envelope: DropletEnvelope = self
            .fetch(
                "get droplet",
                HTTP_CLIENT.get(self.url(&format!("droplets/{droplet_id}"))),
            )
            .await?;
        Ok(envelope.droplet)
    }

    async fn delete_droplet_request(&self, droplet_id: u64) -> Result<(), CloudError> {
        self.send(
            "delete droplet",
            HTTP_CLIENT.delete(self.url(&format!("droplets/{droplet_id}"))),
        )
        .await
        .map(|_| ())
    }

    async fn droplet_action_request(
        &self,
        droplet_id: u64,
        body: ActionRequest<'_>,
    ) -> Result<Action, CloudError> {
        let envelope: ActionEnvelope = self
            .fetch(
                "snapshot droplet",
                HTTP_CLIENT
                    .post(self.url(&format!("droplets/{droplet_id}/actions")))
                    .json(&body),
            )
            .await?;
        Ok(envelope.action)
    }

    async fn get_action_request(
        &self,
        operation: &str,
        path: String,
    ) -> Result<Action, CloudError> {
        let envelope: ActionEnvelope = self
            .fetch(operation, HTTP_CLIENT.get(self.url(&path)))
            .await?;
        Ok(envelope.action)
    }

    async fn get_image_request(&self, image_id: u64) -> Result<Image, CloudError> {
        let envelope: ImageEnvelope = self
            .fetch(
                "get image",
                HTTP_CLIENT.get(self.url(&format!("images/{image_id}"))),
            )
            .await?;
        Ok(envelope.image)
    }

    async fn create_custom_image_request(
        &self,
        request: &CustomImageRequest,
    ) -> Result<Image, CloudError> {
        let envelope: ImageEnvelope = self
            .fetch(
                "create custom image",
                HTTP_CLIENT.post(self.url("images")).json(request),
            )
            .await?;
        Ok(envelope.image)
    }

    async fn delete_image_request(&self, image_id: u64) -> Result<(), CloudError> {
        self.send(
            "delete image",
            HTTP_CLIENT.delete(self.url(&format!("images/{image_id}"))),
        )
        .await
        .map(|_| ())
    }

    async fn transfer_image_request(
        &self,
        image_id: u64,
        region: &str,
    ) -> Result<Action, CloudError> {
        let body = ActionRequest {
            kind: "transfer",
            name: None,
            region: Some(region),
        };
        let envelope: ActionEnvelope = self
            .fetch(
                "transfer image",
                HTTP_CLIENT
                    .post(self.url(&format!("images/{image_id}/actions")))
                    .json(&body),
            )
            .await?;
        Ok(envelope.action)
    }

    async fn tag_image_request(&self, tag: &str, image_id: u64) -> Result<(), CloudError> {
        let body = tag_request(image_id);
        self.send(
            "tag image",
            HTTP_CLIENT
                .post(self.url(&format!("tags/{tag}/resources")))
                .json(&body),
        )
        .await
        .map(|_| ())
    }
}

fn decode<T: DeserializeOwned>(operation: &str, body: &[u8]) -> Result<T, CloudError> {
    serde_json::from_slice(body).map_err(|err| CloudError::Decode {
        operation: operation.to_owned(),
        message: err.to_string(),
    })
}

fn api_message(body: &[u8]) -> String {
    serde_json::from_slice::<ApiErrorBody>(body).map_or_else(
        |_| String::from_utf8_lossy(body).trim().to_owned(),
        |parsed| parsed.message,
    )
}

fn page_query(page: u32, filter: Option<(&'static str, &'static str)>) -> Vec<(&'static str, String)> {
    let mut query = vec![("per_page", PAGE_SIZE.to_string()), ("page", page.to_string())];
    if let Some((key, value)) = filter {
        query.push((key, value.to_owned()));
    }
    query
}

const fn kind_filter(kind: Option<ImageKind>) -> Option<(&'static str, &'static str)> {
    match kind {
        None => None,
        Some(ImageKind::User) => Some(("private", "true")),
        Some(ImageKind::Application) => Some(("type", "application")),
        Some(ImageKind::Distribution) => Some(("type", "distribution")),
    }
}

fn tag_request(image_id: u64) -> TagResourcesRequest {
    TagResourcesRequest {
        resources: vec![TagResource {
            resource_id: image_id.to_string(),
            resource_type: "image",
        }],
    }
}

impl CloudClient for DigitalOceanClient {
    fn create_droplet<'a>(
        &'a self,
        request: &'a DropletCreateRequest,
    ) -> CloudFuture<'a, Droplet> {
        Box::pin(self.create_droplet_request(request))
    }

    fn get_droplet(&self, droplet_id: u64) -> CloudFuture<'_, Droplet> {
        Box::pin(self.get_droplet_request(droplet_id))
    }

    fn delete_droplet(&self, droplet_id: u64) -> CloudFuture<'_, ()> {
        Box::pin(self.delete_droplet_request(droplet_id))
    }

    fn snapshot_droplet<'a>(&'a self, droplet_id: u64, name: &'a str) -> CloudFuture<'a, Action> {
        Box::pin(self.droplet_action_request(
            droplet_id,
            ActionRequest {
                kind: "snapshot",
                name: Some(name),
                region: None,
            },
        ))
    }

    fn get_droplet_action(&self, droplet_id: u64, action_id: u64) -> CloudFuture<'_, Action> {
        Box::pin(self.get_action_request(
            "get droplet action",
            format!("droplets/{droplet_id}/actions/{action_id}"),
        ))
    }

    fn list_droplet_snapshots(&self, droplet_id: u64) -> CloudFuture<'_, Vec<Image>> {
        Box::pin(async move {
            self.list_pages(
                "list droplet snapshots",
                &format!("droplets/{droplet_id}/snapshots"),
                None,
            )
            .await
        })
    }

    fn get_image(&self, image_id: u64) -> CloudFuture<'_, Image> {
        Box::pin(self.get_image_request(image_id))
    }

    fn list_images(&self, kind: Option<ImageKind>) -> CloudFuture<'_, Vec<Image>> {
        Box::pin(self.list_pages("list images", "images", kind_filter(kind)))
    }

    fn create_custom_image<'a>(
        &'a self,
        request: &'a CustomImageRequest,
    ) -> CloudFuture<'a, Image> {
        Box::pin(self.create_custom_image_request(request))
    }

    fn delete_image(&self, image_id: u64) -> CloudFuture<'_, ()> {
        Box::pin(self.delete_image_request(image_id))
    }

    fn transfer_image<'a>(&'a self, image_id: u64, region: &'a str) -> CloudFuture<'a, Action> {
        Box::pin(self.transfer_image_request(image_id, region))
    }

    fn get_image_action(&self, image_id: u64, action_id: u64) -> CloudFuture<'_, Action> {
        Box::pin(self.get_action_request(
            "get image action",
            format!("images/{image_id}/actions/{action_id}"),
        ))
    }

    fn tag_image<'a>(&'a self, tag: &'a str, image_id: u64) -> CloudFuture<'a, ()> {
        Box::pin(self.tag_image_request(tag, image_id))
    }
}

#[cfg(test)]
mod tests;
