//! Collection endpoints of the Operations Center APIs.
//!
//! Thin wrappers over [`PageFetcher::fetch_all`] naming the list endpoints
//! the reporting tools walk. Items come back as raw JSON except for
//! organizations, whose `links` drive the connection check.

use crate::config::ApiConfig;
use crate::error::FetchError;
use crate::oauth::AccessTokenSource;
use crate::pagination::{Link, PageFetcher, ResourceCollection};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub const PLATFORM_BASE_URL: &str = "https://sandboxapi.deere.com/platform";
pub const EQUIPMENT_URL: &str = "https://equipmentapi.deere.com/isg/equipment";

/// Organization as listed by `/organizations`.
#[derive(Clone, Debug, Deserialize)]
pub struct Organization {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub org_type: Option<String>,
    #[serde(default)]
    pub member: Option<bool>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl Organization {
    /// URL the user must open to grant this application access to the
    /// organization, or `None` when access is already granted.
    pub fn connections_url(&self, redirect_uri: &str) -> Option<String> {
        let link = self
            .links
            .iter()
            .find(|l| l.rel == "connections" && !l.uri.is_empty())?;
        Some(format!(
            "{}?redirect_uri={}",
            link.uri,
            urlencoding::encode(redirect_uri)
        ))
    }

    /// Looks up a link by `rel`.
    pub fn link(&self, rel: &str) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.rel == rel)
            .map(|l| l.uri.as_str())
    }
}

/// Named collection endpoints.
///
/// The equipment API lives on its own host and serves plain JSON, so it
/// gets a separate fetcher.
pub struct DeereApi {
    platform: PageFetcher,
    equipment: PageFetcher,
    equipment_url: String,
    page_size: u32,
}

impl DeereApi {
    pub fn new(
        platform: PageFetcher,
        equipment: PageFetcher,
        equipment_url: String,
        page_size: u32,
    ) -> Self {
        Self {
            platform,
            equipment,
            equipment_url,
            page_size,
        }
    }

    /// Builds both fetchers from configuration: the platform one on
    /// `base_url` with the configured media type, the equipment one on
    /// `equipment_url` with plain JSON.
    pub fn from_config(
        api: &ApiConfig,
        http_client: Client,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Self {
        let platform = PageFetcher::new(http_client.clone(), api.base_url.clone(), tokens.clone())
            .with_page_delay(api.page_delay())
            .with_accept(api.accept.clone());
        let equipment = PageFetcher::new(http_client, api.equipment_url.clone(), tokens)
            .with_page_delay(api.page_delay())
            .with_accept("application/json");
        Self::new(platform, equipment, api.equipment_url.clone(), api.page_size)
    }

    /// Walks any platform collection path.
    pub async fn collection(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<ResourceCollection<Value>, FetchError> {
        self.platform.fetch_all(path, params, self.page_size).await
    }

    pub async fn organizations(&self) -> Result<ResourceCollection<Organization>, FetchError> {
        self.platform
            .fetch_all("/organizations", &[], self.page_size)
            .await
    }

    /// Organizations still waiting for the user to grant access, paired
    /// with the URL that grants it.
    pub async fn pending_connections(
        &self,
        redirect_uri: &str,
    ) -> Result<Vec<(Organization, String)>, FetchError> {
        let organizations = self.organizations().await?;
        Ok(organizations
            .into_iter()
            .filter_map(|org| {
                let url = org.connections_url(redirect_uri)?;
                Some((org, url))
            })
            .collect())
    }

    pub async fn farms(&self, org_id: &str) -> Result<ResourceCollection<Value>, FetchError> {
        self.collection(&format!("/organizations/{}/farms", org_id), &[])
            .await
    }

    pub async fn clients(&self, org_id: &str) -> Result<ResourceCollection<Value>, FetchError> {
        self.collection(&format!("/organizations/{}/clients", org_id), &[])
            .await
    }

    /// Fields of an organization; `params` carries filters such as
    /// `farmName`, `recordFilter` or `embed`.
    pub async fn fields(
        &self,
        org_id: &str,
        params: &[(&str, &str)],
    ) -> Result<ResourceCollection<Value>, FetchError> {
        self.collection(&format!("/organizations/{}/fields", org_id), params)
            .await
    }

    pub async fn farm_fields(
        &self,
        org_id: &str,
        farm_id: &str,
    ) -> Result<ResourceCollection<Value>, FetchError> {
        self.collection(
            &format!("/organizations/{}/farms/{}/fields", org_id, farm_id),
            &[],
        )
        .await
    }

    pub async fn boundaries(
        &self,
        org_id: &str,
        field_id: &str,
    ) -> Result<ResourceCollection<Value>, FetchError> {
        self.collection(
            &format!("/organizations/{}/fields/{}/boundaries", org_id, field_id),
            &[],
        )
        .await
    }

    /// Field operations of one field; `params` carries filters such as
    /// `cropSeason` or `fieldOperationType`.
    pub async fn field_operations(
        &self,
        org_id: &str,
        field_id: &str,
        params: &[(&str, &str)],
    ) -> Result<ResourceCollection<Value>, FetchError> {
        self.collection(
            &format!("/organizations/{}/fields/{}/fieldOperations", org_id, field_id),
            params,
        )
        .await
    }

    pub async fn guidance_lines(
        &self,
        org_id: &str,
        field_id: &str,
    ) -> Result<ResourceCollection<Value>, FetchError> {
        self.collection(
            &format!("/organizations/{}/fields/{}/guidanceLines", org_id, field_id),
            &[],
        )
        .await
    }

    pub async fn map_layer_summaries(
        &self,
        org_id: &str,
        field_id: &str,
    ) -> Result<ResourceCollection<Value>, FetchError> {
        self.collection(
            &format!(
                "/organizations/{}/fields/{}/mapLayerSummaries",
                org_id, field_id
            ),
            &[],
        )
        .await
    }

    pub async fn files(&self, params: &[(&str, &str)]) -> Result<ResourceCollection<Value>, FetchError> {
        self.collection("/files", params).await
    }

    /// Equipment of the given organizations.
    pub async fn equipment(
        &self,
        org_ids: &[&str],
    ) -> Result<ResourceCollection<Value>, FetchError> {
        let org_ids = org_ids.join(",");
        let params: Vec<(&str, &str)> = if org_ids.is_empty() {
            Vec::new()
        } else {
            vec![("organizationIds", org_ids.as_str())]
        };
        self.equipment
            .fetch_all(&self.equipment_url, &params, self.page_size)
            .await
    }
}
