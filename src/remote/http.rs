use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;

use super::traits::{CommitRequest, FetchOptions, Remote};
use crate::model::{Directory, PackageIdentity};

/// Error body returned by the source service on failed requests
#[derive(Debug, Deserialize)]
struct StatusReply {
    #[serde(rename = "@code", default)]
    code: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

/// Client for the `/source` routes of a build service API
pub struct HttpRemote {
    client: Client,
    api_url: Url,
    username: Option<String>,
    password: Option<String>,
}

impl HttpRemote {
    /// Create a new client for the API at `api_url`
    pub fn new(api_url: &str, username: Option<String>, password: Option<String>) -> Result<Self> {
        let api_url = Url::parse(api_url).with_context(|| format!("Invalid API URL: {}", api_url))?;
        let client = Client::builder()
            .user_agent(concat!("obs-checkout/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url,
            username,
            password,
        })
    }

    /// Build `<api>/source/<project>/<package>[/<file>]` with each part escaped
    fn source_url(&self, package: &PackageIdentity, file: Option<&str>) -> Result<Url> {
        let mut url = self.api_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow::anyhow!("API URL cannot be a base: {}", self.api_url))?;
            segments
                .pop_if_empty()
                .push("source")
                .push(&package.project)
                .push(&package.package);
            if let Some(file) = file {
                segments.push(file);
            }
        }
        Ok(url)
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_deref()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = self
            .with_auth(request)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", what))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match quick_xml::de::from_str::<StatusReply>(&body) {
            Ok(StatusReply {
                code,
                summary: Some(summary),
            }) => anyhow::bail!(
                "{} failed with {} ({}): {}",
                what,
                status,
                code.unwrap_or_default(),
                summary
            ),
            _ => anyhow::bail!("{} failed with {}", what, status),
        }
    }
}

fn fetch_query(options: &FetchOptions) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if options.expand_links {
        query.push(("expand", "1".to_string()));
    }
    if let Some(revision) = &options.revision {
        query.push(("rev", revision.clone()));
    }
    query
}

#[async_trait]
impl Remote for HttpRemote {
    async fn fetch_directory(
        &self,
        package: &PackageIdentity,
        options: &FetchOptions,
    ) -> Result<Directory> {
        let url = self.source_url(package, None)?;
        tracing::debug!("GET {}", url);

        let request = self.client.get(url).query(&fetch_query(options));
        let body = self
            .send(request, &format!("Listing {}", package))
            .await?
            .text()
            .await?;

        Directory::from_xml(&body).with_context(|| format!("Invalid listing of {}", package))
    }

    async fn fetch_file(
        &self,
        package: &PackageIdentity,
        name: &str,
        options: &FetchOptions,
    ) -> Result<Vec<u8>> {
        let url = self.source_url(package, Some(name))?;
        tracing::debug!("GET {}", url);

        let request = self.client.get(url).query(&fetch_query(options));
        let bytes = self
            .send(request, &format!("Downloading {} from {}", name, package))
            .await?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }

    async fn fetch_meta(&self, package: &PackageIdentity) -> Result<Option<String>> {
        let url = self.source_url(package, Some("_meta"))?;
        tracing::debug!("GET {}", url);

        let response = self
            .with_auth(self.client.get(url))
            .send()
            .await
            .with_context(|| format!("Request for meta of {} failed", package))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .with_context(|| format!("Fetching meta of {} failed", package))?;
        Ok(Some(response.text().await?))
    }

    async fn upload_file(
        &self,
        package: &PackageIdentity,
        name: &str,
        contents: &[u8],
    ) -> Result<()> {
        let url = self.source_url(package, Some(name))?;
        tracing::debug!("PUT {} ({} bytes)", url, contents.len());

        let request = self
            .client
            .put(url)
            .query(&[("rev", "repository")])
            .body(contents.to_vec());
        self.send(request, &format!("Uploading {} to {}", name, package))
            .await?;
        Ok(())
    }

    async fn commit_file_list(
        &self,
        package: &PackageIdentity,
        request: &CommitRequest,
    ) -> Result<Directory> {
        let url = self.source_url(package, None)?;
        tracing::debug!("POST {} commitfilelist", url);

        let mut query = vec![("cmd", "commitfilelist".to_string())];
        if let Some(comment) = &request.comment {
            query.push(("comment", comment.clone()));
        }
        if request.keep_link {
            query.push(("keeplink", "1".to_string()));
        }

        let body = request.file_list.to_xml()?;
        let http_request = self.client.post(url).query(&query).body(body);
        let reply = self
            .send(http_request, &format!("Committing {}", package))
            .await?
            .text()
            .await?;

        Directory::from_xml(&reply).with_context(|| format!("Invalid commit reply for {}", package))
    }
}
