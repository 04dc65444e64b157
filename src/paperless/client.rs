//! Paperless-ngx REST client.
//!
//! Thin reqwest wrapper over the three endpoints the bridge uses. Every
//! request carries HTTP basic auth.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response, Url};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::config::PaperlessConfig;
use crate::error::BackendError;
use crate::paperless::store::DocumentStore;
use crate::paperless::types::{DocumentSubmission, NewTag, Tag, TagMap, TagPage};

/// Page size override for tag listing, large enough for one round trip.
const TAG_PAGE_SIZE: u32 = 10_000;

/// Upper bound on followed `next` links.
const MAX_TAG_PAGES: usize = 100;

/// File name sent when the attachment declared none.
pub const FALLBACK_FILE_NAME: &str = "attachment";

const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// Paperless-ngx API client.
#[derive(Clone)]
pub struct PaperlessClient {
    base: String,
    username: String,
    password: SecretString,
    client: reqwest::Client,
}

impl PaperlessClient {
    pub fn new(config: &PaperlessConfig) -> Self {
        Self {
            base: config.api_base(),
            username: config.username.clone(),
            password: config.password.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// API root, e.g. `http://paperless:8000/api`.
    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base)
    }

    /// Pagination link re-based onto the configured API root, so
    /// credentials only ever go to `base`. Links outside the API path are
    /// rejected.
    fn follow_link(&self, link: &str) -> Result<Url, BackendError> {
        let base = Url::parse(&self.base)
            .map_err(|e| BackendError::Decode(format!("API root {}: {e}", self.base)))?;
        let target = base
            .join(link)
            .map_err(|e| BackendError::Decode(format!("pagination link {link}: {e}")))?;

        let root = format!("{}/", base.path().trim_end_matches('/'));
        if !target.path().starts_with(&root) {
            return Err(BackendError::Decode(format!(
                "pagination link outside the API root: {link}"
            )));
        }

        let mut rebased = base;
        rebased.set_path(target.path());
        rebased.set_query(target.query());
        Ok(rebased)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
    }
}

/// Pass successful responses through; turn anything else into a `Status` error.
async fn check(operation: &'static str, resp: Response) -> Result<Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(BackendError::Status {
        operation,
        status,
        body,
    })
}

/// Rough `type/subtype` token check so `mime_str` cannot fail.
fn is_valid_media_type(value: &str) -> bool {
    let token = |s: &str| {
        !s.is_empty()
            && s.bytes()
                .all(|b| b.is_ascii_alphanumeric() || b"!#$&-^_.+".contains(&b))
    };
    match value.split_once('/') {
        Some((main, sub)) => token(main) && token(sub),
        None => false,
    }
}

fn document_form(submission: DocumentSubmission) -> Result<Form, BackendError> {
    let media_type = if is_valid_media_type(&submission.media_type) {
        submission.media_type.as_str()
    } else {
        FALLBACK_MEDIA_TYPE
    };
    let file_name = submission
        .file_name
        .clone()
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());

    let part = Part::bytes(submission.content)
        .file_name(file_name)
        .mime_str(media_type)?;

    let form = submission
        .tags
        .iter()
        .fold(Form::new().part("document", part), |form, id| {
            form.text("tags", id.to_string())
        });
    Ok(form)
}

#[async_trait]
impl DocumentStore for PaperlessClient {
    async fn list_tags(&self) -> Result<TagMap, BackendError> {
        let mut mapping = TagMap::new();
        let mut names = Vec::new();
        let first = self
            .request(Method::GET, &self.endpoint("tags/"))
            .query(&[("page_size", TAG_PAGE_SIZE)]);
        let mut pending = Some(first);
        let mut pages = 0;

        while let Some(req) = pending.take() {
            let resp = check("list tags", req.send().await?).await?;
            let page: TagPage = resp
                .json()
                .await
                .map_err(|e| BackendError::Decode(format!("tag list: {e}")))?;

            for tag in page.results {
                names.push((tag.name.to_lowercase(), tag.id));
                mapping.insert(tag.slug, tag.id);
            }
            pages += 1;

            if let Some(next) = page.next.filter(|n| !n.is_empty()) {
                if pages >= MAX_TAG_PAGES {
                    return Err(BackendError::Decode(format!(
                        "tag list did not end after {MAX_TAG_PAGES} pages"
                    )));
                }
                pending = Some(self.request(Method::GET, self.follow_link(&next)?.as_str()));
            }
        }

        // Names are secondary keys; a slug always wins.
        for (name, id) in names {
            mapping.entry(name).or_insert(id);
        }

        debug!(count = mapping.len(), pages, "Fetched tag list");
        Ok(mapping)
    }

    async fn create_tag(&self, name: &str) -> Result<Tag, BackendError> {
        let resp = self
            .request(Method::POST, &self.endpoint("tags/"))
            .json(&NewTag::new(name))
            .send()
            .await?;
        let resp = check("create tag", resp).await?;
        resp.json()
            .await
            .map_err(|e| BackendError::Decode(format!("created tag: {e}")))
    }

    async fn create_document(&self, submission: DocumentSubmission) -> Result<(), BackendError> {
        let form = document_form(submission)?;
        let resp = self
            .request(Method::POST, &self.endpoint("documents/post_document/"))
            .multipart(form)
            .send()
            .await?;
        let resp = check("create document", resp).await?;
        let body = resp.text().await.unwrap_or_default();
        debug!(response = %body, "Document accepted for consumption");
        Ok(())
    }
}
