//! Download-link issuance

use std::collections::HashMap;

use futures::future::try_join_all;
use serde::Serialize;
use tracing::debug;
use url::Url;

use super::ModelService;
use crate::db::query::{compare_models, ModelFilter, ModelOrder};
use crate::errors::{AppError, Result};
use crate::metrics;

/// Signed retrieval link for one model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelUrl {
    pub id: i32,
    pub url: String,
}

/// Put a signed URL on the public origin, keeping path and query verbatim
pub(crate) fn rewrite_origin(signed: &str, public: &Url) -> Result<String> {
    let signed = Url::parse(signed).map_err(|e| AppError::Internal {
        message: format!("object store returned an invalid url: {}", e),
    })?;

    let mut url = public.clone();
    url.set_path(signed.path());
    url.set_query(signed.query());
    Ok(url.to_string())
}

impl ModelService {
    /// Count a download for each model and issue signed links.
    ///
    /// Unknown ids and models without a finished artifact are skipped.
    /// Without `orders` the result follows the order of `ids`.
    pub async fn get_model_urls(&self, ids: &[i32], orders: &[ModelOrder]) -> Result<Vec<ModelUrl>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        self.repo.increment_downloads(ids).await?;

        let mut rows = self
            .repo
            .find_models_with_artifacts(&ModelFilter::ids(ids.to_vec()))
            .await?;

        if orders.is_empty() {
            let position: HashMap<i32, usize> = ids
                .iter()
                .enumerate()
                .rev()
                .map(|(pos, id)| (*id, pos))
                .collect();
            rows.sort_by_key(|(model, _)| position.get(&model.id).copied().unwrap_or(usize::MAX));
        } else {
            rows.sort_by(|(a, _), (b, _)| compare_models(a, b, orders));
        }

        let links = rows.into_iter().filter_map(|(model, artifact)| {
            artifact
                .filter(|a| a.is_complete())
                .map(|a| (model.id, a.path))
        });

        let urls = try_join_all(links.map(|(id, path)| async move {
            let signed = self.store.presigned_get(&path, self.presign_ttl).await?;
            let url = match &self.public_base_url {
                Some(public) => rewrite_origin(&signed, public)?,
                None => signed,
            };
            Ok::<_, AppError>(ModelUrl { id, url })
        }))
        .await?;

        metrics::record_download_links(urls.len());
        debug!(requested = ids.len(), issued = urls.len(), "Download links issued");

        Ok(urls)
    }
}
