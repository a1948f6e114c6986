//! Asset pager: serves a collection in fixed-size pages without repeats.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{AssetCategory, AssetItem, AssetLister};
use crate::error::AssetError;

/// One page of assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPage {
    pub items: Vec<AssetItem>,
    /// True iff unseen items remain after this page.
    pub has_more: bool,
}

impl AssetPage {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Take the first `page_size` items not in `shown`, preserving order.
pub fn paginate(all: &[AssetItem], shown: &BTreeSet<String>, page_size: usize) -> AssetPage {
    let mut remaining = all.iter().filter(|i| !shown.contains(&i.id));
    let items: Vec<AssetItem> = remaining.by_ref().take(page_size).cloned().collect();
    let has_more = remaining.next().is_some();
    AssetPage { items, has_more }
}

/// Pages over lister collections, caching each non-empty collection.
pub struct AssetPager {
    lister: Arc<dyn AssetLister>,
    cache: RwLock<HashMap<AssetCategory, Arc<Vec<AssetItem>>>>,
    page_size: usize,
    timeout: Duration,
}

impl AssetPager {
    pub fn new(lister: Arc<dyn AssetLister>, page_size: usize, timeout: Duration) -> Self {
        Self {
            lister,
            cache: RwLock::new(HashMap::new()),
            page_size: page_size.max(1),
            timeout,
        }
    }

    /// Next page of `category` excluding everything in `shown`.
    pub async fn next_page(
        &self,
        category: AssetCategory,
        shown: &BTreeSet<String>,
    ) -> Result<AssetPage, AssetError> {
        let all = self.collection(category).await?;
        let page = paginate(&all, shown, self.page_size);
        debug!(
            category = %category,
            shown = shown.len(),
            returned = page.items.len(),
            has_more = page.has_more,
            "Asset page served"
        );
        Ok(page)
    }

    /// Drop the cached collection so the next page re-lists it.
    pub async fn refresh(&self, category: AssetCategory) {
        self.cache.write().await.remove(&category);
        info!(category = %category, "Asset cache invalidated");
    }

    async fn collection(&self, category: AssetCategory) -> Result<Arc<Vec<AssetItem>>, AssetError> {
        if let Some(items) = self.cache.read().await.get(&category) {
            return Ok(Arc::clone(items));
        }

        let items = match tokio::time::timeout(self.timeout, self.lister.list(category)).await {
            Ok(Ok(items)) => items,
            Ok(Err(e)) => {
                warn!(category = %category, error = %e, "Asset listing failed");
                return Err(e);
            }
            Err(_) => {
                warn!(category = %category, timeout = ?self.timeout, "Asset listing timed out");
                return Err(AssetError::Timeout {
                    category: category.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        let items = Arc::new(items);
        // An empty listing may be a transient host problem; ask again next time.
        if !items.is_empty() {
            self.cache
                .write()
                .await
                .insert(category, Arc::clone(&items));
        }
        Ok(items)
    }
}
