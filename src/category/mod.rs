//! Category store
//!
//! Keeps the most recent category tree of every site in memory, persists it
//! through a [`CategoryRepository`], and resolves any category to its
//! top-level ancestor.
//!
//! Trees are immutable `Arc`s; a sync that sees a new remote version swaps
//! the whole tree in a single write and forgets every memoized resolution for
//! that site.

pub mod error;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::marketplace::SharedMarketplaceClient;
use crate::metrics;
use crate::models::{Category, SiteCategoryTree};
use crate::storage::SharedCategoryRepository;

pub use error::{ResolveError, SyncError};

/// Upper bound on parent hops before a chain is declared corrupt
pub const MAX_RESOLVE_STEPS: usize = 64;

/// Result of a [`CategoryStore::sync`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Local copy already matched the remote version
    UpToDate { version: String },

    /// The tree was replaced
    Updated {
        previous: Option<String>,
        current: String,
    },
}

impl SyncOutcome {
    /// Version in effect after the sync
    pub fn version(&self) -> &str {
        match self {
            Self::UpToDate { version } => version,
            Self::Updated { current, .. } => current,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::UpToDate { .. } => "up_to_date",
            Self::Updated { .. } => "updated",
        }
    }
}

type MemoKey = (String, String);

/// Per-site category trees with top-parent resolution
pub struct CategoryStore {
    client: SharedMarketplaceClient,
    repo: SharedCategoryRepository,
    trees: RwLock<HashMap<String, Arc<SiteCategoryTree>>>,
    memo: RwLock<HashMap<MemoKey, String>>,
    tree_reads: AtomicU64,
}

impl CategoryStore {
    /// Create an empty store
    pub fn new(client: SharedMarketplaceClient, repo: SharedCategoryRepository) -> Self {
        Self {
            client,
            repo,
            trees: RwLock::new(HashMap::new()),
            memo: RwLock::new(HashMap::new()),
            tree_reads: AtomicU64::new(0),
        }
    }

    /// Bring a site's tree up to date with the remote
    ///
    /// Only the version tag is fetched when the local copy is current.
    pub async fn sync(&self, global_id: &str) -> Result<SyncOutcome, SyncError> {
        let result = self.sync_tree(global_id).await;

        match &result {
            Ok((outcome, _)) => metrics::record_category_sync(global_id, outcome.label()),
            Err(e) => {
                metrics::record_category_sync(global_id, "failed");
                warn!(site = %global_id, error = %e, "Category sync failed");
            }
        }

        result.map(|(outcome, _)| outcome)
    }

    async fn sync_tree(
        &self,
        global_id: &str,
    ) -> Result<(SyncOutcome, Arc<SiteCategoryTree>), SyncError> {
        let remote_version = self
            .client
            .category_version(global_id)
            .await
            .map_err(|e| SyncError::remote(global_id, e))?;

        let cached = self.cached(global_id).await;
        let local_version = match &cached {
            Some(tree) => Some(tree.version().to_string()),
            None => self
                .repo
                .version(global_id)
                .await
                .map_err(|e| SyncError::storage(global_id, e))?,
        };

        if local_version.as_deref() == Some(remote_version.as_str()) {
            let tree = match cached {
                Some(tree) => tree,
                None => match self.load_persisted(global_id).await? {
                    Some(tree) => tree,
                    // Version row vanished between the two reads
                    None => return self.replace_tree(global_id, local_version).await,
                },
            };

            debug!(site = %global_id, version = %remote_version, "Category tree up to date");
            return Ok((
                SyncOutcome::UpToDate {
                    version: remote_version,
                },
                tree,
            ));
        }

        self.replace_tree(global_id, local_version).await
    }

    async fn replace_tree(
        &self,
        global_id: &str,
        previous: Option<String>,
    ) -> Result<(SyncOutcome, Arc<SiteCategoryTree>), SyncError> {
        let snapshot = self
            .client
            .category_tree(global_id)
            .await
            .map_err(|e| SyncError::remote(global_id, e))?;

        let tree = Arc::new(SiteCategoryTree::new(
            global_id,
            snapshot.version,
            snapshot.categories,
        ));

        self.repo
            .replace(&tree)
            .await
            .map_err(|e| SyncError::storage(global_id, e))?;

        self.trees
            .write()
            .await
            .insert(global_id.to_string(), Arc::clone(&tree));
        self.memo
            .write()
            .await
            .retain(|(site, _), _| site != global_id);

        info!(
            site = %global_id,
            previous = previous.as_deref().unwrap_or("none"),
            current = %tree.version(),
            categories = tree.len(),
            "Category tree replaced"
        );

        Ok((
            SyncOutcome::Updated {
                previous,
                current: tree.version().to_string(),
            },
            tree,
        ))
    }

    async fn cached(&self, global_id: &str) -> Option<Arc<SiteCategoryTree>> {
        self.trees.read().await.get(global_id).cloned()
    }

    async fn load_persisted(
        &self,
        global_id: &str,
    ) -> Result<Option<Arc<SiteCategoryTree>>, SyncError> {
        let Some(tree) = self
            .repo
            .find(global_id)
            .await
            .map_err(|e| SyncError::storage(global_id, e))?
        else {
            return Ok(None);
        };

        let tree = Arc::new(tree);
        let mut trees = self.trees.write().await;
        // Another task may have installed a newer tree meanwhile
        let installed = trees
            .entry(global_id.to_string())
            .or_insert_with(|| Arc::clone(&tree));
        Ok(Some(Arc::clone(installed)))
    }

    /// The tree for a site: cache, then store, then an implicit sync
    pub async fn tree(&self, global_id: &str) -> Result<Arc<SiteCategoryTree>, SyncError> {
        if let Some(tree) = self.cached(global_id).await {
            return Ok(tree);
        }

        if let Some(tree) = self.load_persisted(global_id).await? {
            return Ok(tree);
        }

        let (outcome, tree) = self.sync_tree(global_id).await?;
        metrics::record_category_sync(global_id, outcome.label());
        Ok(tree)
    }

    /// Active level-1 categories of a site, in tree order
    pub async fn top_level_categories(&self, global_id: &str) -> Result<Vec<Category>, SyncError> {
        let tree = self.tree(global_id).await?;
        Ok(tree.top_level().cloned().collect())
    }

    /// Resolve a category to the ancestor directly below the tree root
    ///
    /// A category that is itself a root resolves to itself. Results are
    /// memoized until the site's tree is replaced.
    pub async fn resolve_top_parent(
        &self,
        global_id: &str,
        category_id: &str,
    ) -> Result<String, ResolveError> {
        let key = (global_id.to_string(), category_id.to_string());
        if let Some(hit) = self.memo.read().await.get(&key) {
            return Ok(hit.clone());
        }

        let tree = self.tree(global_id).await?;
        self.tree_reads.fetch_add(1, Ordering::Relaxed);
        let top = walk_to_top(&tree, category_id)?;

        let mut memo = self.memo.write().await;
        // Skip memoizing if a sync swapped the tree while we walked it
        let still_current = self
            .trees
            .read()
            .await
            .get(global_id)
            .is_some_and(|current| Arc::ptr_eq(current, &tree));
        if still_current {
            memo.insert(key, top.clone());
        }

        Ok(top)
    }

    /// Human-readable name of a category
    pub async fn category_name(&self, global_id: &str, category_id: &str) -> Option<String> {
        let tree = self.tree(global_id).await.ok()?;
        tree.get(category_id).map(|c| c.name.clone())
    }

    /// How many times resolution walked a tree instead of hitting the memo
    pub fn tree_reads(&self) -> u64 {
        self.tree_reads.load(Ordering::Relaxed)
    }
}

fn walk_to_top(tree: &SiteCategoryTree, category_id: &str) -> Result<String, ResolveError> {
    let site = tree.global_id();
    let mut current = tree.get(category_id).ok_or_else(|| ResolveError::NotFound {
        site: site.to_string(),
        category_id: category_id.to_string(),
    })?;

    if current.is_root() {
        return Ok(current.id.clone());
    }

    for _ in 0..MAX_RESOLVE_STEPS {
        // Non-root categories always carry a parent id
        let parent_id = current.parent_id.as_deref().unwrap_or_default();
        let parent = tree
            .get(parent_id)
            .ok_or_else(|| ResolveError::DanglingParent {
                site: site.to_string(),
                category_id: current.id.clone(),
                parent_id: parent_id.to_string(),
            })?;

        if parent.is_root() {
            return Ok(current.id.clone());
        }
        current = parent;
    }

    Err(ResolveError::TooDeep {
        site: site.to_string(),
        category_id: category_id.to_string(),
        limit: MAX_RESOLVE_STEPS,
    })
}
