//! In-memory category store.
//!
//! Implements the same contract as [`PgCategoryStore`](crate::PgCategoryStore)
//! over plain collections behind a `tokio::sync::RwLock`. Used by pipeline and
//! API tests, and by the API binary when no `DATABASE_URL` is configured.
//! Categories list in insertion order.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use pgvector::Vector;
use tokio::sync::RwLock;
use uuid::Uuid;

use strata_core::{
    Category, CategoryRecord, CategoryStore, Error, Membership, Post, PostHashtags, Result,
    TaxonomySnapshot,
};

#[derive(Debug, Clone)]
struct StoredCategory {
    category: Category,
    deleted: bool,
}

#[derive(Debug, Clone, Default)]
struct StoredPost {
    embedding: Option<Vector>,
    hashtags: Vec<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    categories: Vec<StoredCategory>,
    index: HashMap<Uuid, usize>,
    posts: HashMap<Uuid, StoredPost>,
    /// (post, category) edges, ordered so queries are deterministic.
    edges: BTreeSet<(Uuid, Uuid)>,
    /// Categories or posts whose writes fail, for exercising per-item error paths.
    failing: HashSet<Uuid>,
}

impl MemoryState {
    fn stored(&self, id: Uuid) -> Option<&StoredCategory> {
        self.index.get(&id).map(|&i| &self.categories[i])
    }

    fn active_mut(&mut self, id: Uuid) -> Result<&mut Category> {
        if self.failing.contains(&id) {
            return Err(Error::Internal(format!("injected write failure for {}", id)));
        }
        let i = match self.index.get(&id) {
            Some(&i) if !self.categories[i].deleted => i,
            _ => return Err(Error::CategoryNotFound(id)),
        };
        Ok(&mut self.categories[i].category)
    }

    fn check_writable(&self, id: Uuid) -> Result<()> {
        if self.failing.contains(&id) {
            return Err(Error::Internal(format!("injected write failure for {}", id)));
        }
        Ok(())
    }

    fn insert_category(&mut self, category: Category, deleted: bool) {
        self.index.insert(category.id, self.categories.len());
        self.categories.push(StoredCategory { category, deleted });
    }

    fn count_posts(&self, category_id: Uuid) -> i64 {
        self.edges.iter().filter(|(_, c)| *c == category_id).count() as i64
    }
}

/// Category store kept entirely in process memory.
#[derive(Clone, Default)]
pub struct InMemoryCategoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryCategoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an active category with no posts.
    pub async fn add_category(&self, name: &str) -> Uuid {
        let category = Category::new(name, 0);
        let id = category.id;
        self.state.write().await.insert_category(category, false);
        id
    }

    /// Seed a category with an embedding already attached.
    pub async fn add_category_with_embedding(&self, name: &str, embedding: Vec<f32>) -> Uuid {
        let mut category = Category::new(name, 0);
        category.embedding = Some(Vector::from(embedding));
        let id = category.id;
        self.state.write().await.insert_category(category, false);
        id
    }

    /// Seed a post linked to `category_ids`; linked counts are refreshed.
    pub async fn add_post(&self, embedding: Option<Vec<f32>>, category_ids: &[Uuid]) -> Uuid {
        let id = Uuid::now_v7();
        let mut state = self.state.write().await;
        state.posts.insert(
            id,
            StoredPost {
                embedding: embedding.map(Vector::from),
                hashtags: Vec::new(),
            },
        );
        for &category_id in category_ids {
            state.edges.insert((id, category_id));
        }
        for &category_id in category_ids {
            let count = state.count_posts(category_id);
            if let Some(&i) = state.index.get(&category_id) {
                state.categories[i].category.post_count = count;
            }
        }
        id
    }

    /// Seed `count` posts without embeddings on one category.
    pub async fn add_posts(&self, category_id: Uuid, count: usize) -> Vec<Uuid> {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            ids.push(self.add_post(None, &[category_id]).await);
        }
        ids
    }

    /// Overwrite a category's denormalized count without touching edges.
    pub async fn set_post_count(&self, id: Uuid, post_count: i64) {
        let mut state = self.state.write().await;
        if let Some(&i) = state.index.get(&id) {
            state.categories[i].category.post_count = post_count;
        }
    }

    /// Make every write touching `id` (a category or a post) fail with
    /// `Error::Internal`.
    pub async fn fail_writes_to(&self, id: Uuid) {
        self.state.write().await.failing.insert(id);
    }

    /// Look up a category by id, including soft-deleted ones.
    pub async fn category_including_deleted(&self, id: Uuid) -> Option<(Category, bool)> {
        let state = self.state.read().await;
        state
            .stored(id)
            .map(|stored| (stored.category.clone(), stored.deleted))
    }

    /// Find an active category by exact name.
    pub async fn find_by_name(&self, name: &str) -> Option<Category> {
        let state = self.state.read().await;
        state
            .categories
            .iter()
            .find(|c| !c.deleted && c.category.name == name)
            .map(|c| c.category.clone())
    }

    /// Every edge of a post, including edges into soft-deleted categories.
    pub async fn all_edges_for_post(&self, post_id: Uuid) -> Vec<Uuid> {
        let state = self.state.read().await;
        state
            .edges
            .iter()
            .filter(|(p, _)| *p == post_id)
            .map(|(_, c)| *c)
            .collect()
    }

    /// Total number of post-category edges.
    pub async fn edge_count(&self) -> usize {
        self.state.read().await.edges.len()
    }
}

#[async_trait]
impl CategoryStore for InMemoryCategoryStore {
    async fn list_categories(&self) -> Result<Vec<Category>> {
        let state = self.state.read().await;
        Ok(state
            .categories
            .iter()
            .filter(|c| !c.deleted)
            .map(|c| c.category.clone())
            .collect())
    }

    async fn get_category(&self, id: Uuid) -> Result<Option<Category>> {
        let state = self.state.read().await;
        Ok(state
            .stored(id)
            .filter(|c| !c.deleted)
            .map(|c| c.category.clone()))
    }

    async fn create_category(&self, name: &str, description: Option<&str>) -> Result<Category> {
        let mut category = Category::new(name, 0);
        category.description = description.map(str::to_string);
        self.state
            .write()
            .await
            .insert_category(category.clone(), false);
        Ok(category)
    }

    async fn soft_delete_category(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_writable(id)?;
        match state.index.get(&id) {
            Some(&i) => {
                state.categories[i].deleted = true;
                Ok(())
            }
            None => Err(Error::CategoryNotFound(id)),
        }
    }

    async fn reassign_posts(&self, from: Uuid, to: Uuid) -> Result<u64> {
        if from == to {
            return Ok(0);
        }
        let mut state = self.state.write().await;
        state.check_writable(from)?;
        state.check_writable(to)?;

        let sources: Vec<(Uuid, Uuid)> = state
            .edges
            .iter()
            .filter(|(_, c)| *c == from)
            .copied()
            .collect();

        let mut moved = 0;
        for (post_id, _) in sources {
            state.edges.remove(&(post_id, from));
            if state.edges.insert((post_id, to)) {
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn set_category_parent(&self, child_id: Uuid, parent_id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        state.active_mut(child_id)?.parent_id = Some(parent_id);
        Ok(())
    }

    async fn set_category_is_parent(&self, id: Uuid, is_parent: bool) -> Result<()> {
        let mut state = self.state.write().await;
        state.active_mut(id)?.is_parent = is_parent;
        Ok(())
    }

    async fn rename_category(&self, id: Uuid, name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.active_mut(id)?.name = name.to_string();
        Ok(())
    }

    async fn update_category_embedding(&self, id: Uuid, embedding: Vector) -> Result<()> {
        let mut state = self.state.write().await;
        state.active_mut(id)?.embedding = Some(embedding);
        Ok(())
    }

    async fn refresh_post_count(&self, id: Uuid) -> Result<i64> {
        let mut state = self.state.write().await;
        let count = state.count_posts(id);
        match state.index.get(&id) {
            Some(&i) => {
                state.categories[i].category.post_count = count;
                Ok(count)
            }
            None => Err(Error::CategoryNotFound(id)),
        }
    }

    async fn posts_for_category(&self, id: Uuid) -> Result<Vec<Uuid>> {
        let state = self.state.read().await;
        let mut posts: Vec<Uuid> = state
            .edges
            .iter()
            .filter(|(_, c)| *c == id)
            .map(|(p, _)| *p)
            .collect();
        posts.sort();
        Ok(posts)
    }

    async fn categories_for_post(&self, post_id: Uuid) -> Result<Vec<Uuid>> {
        let state = self.state.read().await;
        Ok(state
            .edges
            .iter()
            .filter(|(p, c)| *p == post_id && state.stored(*c).is_some_and(|s| !s.deleted))
            .map(|(_, c)| *c)
            .collect())
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<Post>> {
        let stored = {
            let state = self.state.read().await;
            state.posts.get(&id).cloned()
        };
        let Some(stored) = stored else {
            return Ok(None);
        };
        Ok(Some(Post {
            id,
            category_ids: self.categories_for_post(id).await?,
            embedding: stored.embedding,
            hashtags: stored.hashtags,
        }))
    }

    async fn add_hashtag(&self, post_id: Uuid, hashtag: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_writable(post_id)?;
        let post = state
            .posts
            .get_mut(&post_id)
            .ok_or(Error::PostNotFound(post_id))?;
        if !post.hashtags.iter().any(|h| h == hashtag) {
            post.hashtags.push(hashtag.to_string());
        }
        Ok(())
    }

    async fn link_post(&self, post_id: Uuid, category_id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_writable(category_id)?;
        if !state.posts.contains_key(&post_id) {
            return Err(Error::PostNotFound(post_id));
        }
        if !state.index.contains_key(&category_id) {
            return Err(Error::CategoryNotFound(category_id));
        }
        state.edges.insert((post_id, category_id));
        Ok(())
    }

    async fn unlink_post(&self, post_id: Uuid, category_id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_writable(category_id)?;
        state.edges.remove(&(post_id, category_id));
        Ok(())
    }

    async fn unlink_posts(&self, post_ids: &[Uuid], category_id: Uuid) -> Result<u64> {
        let mut state = self.state.write().await;
        state.check_writable(category_id)?;
        let mut removed = 0;
        for &post_id in post_ids {
            if state.edges.remove(&(post_id, category_id)) {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn find_orphan_posts(&self, keep_ids: &[Uuid]) -> Result<Vec<Uuid>> {
        let state = self.state.read().await;
        let keep: HashSet<Uuid> = keep_ids.iter().copied().collect();

        let mut linked: BTreeSet<Uuid> = BTreeSet::new();
        let mut kept: HashSet<Uuid> = HashSet::new();
        for &(post_id, category_id) in &state.edges {
            linked.insert(post_id);
            if keep.contains(&category_id) {
                kept.insert(post_id);
            }
        }
        Ok(linked.into_iter().filter(|p| !kept.contains(p)).collect())
    }

    async fn snapshot(&self) -> Result<TaxonomySnapshot> {
        let state = self.state.read().await;

        let categories = state
            .categories
            .iter()
            .map(|s| CategoryRecord {
                id: s.category.id,
                name: s.category.name.clone(),
                description: s.category.description.clone(),
                post_count: s.category.post_count,
                is_parent: s.category.is_parent,
                parent_id: s.category.parent_id,
                deleted: s.deleted,
            })
            .collect();

        let memberships = state
            .edges
            .iter()
            .map(|&(post_id, category_id)| Membership {
                post_id,
                category_id,
            })
            .collect();

        let mut hashtags: Vec<PostHashtags> = state
            .posts
            .iter()
            .filter(|(_, p)| !p.hashtags.is_empty())
            .map(|(&post_id, p)| {
                let mut tags = p.hashtags.clone();
                tags.sort();
                PostHashtags {
                    post_id,
                    hashtags: tags,
                }
            })
            .collect();
        hashtags.sort_by_key(|h| h.post_id);

        Ok(TaxonomySnapshot {
            taken_at: Utc::now(),
            categories,
            memberships,
            hashtags,
        })
    }

    async fn restore_snapshot(&self, snapshot: &TaxonomySnapshot) -> Result<()> {
        let mut state = self.state.write().await;

        let known: HashSet<Uuid> = snapshot.categories.iter().map(|r| r.id).collect();
        for stored in state.categories.iter_mut() {
            if !known.contains(&stored.category.id) {
                stored.deleted = true;
                stored.category.is_parent = false;
                stored.category.parent_id = None;
            }
        }

        for record in &snapshot.categories {
            let restored = Category {
                id: record.id,
                name: record.name.clone(),
                description: record.description.clone(),
                post_count: record.post_count,
                embedding: None,
                is_parent: record.is_parent,
                parent_id: record.parent_id,
            };
            match state.index.get(&record.id) {
                Some(&i) => {
                    let embedding = state.categories[i].category.embedding.take();
                    state.categories[i] = StoredCategory {
                        category: Category {
                            embedding,
                            ..restored
                        },
                        deleted: record.deleted,
                    };
                }
                None => state.insert_category(restored, record.deleted),
            }
        }

        state.edges = snapshot
            .memberships
            .iter()
            .map(|m| (m.post_id, m.category_id))
            .collect();

        for post in state.posts.values_mut() {
            post.hashtags.clear();
        }
        for entry in &snapshot.hashtags {
            let post = state.posts.entry(entry.post_id).or_default();
            post.hashtags = entry.hashtags.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_post_refreshes_counts() {
        let store = InMemoryCategoryStore::new();
        let travel = store.add_category("Travel").await;
        store.add_posts(travel, 3).await;

        let category = store.get_category(travel).await.unwrap().unwrap();
        assert_eq!(category.post_count, 3);
    }

    #[tokio::test]
    async fn test_soft_delete_hides_but_keeps_edges() {
        let store = InMemoryCategoryStore::new();
        let food = store.add_category("Food").await;
        let post = store.add_post(None, &[food]).await;

        store.soft_delete_category(food).await.unwrap();

        assert!(store.get_category(food).await.unwrap().is_none());
        assert!(store.list_categories().await.unwrap().is_empty());
        assert!(store.categories_for_post(post).await.unwrap().is_empty());
        assert_eq!(store.all_edges_for_post(post).await, vec![food]);
        let (_, deleted) = store.category_including_deleted(food).await.unwrap();
        assert!(deleted);
    }

    #[tokio::test]
    async fn test_reassign_posts_is_idempotent() {
        let store = InMemoryCategoryStore::new();
        let keep = store.add_category("Outfits").await;
        let merge = store.add_category("outfit").await;
        let shared = store.add_post(None, &[keep, merge]).await;
        let only_merge = store.add_post(None, &[merge]).await;

        let moved = store.reassign_posts(merge, keep).await.unwrap();
        assert_eq!(moved, 1);
        let edges_after_first = store.edge_count().await;

        let moved_again = store.reassign_posts(merge, keep).await.unwrap();
        assert_eq!(moved_again, 0);
        assert_eq!(store.edge_count().await, edges_after_first);

        assert_eq!(store.all_edges_for_post(shared).await, vec![keep]);
        assert_eq!(store.all_edges_for_post(only_merge).await, vec![keep]);
        assert_eq!(store.refresh_post_count(keep).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reassign_to_self_is_noop() {
        let store = InMemoryCategoryStore::new();
        let a = store.add_category("A").await;
        store.add_posts(a, 2).await;
        assert_eq!(store.reassign_posts(a, a).await.unwrap(), 0);
        assert_eq!(store.posts_for_category(a).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_find_orphan_posts() {
        let store = InMemoryCategoryStore::new();
        let keep = store.add_category("Keep").await;
        let gone = store.add_category("Gone").await;

        let survivor = store.add_post(None, &[keep, gone]).await;
        let orphan = store.add_post(None, &[gone]).await;
        let _never_linked = store.add_post(None, &[]).await;

        let orphans = store.find_orphan_posts(&[keep]).await.unwrap();
        assert_eq!(orphans, vec![orphan]);
        assert!(!orphans.contains(&survivor));
    }

    #[tokio::test]
    async fn test_add_hashtag_is_idempotent() {
        let store = InMemoryCategoryStore::new();
        let post = store.add_post(None, &[]).await;
        store.add_hashtag(post, "StreetFood").await.unwrap();
        store.add_hashtag(post, "StreetFood").await.unwrap();

        let post = store.get_post(post).await.unwrap().unwrap();
        assert_eq!(post.hashtags, vec!["StreetFood"]);
    }

    #[tokio::test]
    async fn test_unlink_posts_counts_removed() {
        let store = InMemoryCategoryStore::new();
        let parent = store.add_category("Parent").await;
        let posts = store.add_posts(parent, 3).await;
        let removed = store.unlink_posts(&posts[..2], parent).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.posts_for_category(parent).await.unwrap(), vec![posts[2]]);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = InMemoryCategoryStore::new();
        let broken = store.add_category("Broken").await;
        store.fail_writes_to(broken).await;
        assert!(matches!(
            store.rename_category(broken, "Fixed").await,
            Err(Error::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_restore_round_trip() {
        let store = InMemoryCategoryStore::new();
        let a = store.add_category("A").await;
        let b = store.add_category("B").await;
        let post = store.add_post(None, &[a]).await;
        let before = store.snapshot().await.unwrap();

        store.reassign_posts(a, b).await.unwrap();
        store.soft_delete_category(a).await.unwrap();
        store.add_hashtag(post, "A").await.unwrap();
        let extra = store.create_category("Extra", None).await.unwrap();

        store.restore_snapshot(&before).await.unwrap();

        assert!(store.get_category(a).await.unwrap().is_some());
        assert!(store.get_category(extra.id).await.unwrap().is_none());
        assert_eq!(store.all_edges_for_post(post).await, vec![a]);
        assert!(store.get_post(post).await.unwrap().unwrap().hashtags.is_empty());
    }
}
