use crate::{NewPost, Post, PostStoreError, ValidPost};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct Database {
    next_id: u64,
    posts: Vec<Post>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            next_id: 1,
            posts: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl Database {
    /// Never hands out an id already present in the file.
    fn allocate_id(&mut self) -> u64 {
        let after_max = self.posts.iter().map(|p| p.id).max().map_or(1, |id| id + 1);
        let id = self.next_id.max(after_max);
        self.next_id = id + 1;
        id
    }
}

/// Flat-file post storage. Every operation reads the document from disk; writes
/// go through a temporary file and a rename.
pub struct PostStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl PostStore {
    /// Open the store, creating an empty document when the file is absent.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, PostStoreError> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let store = Self {
            path,
            lock: Mutex::new(()),
        };

        if !fs::try_exists(&store.path).await? {
            tracing::info!(path = %store.path.display(), "Creating empty posts file");
            store.save(&Database::default()).await?;
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All posts, newest first.
    pub async fn list(&self) -> Result<Vec<Post>, PostStoreError> {
        let _guard = self.lock.lock().await;
        let mut posts = self.load().await?.posts;
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts)
    }

    pub async fn get(&self, id: u64) -> Result<Option<Post>, PostStoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.posts.into_iter().find(|p| p.id == id))
    }

    /// Validate and append a post, assigning the next id.
    pub async fn create(&self, new_post: &NewPost) -> Result<Post, PostStoreError> {
        let valid = new_post.validate()?;
        self.insert(valid).await
    }

    /// Append already validated fields.
    #[tracing::instrument(skip_all)]
    pub async fn insert(&self, valid: ValidPost) -> Result<Post, PostStoreError> {
        let _guard = self.lock.lock().await;

        let mut db = self.load().await?;
        let id = db.allocate_id();

        let post = valid.into_post(id, Utc::now());
        db.posts.push(post.clone());
        self.save(&db).await?;

        tracing::info!(id, "Post created");
        Ok(post)
    }

    async fn load(&self) -> Result<Database, PostStoreError> {
        let raw = fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn save(&self, db: &Database) -> Result<(), PostStoreError> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let json = serde_json::to_vec_pretty(db)?;
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
