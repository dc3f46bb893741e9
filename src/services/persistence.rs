use crate::core::error::PersistenceError;
use crate::core::io::Storage;
use crate::core::model::{GenerationResult, Selection, Session, StoryRecord};
use crate::core::ServiceBounds;
use crate::services::auth::AuthContext;
use crate::utils::id::random_hex;
use async_trait::async_trait;
use log::{info, warn};
use std::fmt::Debug;
use std::sync::Arc;

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait StoryStore: ServiceBounds + Debug {
    async fn insert(
        &self,
        session: &Session,
        record: StoryRecord,
    ) -> Result<StoryRecord, PersistenceError>;
    async fn list(&self, session: &Session) -> Result<Vec<StoryRecord>, PersistenceError>;
}

pub async fn save_story(
    auth: &AuthContext,
    store: &dyn StoryStore,
    selection: &Selection,
    result: &GenerationResult,
) -> Result<StoryRecord, PersistenceError> {
    let session = auth.session().ok_or(PersistenceError::NotSignedIn)?;
    let record = StoryRecord::from_result(&session.user, selection, result);
    let saved = store.insert(session, record).await?;
    info!(
        "Saved story {:?} for {}",
        saved.title,
        session.user.display_name()
    );
    Ok(saved)
}

#[derive(Clone)]
pub struct LocalStoryStore {
    storage: Arc<dyn Storage>,
    folder: String,
}

impl Debug for LocalStoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStoryStore")
            .field("folder", &self.folder)
            .finish()
    }
}

impl LocalStoryStore {
    pub fn new(storage: Arc<dyn Storage>, folder: impl Into<String>) -> Self {
        Self {
            storage,
            folder: folder.into(),
        }
    }

    fn user_dir(&self, session: &Session) -> String {
        format!("{}/{}", self.folder, session.user.id)
    }
}

fn storage_error(e: anyhow::Error) -> PersistenceError {
    PersistenceError::Storage(format!("{:#}", e))
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl StoryStore for LocalStoryStore {
    async fn insert(
        &self,
        session: &Session,
        mut record: StoryRecord,
    ) -> Result<StoryRecord, PersistenceError> {
        if record.user_id != session.user.id {
            return Err(PersistenceError::Rejected {
                status: 403,
                message: "record belongs to another user".to_string(),
            });
        }
        let id = record.id.get_or_insert_with(|| random_hex(16)).clone();
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        self.storage
            .write(&format!("{}/{}.json", self.user_dir(session), id), &json)
            .await
            .map_err(storage_error)?;
        Ok(record)
    }

    async fn list(&self, session: &Session) -> Result<Vec<StoryRecord>, PersistenceError> {
        let keys = self
            .storage
            .list(&self.user_dir(session))
            .await
            .map_err(storage_error)?;

        let mut records = Vec::new();
        for key in keys.iter().filter(|k| k.ends_with(".json")) {
            let bytes = self.storage.read(key).await.map_err(storage_error)?;
            match serde_json::from_slice::<StoryRecord>(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable story {}: {}", key, e),
            }
        }
        records.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(records)
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::core::io::NativeStorage;
    use crate::core::model::{ContentSource, Style, Theme, Topic, User};
    use crate::services::auth::LocalAuthProvider;
    use tempfile::tempdir;
    use url::Url;

    fn selection(topic: &str) -> Selection {
        Selection {
            theme: Theme::Bedtime,
            style: Style::Ghibli,
            topic: Topic::parse(topic).unwrap(),
        }
    }

    fn result(topic: &str) -> GenerationResult {
        GenerationResult {
            title: topic.to_string(),
            text: format!("A story about {}.", topic),
            media_ref: "https://example.com/story.mp4".parse().unwrap(),
            image: Some(crate::core::model::MediaRef::inline_base64("image/png", b"png")),
            thumbnail_ref: Url::parse("https://example.com/thumb.jpg").unwrap(),
            attempt: 1,
            source: ContentSource::Generated,
        }
    }

    fn session(id: &str) -> Session {
        Session {
            user: User {
                id: id.to_string(),
                email: format!("{}@example.com", id),
                name: None,
            },
            access_token: "token".to_string(),
        }
    }

    #[tokio::test]
    async fn test_save_requires_user() {
        let dir = tempdir().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(NativeStorage::new(dir.path()));
        let auth = AuthContext::new(Arc::new(LocalAuthProvider::new(storage.clone(), "stories")));
        let store = LocalStoryStore::new(storage, "stories");

        let err = save_story(&auth, &store, &selection("Forest Friends"), &result("Forest Friends"))
            .await
            .unwrap_err();
        assert_eq!(err, PersistenceError::NotSignedIn);
    }

    #[tokio::test]
    async fn test_save_and_list_per_user() {
        let dir = tempdir().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(NativeStorage::new(dir.path()));
        let mut auth = AuthContext::new(Arc::new(LocalAuthProvider::new(storage.clone(), "stories")));
        let store = LocalStoryStore::new(storage, "stories");
        assert!(auth.signup("reader@example.com", "Ada", "secret1").await);

        let saved = save_story(&auth, &store, &selection("Forest Friends"), &result("Forest Friends"))
            .await
            .unwrap();
        save_story(&auth, &store, &selection("Dream Castle"), &result("Dream Castle"))
            .await
            .unwrap();
        assert!(saved.id.is_some());
        assert_eq!(saved.topic, "Forest Friends");
        assert_eq!(saved.thumbnail.as_str(), "https://example.com/thumb.jpg");

        let current = auth.session().unwrap();
        let listed = store.list(current).await.unwrap();
        let titles: Vec<&str> = listed.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Dream Castle", "Forest Friends"]);
        assert_eq!(listed[1], saved);
        assert!(listed[1].image.as_ref().unwrap().is_inline());

        assert!(store.list(&session("someone-else")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_record_rejected() {
        let dir = tempdir().unwrap();
        let store = LocalStoryStore::new(Arc::new(NativeStorage::new(dir.path())), "stories");
        let owner = session("owner");
        let record = StoryRecord::from_result(
            &owner.user,
            &selection("Dream Castle"),
            &result("Dream Castle"),
        );
        let err = store.insert(&session("intruder"), record).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Rejected { status: 403, .. }));
    }
}
