//! Persisted device-configuration profiles
//!
//! One JSON file per profile in the profile directory; the active-profile
//! pointer lives in the durable key-value store so it survives profile
//! edits. The in-memory cache is rebuilt lazily on first access, which
//! also makes file-drop authoring work: drop a valid JSON file in the
//! directory before startup and it is a profile.

use crate::error::CameraError;
use crate::profile::{ConfigProfile, Detection, ProfileSummary, ProfileType};
use crate::types::SettingsMap;
use common::kv::JsonKvStore;
use common::validation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

const ACTIVE_PROFILE_KEY: &str = "active_profile_id";

/// Incoming profile data for create/update. Every field optional so
/// updates can patch a subset; `create` insists on a name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileDraft {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub profile_type: Option<ProfileType>,
    pub detection: Option<Detection>,
    pub settings: Option<SettingsMap>,
    pub advanced: Option<SettingsMap>,
}

pub struct ProfileStore {
    dir: PathBuf,
    kv: Arc<JsonKvStore>,
    cache: RwLock<Option<Vec<ConfigProfile>>>,
}

impl ProfileStore {
    pub fn open(dir: impl Into<PathBuf>, kv: Arc<JsonKvStore>) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            kv,
            cache: RwLock::new(None),
        })
    }

    pub async fn list(&self) -> Vec<ProfileSummary> {
        let active = self.active_id().await;
        self.snapshot()
            .await
            .iter()
            .map(|p| ProfileSummary {
                id: p.id.clone(),
                name: p.name.clone(),
                profile_type: p.profile_type,
                active: active.as_deref() == Some(p.id.as_str()),
            })
            .collect()
    }

    pub async fn get(&self, id: &str) -> Option<ConfigProfile> {
        self.snapshot().await.into_iter().find(|p| p.id == id)
    }

    /// Full profile set in listed order, for the matcher
    pub async fn candidates(&self) -> Vec<ConfigProfile> {
        self.snapshot().await
    }

    pub async fn create(&self, draft: ProfileDraft) -> Result<String, CameraError> {
        let name = draft
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CameraError::Validation("profile name is required".to_string()))?
            .to_string();
        validation::validate_name(&name, "profile name")
            .map_err(|e| CameraError::Validation(e.to_string()))?;

        let mut cache = self.cache.write().await;
        let profiles = cache.get_or_insert_with(|| self.load_from_disk());
        let id = unique_slug(&name, profiles);
        let profile = ConfigProfile {
            id: id.clone(),
            name,
            profile_type: draft.profile_type.unwrap_or(ProfileType::Webcam),
            detection: draft.detection.unwrap_or_else(Detection::auto),
            settings: draft.settings.unwrap_or_default(),
            advanced: draft.advanced.unwrap_or_default(),
        };
        self.persist(&profile)?;
        profiles.push(profile);
        info!(profile_id = %id, "profile created");
        Ok(id)
    }

    pub async fn update(&self, id: &str, draft: ProfileDraft) -> Result<(), CameraError> {
        let mut cache = self.cache.write().await;
        let profiles = cache.get_or_insert_with(|| self.load_from_disk());
        let profile = profiles
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| CameraError::NotFound(format!("profile {id}")))?;

        if let Some(name) = draft.name {
            validation::validate_name(&name, "profile name")
                .map_err(|e| CameraError::Validation(e.to_string()))?;
            // the id stays filesystem-stable across renames
            profile.name = name;
        }
        if let Some(profile_type) = draft.profile_type {
            profile.profile_type = profile_type;
        }
        if let Some(detection) = draft.detection {
            profile.detection = detection;
        }
        if let Some(settings) = draft.settings {
            profile.settings = settings;
        }
        if let Some(advanced) = draft.advanced {
            profile.advanced = advanced;
        }
        self.persist(profile)?;
        info!(profile_id = %id, "profile updated");
        Ok(())
    }

    /// Delete a profile. Deleting the active profile promotes the first
    /// remaining profile, or clears the pointer when none is left.
    pub async fn delete(&self, id: &str) -> Result<(), CameraError> {
        let mut cache = self.cache.write().await;
        let profiles = cache.get_or_insert_with(|| self.load_from_disk());
        let index = profiles
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| CameraError::NotFound(format!("profile {id}")))?;
        profiles.remove(index);

        let path = self.profile_path(id);
        if let Err(e) = fs::remove_file(&path) {
            warn!(file = %path.display(), error = %e, "failed to remove profile file");
        }

        if self.active_id().await.as_deref() == Some(id) {
            match profiles.first() {
                Some(next) => {
                    self.kv
                        .set(ACTIVE_PROFILE_KEY, Value::String(next.id.clone()))
                        .await
                        .map_err(|e| CameraError::Settings(e.to_string()))?;
                    info!(profile_id = %next.id, "active profile reassigned");
                }
                None => {
                    self.kv
                        .remove(ACTIVE_PROFILE_KEY)
                        .await
                        .map_err(|e| CameraError::Settings(e.to_string()))?;
                    info!("active profile cleared");
                }
            }
        }
        info!(profile_id = %id, "profile deleted");
        Ok(())
    }

    pub async fn get_active(&self) -> Option<ConfigProfile> {
        let id = self.active_id().await?;
        self.get(&id).await
    }

    pub async fn set_active(&self, id: &str) -> Result<(), CameraError> {
        if self.get(id).await.is_none() {
            return Err(CameraError::NotFound(format!("profile {id}")));
        }
        self.kv
            .set(ACTIVE_PROFILE_KEY, Value::String(id.to_string()))
            .await
            .map_err(|e| CameraError::Settings(e.to_string()))?;
        info!(profile_id = %id, "active profile set");
        Ok(())
    }

    async fn active_id(&self) -> Option<String> {
        self.kv.get_str(ACTIVE_PROFILE_KEY).await
    }

    async fn snapshot(&self) -> Vec<ConfigProfile> {
        let mut cache = self.cache.write().await;
        cache.get_or_insert_with(|| self.load_from_disk()).clone()
    }

    /// Scan the profile directory. Unparseable files are skipped with a
    /// warning so one bad drop never takes the store down.
    fn load_from_disk(&self) -> Vec<ConfigProfile> {
        let mut out = Vec::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "cannot read profile directory");
                return out;
            }
        };
        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        paths.sort();
        for path in paths {
            match fs::read_to_string(&path) {
                Ok(raw) => match serde_json::from_str::<ConfigProfile>(&raw) {
                    Ok(profile) => out.push(profile),
                    Err(e) => warn!(file = %path.display(), error = %e, "skipping invalid profile"),
                },
                Err(e) => warn!(file = %path.display(), error = %e, "failed to read profile"),
            }
        }
        out
    }

    fn profile_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn persist(&self, profile: &ConfigProfile) -> Result<(), CameraError> {
        let raw = serde_json::to_string_pretty(profile)
            .map_err(|e| CameraError::Settings(e.to_string()))?;
        fs::write(self.profile_path(&profile.id), raw).map_err(|e| {
            CameraError::Settings(format!("failed to persist profile {}: {e}", profile.id))
        })
    }
}

fn unique_slug(name: &str, existing: &[ConfigProfile]) -> String {
    let base = validation::slugify(name);
    if !existing.iter().any(|p| p.id == base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if !existing.iter().any(|p| p.id == candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::DetectionRule;
    use serde_json::json;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> ProfileStore {
        let kv = Arc::new(JsonKvStore::open(dir.path().join("settings.json")).unwrap());
        ProfileStore::open(dir.path().join("profiles"), kv).unwrap()
    }

    fn webcam_draft(name: &str) -> ProfileDraft {
        ProfileDraft {
            name: Some(name.to_string()),
            profile_type: Some(ProfileType::Webcam),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_requires_a_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let err = store.create(ProfileDraft::default()).await.unwrap_err();
        assert!(matches!(err, CameraError::Validation(_)));
    }

    #[tokio::test]
    async fn create_generates_unique_slugs() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let first = store.create(webcam_draft("My Camera")).await.unwrap();
        let second = store.create(webcam_draft("My Camera")).await.unwrap();
        assert_eq!(first, "my-camera");
        assert_eq!(second, "my-camera-2");
        assert!(dir.path().join("profiles/my-camera-2.json").is_file());
    }

    #[tokio::test]
    async fn update_round_trips_every_present_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let id = store.create(webcam_draft("Booth Cam")).await.unwrap();

        let detection = Detection {
            rule: DetectionRule::BrandModel {
                brand: "Canon".into(),
                model_pattern: "EOS*".into(),
            },
            priority: 5,
        };
        let settings = SettingsMap::from([("frame_rate".to_string(), json!(15))]);
        store
            .update(
                &id,
                ProfileDraft {
                    name: Some("Booth Cam v2".into()),
                    profile_type: Some(ProfileType::TetheredPtp),
                    detection: Some(detection.clone()),
                    settings: Some(settings.clone()),
                    advanced: None,
                },
            )
            .await
            .unwrap();

        let profile = store.get(&id).await.unwrap();
        assert_eq!(profile.name, "Booth Cam v2");
        assert_eq!(profile.profile_type, ProfileType::TetheredPtp);
        assert_eq!(profile.detection, detection);
        assert_eq!(profile.settings, settings);
        assert_eq!(profile.id, id, "id stays stable across renames");
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let err = store
            .update("ghost", webcam_draft("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, CameraError::NotFound(_)));
    }

    #[tokio::test]
    async fn deleting_active_profile_promotes_a_survivor() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let a = store.create(webcam_draft("Cam A")).await.unwrap();
        let b = store.create(webcam_draft("Cam B")).await.unwrap();
        store.set_active(&a).await.unwrap();

        store.delete(&a).await.unwrap();

        let active = store.get_active().await.unwrap();
        assert_eq!(active.id, b);
        let summaries = store.list().await;
        assert_eq!(summaries.iter().filter(|s| s.active).count(), 1);
    }

    #[tokio::test]
    async fn deleting_last_profile_clears_active() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let id = store.create(webcam_draft("Only Cam")).await.unwrap();
        store.set_active(&id).await.unwrap();
        store.delete(&id).await.unwrap();
        assert!(store.get_active().await.is_none());
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn set_active_unknown_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let err = store.set_active("ghost").await.unwrap_err();
        assert!(matches!(err, CameraError::NotFound(_)));
    }

    #[tokio::test]
    async fn profiles_survive_reopen_and_file_drops_load() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = store_in(&dir);
            store.create(webcam_draft("Persisted")).await.unwrap();
        }
        // author a profile by dropping a file next to the persisted one
        let dropped = serde_json::json!({
            "id": "dropped",
            "name": "Dropped In",
            "type": "tethered_ptp",
            "detection": {"rule": "auto"},
        });
        fs::write(
            dir.path().join("profiles/dropped.json"),
            serde_json::to_string_pretty(&dropped).unwrap(),
        )
        .unwrap();
        // and a bad drop that must be skipped
        fs::write(dir.path().join("profiles/broken.json"), "{oops").unwrap();

        let store = store_in(&dir);
        let ids: Vec<String> = store.list().await.into_iter().map(|s| s.id).collect();
        assert!(ids.contains(&"persisted".to_string()));
        assert!(ids.contains(&"dropped".to_string()));
        assert_eq!(ids.len(), 2);
    }
}
