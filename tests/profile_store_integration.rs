use anyhow::Result;
use camera_service::{CameraError, ProfileDraft, ProfileStore, ProfileType};
use common::kv::JsonKvStore;
use common::paths::AppPaths;
use serde_json::json;
use std::sync::Arc;

fn store_under(root: &std::path::Path) -> Result<ProfileStore> {
    let paths = AppPaths::under_root(root)?;
    let kv = Arc::new(JsonKvStore::open(paths.settings_file())?);
    Ok(ProfileStore::open(paths.profiles_dir(), kv)?)
}

#[tokio::test]
async fn profile_lifecycle_end_to_end() -> Result<()> {
    let root = tempfile::tempdir()?;
    let store = store_under(root.path())?;

    // create
    let id = store
        .create(ProfileDraft {
            name: Some("Front Desk Cam".into()),
            profile_type: Some(ProfileType::Webcam),
            settings: Some(std::collections::HashMap::from([(
                "frame_rate".to_string(),
                json!(30),
            )])),
            ..Default::default()
        })
        .await?;
    assert_eq!(id, "front-desk-cam");

    // activate and read back
    store.set_active(&id).await?;
    assert_eq!(store.get_active().await.map(|p| p.id), Some(id.clone()));

    // update patches only the fields present
    store
        .update(
            &id,
            ProfileDraft {
                settings: Some(std::collections::HashMap::from([(
                    "frame_rate".to_string(),
                    json!(60),
                )])),
                ..Default::default()
            },
        )
        .await?;
    let profile = store.get(&id).await.expect("profile exists");
    assert_eq!(profile.name, "Front Desk Cam");
    assert_eq!(profile.settings.get("frame_rate"), Some(&json!(60)));

    // delete clears the active pointer when nothing remains
    store.delete(&id).await?;
    assert!(store.get_active().await.is_none());
    assert!(matches!(
        store.delete(&id).await.unwrap_err(),
        CameraError::NotFound(_)
    ));
    Ok(())
}

#[tokio::test]
async fn active_pointer_survives_process_restart() -> Result<()> {
    let root = tempfile::tempdir()?;
    let id = {
        let store = store_under(root.path())?;
        let id = store
            .create(ProfileDraft {
                name: Some("Persistent".into()),
                profile_type: Some(ProfileType::TetheredPtp),
                ..Default::default()
            })
            .await?;
        store.set_active(&id).await?;
        id
    };

    // a fresh store over the same directory sees the same state
    let reopened = store_under(root.path())?;
    let active = reopened.get_active().await.expect("active profile");
    assert_eq!(active.id, id);
    assert_eq!(active.profile_type, ProfileType::TetheredPtp);
    Ok(())
}
