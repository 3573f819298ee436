use anyhow::Result;
use camera_service::backend::virtual_cam::VirtualWebcamBackend;
use camera_service::{Backends, DeviceRegistry, ProfileStore};
use common::kv::JsonKvStore;
use common::paths::AppPaths;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

async fn connected_registry(root: &std::path::Path) -> Result<Arc<DeviceRegistry>> {
    let paths = Arc::new(AppPaths::under_root(root)?);
    let kv = Arc::new(JsonKvStore::open(paths.settings_file())?);
    let profiles = Arc::new(ProfileStore::open(paths.profiles_dir(), kv)?);
    let backends = Backends::default().with_webcam(Arc::new(VirtualWebcamBackend));
    let registry = Arc::new(DeviceRegistry::new(backends, profiles, paths));
    let id = registry.enumerate().await[0].id.clone();
    registry.connect(&id).await?;
    Ok(registry)
}

#[tokio::test]
async fn continuous_preview_delivers_paced_jpeg_frames() -> Result<()> {
    let root = tempfile::tempdir()?;
    let registry = connected_registry(root.path()).await?;

    let mut stream = Arc::clone(&registry).start_preview_stream().await?;
    for _ in 0..3 {
        let frame = timeout(Duration::from_secs(5), stream.frames.recv())
            .await?
            .expect("stream ended early");
        assert_eq!(&frame[..2], &[0xff, 0xd8]);
    }
    stream.stop();
    Ok(())
}

#[tokio::test]
async fn dropping_the_consumer_ends_the_producer() -> Result<()> {
    let root = tempfile::tempdir()?;
    let registry = connected_registry(root.path()).await?;

    let stream = Arc::clone(&registry).start_preview_stream().await?;
    drop(stream);

    // the producer observes the cancellation and lets go of the device;
    // a fresh stream starts cleanly afterwards
    let mut replacement = Arc::clone(&registry).start_preview_stream().await?;
    let frame = timeout(Duration::from_secs(5), replacement.frames.recv())
        .await?
        .expect("replacement stream should produce frames");
    assert!(!frame.is_empty());
    Ok(())
}
