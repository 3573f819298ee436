//! Continuous preview production (MJPEG-style frame pump)
//!
//! One spawned producer per stream: each iteration pulls a single frame
//! from the active device, paced to ~30 fps. A failed read backs off
//! briefly and retries — transient hardware errors degrade the stream,
//! they never end it. The loop stops promptly when the cancellation
//! token fires, when the consumer drops the receiver, or when the active
//! device goes away.

use crate::error::CameraError;
use crate::registry::DeviceRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Target pacing for the stream (~30 fps)
pub const FRAME_INTERVAL: Duration = Duration::from_millis(33);
/// Backoff after a failed frame read
pub const ERROR_BACKOFF: Duration = Duration::from_millis(300);
pub(crate) const CHANNEL_DEPTH: usize = 4;

/// Handle to a running preview stream. Dropping it (or calling `stop`)
/// cancels the producer promptly.
#[derive(Debug)]
pub struct PreviewStream {
    pub frames: mpsc::Receiver<Vec<u8>>,
    cancel: CancellationToken,
}

impl PreviewStream {
    pub(crate) fn new(frames: mpsc::Receiver<Vec<u8>>, cancel: CancellationToken) -> Self {
        Self { frames, cancel }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for PreviewStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub(crate) async fn run_preview_loop(
    registry: Arc<DeviceRegistry>,
    tx: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
) {
    info!("preview stream started");
    let mut interval = time::interval(FRAME_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("preview stream stopped");
                return;
            }
            _ = interval.tick() => {
                match registry.preview_frame().await {
                    Ok(frame) => match tx.try_send(frame) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            debug!("preview consumer lagging, frame dropped");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            info!("preview consumer went away, stopping stream");
                            return;
                        }
                    },
                    Err(CameraError::NoActiveDevice) => {
                        info!("active device cleared, stopping preview stream");
                        return;
                    }
                    Err(e) => {
                        debug!(error = %e, "preview frame failed, backing off");
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                info!("preview stream stopped");
                                return;
                            }
                            _ = time::sleep(ERROR_BACKOFF) => {}
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        Backends, FrameConfig, FrameSession, RawFrame, WebcamBackend,
    };
    use crate::store::ProfileStore;
    use crate::types::{DeviceKind, HardwareFacts};
    use common::kv::JsonKvStore;
    use common::paths::AppPaths;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::timeout;

    /// Fails the first `failures` grabs, then produces frames forever
    struct FlakyBackend {
        failures: Arc<AtomicU32>,
    }

    impl WebcamBackend for FlakyBackend {
        fn name(&self) -> &'static str {
            "flaky"
        }
        fn enumerate(&self) -> Result<Vec<HardwareFacts>, CameraError> {
            Ok(vec![HardwareFacts {
                vendor: "Flaky".into(),
                model: "Flaky Cam".into(),
                product: "Flaky Cam".into(),
                kind: DeviceKind::Webcam,
                address: "flaky-0".into(),
                serial: None,
            }])
        }
        fn open(
            &self,
            _facts: &HardwareFacts,
            _config: &FrameConfig,
        ) -> Result<Box<dyn FrameSession>, CameraError> {
            Ok(Box::new(FlakySession {
                failures: self.failures.clone(),
            }))
        }
    }

    struct FlakySession {
        failures: Arc<AtomicU32>,
    }

    impl FrameSession for FlakySession {
        fn configure(&mut self, _config: &FrameConfig) -> Result<(), CameraError> {
            Ok(())
        }
        fn grab_frame(&mut self, _timeout: Duration) -> Result<RawFrame, CameraError> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(CameraError::Preview("simulated native timeout".into()));
            }
            Ok(RawFrame {
                width: 32,
                height: 24,
                pixels: vec![128u8; 32 * 24 * 3],
            })
        }
    }

    async fn flaky_registry(failures: u32) -> (Arc<DeviceRegistry>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let paths = Arc::new(AppPaths::under_root(dir.path()).unwrap());
        let kv = Arc::new(JsonKvStore::open(paths.settings_file()).unwrap());
        let profiles = Arc::new(ProfileStore::open(paths.profiles_dir(), kv).unwrap());
        let backends = Backends::default().with_webcam(Arc::new(FlakyBackend {
            failures: Arc::new(AtomicU32::new(failures)),
        }));
        (Arc::new(DeviceRegistry::new(backends, profiles, paths)), dir)
    }

    #[tokio::test]
    async fn stream_survives_five_consecutive_failures() {
        let (registry, _dir) = flaky_registry(5).await;
        let summaries = registry.enumerate().await;
        registry.connect(&summaries[0].id).await.unwrap();

        let mut stream = Arc::clone(&registry).start_preview_stream().await.unwrap();
        // 5 failures cost ~1.5s of backoff; the loop must still be
        // running and delivering frames afterwards
        let frame = timeout(Duration::from_secs(10), stream.frames.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&frame[..2], &[0xff, 0xd8]);
    }

    #[tokio::test]
    async fn stream_requires_an_active_device() {
        let (registry, _dir) = flaky_registry(0).await;
        registry.enumerate().await;
        let err = Arc::clone(&registry)
            .start_preview_stream()
            .await
            .unwrap_err();
        assert!(matches!(err, CameraError::NoActiveDevice));
    }

    #[tokio::test]
    async fn disconnect_stops_the_stream() {
        let (registry, _dir) = flaky_registry(0).await;
        let summaries = registry.enumerate().await;
        registry.connect(&summaries[0].id).await.unwrap();

        let mut stream = Arc::clone(&registry).start_preview_stream().await.unwrap();
        timeout(Duration::from_secs(5), stream.frames.recv())
            .await
            .unwrap()
            .unwrap();

        registry.disconnect(None).await.unwrap();
        // the channel drains and then closes
        let closed = timeout(Duration::from_secs(5), async {
            while stream.frames.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok(), "stream did not end after disconnect");
    }

    #[tokio::test]
    async fn starting_a_new_stream_cancels_the_previous_one() {
        let (registry, _dir) = flaky_registry(0).await;
        let summaries = registry.enumerate().await;
        registry.connect(&summaries[0].id).await.unwrap();

        let mut first = Arc::clone(&registry).start_preview_stream().await.unwrap();
        let mut second = Arc::clone(&registry).start_preview_stream().await.unwrap();

        let first_closed = timeout(Duration::from_secs(5), async {
            while first.frames.recv().await.is_some() {}
        })
        .await;
        assert!(first_closed.is_ok(), "first stream must be cancelled");

        let frame = timeout(Duration::from_secs(5), second.frames.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&frame[..2], &[0xff, 0xd8]);
    }
}
