use anyhow::bail;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

use super::bulb::{BulbFeatures, BulbPilot, BulbTransport, PilotCommand};
use super::cast::{CastStatus, CastTransport, MediaStatus};
use domain::PlaybackState;

/// Simulated cast receiver transport.
///
/// Behaves like a receiver that echoes every accepted command back as a
/// pushed status report. Tests and the demo mode can inject arbitrary
/// status or force failures.
pub struct SimCastTransport {
    status: Mutex<CastStatus>,
    tx: broadcast::Sender<CastStatus>,
    failing: AtomicBool,
}

impl SimCastTransport {
    pub fn new() -> Self {
        Self::with_status(CastStatus::idle())
    }

    pub fn with_status(status: CastStatus) -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            status: Mutex::new(status),
            tx,
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Inject a status report as if the receiver pushed it.
    pub fn push_status(&self, status: CastStatus) {
        *self.status.lock() = status.clone();
        let _ = self.tx.send(status);
    }

    pub fn status(&self) -> CastStatus {
        self.status.lock().clone()
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("simulated transport failure");
        }
        Ok(())
    }

    fn mutate_and_push(&self, mutate: impl FnOnce(&mut CastStatus)) {
        let status = {
            let mut status = self.status.lock();
            mutate(&mut status);
            status.clone()
        };
        let _ = self.tx.send(status);
    }
}

impl Default for SimCastTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CastTransport for SimCastTransport {
    async fn connect(&self) -> anyhow::Result<CastStatus> {
        self.check()?;
        Ok(self.status.lock().clone())
    }

    async fn disconnect(&self) {}

    async fn fetch_status(&self) -> anyhow::Result<CastStatus> {
        self.check()?;
        Ok(self.status.lock().clone())
    }

    async fn set_volume(&self, level: f64) -> anyhow::Result<()> {
        self.check()?;
        self.mutate_and_push(|status| status.volume_level = level.clamp(0.0, 1.0));
        Ok(())
    }

    async fn quit_app(&self) -> anyhow::Result<()> {
        self.check()?;
        self.mutate_and_push(|status| {
            status.app_id = None;
            status.media = None;
        });
        Ok(())
    }

    async fn play(&self) -> anyhow::Result<()> {
        self.check()?;
        self.mutate_and_push(|status| {
            if let Some(media) = &mut status.media {
                media.playback_state = PlaybackState::Playing;
            }
        });
        Ok(())
    }

    async fn pause(&self) -> anyhow::Result<()> {
        self.check()?;
        self.mutate_and_push(|status| {
            if let Some(media) = &mut status.media {
                media.playback_state = PlaybackState::Paused;
            }
        });
        Ok(())
    }

    async fn stop_media(&self) -> anyhow::Result<()> {
        self.check()?;
        self.mutate_and_push(|status| {
            if let Some(media) = &mut status.media {
                media.playback_state = PlaybackState::Idle;
                media.position = Some(0.0);
            }
        });
        Ok(())
    }

    async fn seek(&self, position: f64) -> anyhow::Result<()> {
        self.check()?;
        self.mutate_and_push(|status| {
            if let Some(media) = &mut status.media {
                let clamped = match media.duration {
                    Some(duration) => position.clamp(0.0, duration),
                    None => position.max(0.0),
                };
                media.position = Some(clamped);
            }
        });
        Ok(())
    }

    fn status_stream(&self) -> broadcast::Receiver<CastStatus> {
        self.tx.subscribe()
    }
}

/// A playing-media status for demos and tests.
pub fn playing_status(title: &str, artist: &str, duration: f64) -> CastStatus {
    CastStatus {
        volume_level: 0.35,
        is_standby: false,
        app_id: Some("CC1AD845".to_string()),
        media: Some(MediaStatus {
            playback_state: PlaybackState::Playing,
            title: Some(title.to_string()),
            artist: Some(artist.to_string()),
            duration: Some(duration),
            position: Some(0.0),
        }),
    }
}

/// Simulated bulb transport: an in-memory pilot plus a fixed feature set.
pub struct SimBulbTransport {
    pilot: Mutex<BulbPilot>,
    features: BulbFeatures,
    failing: AtomicBool,
}

impl SimBulbTransport {
    pub fn new(features: BulbFeatures) -> Self {
        Self {
            pilot: Mutex::new(BulbPilot {
                is_on: false,
                brightness: Some(10),
                color_temp: None,
                rgb: None,
            }),
            features,
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn pilot(&self) -> BulbPilot {
        *self.pilot.lock()
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("simulated transport failure");
        }
        Ok(())
    }
}

#[async_trait]
impl BulbTransport for SimBulbTransport {
    async fn fetch_pilot(&self) -> anyhow::Result<BulbPilot> {
        self.check()?;
        Ok(*self.pilot.lock())
    }

    async fn set_pilot(&self, command: PilotCommand) -> anyhow::Result<()> {
        self.check()?;
        let mut pilot = self.pilot.lock();
        if let Some(on) = command.on {
            pilot.is_on = on;
        }
        if let Some(brightness) = command.brightness {
            pilot.brightness = Some(brightness);
        }
        if let Some(color_temp) = command.color_temp {
            pilot.color_temp = Some(color_temp);
            pilot.rgb = None;
        }
        if let Some(rgb) = command.rgb {
            pilot.rgb = Some(rgb);
            pilot.color_temp = None;
        }
        Ok(())
    }

    async fn features(&self) -> anyhow::Result<BulbFeatures> {
        self.check()?;
        Ok(self.features)
    }
}
