use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use domain::device::validate_percent;
use domain::error::Result;
use domain::{
    Device, DeviceCapability, DeviceCore, DeviceInfo, DeviceState, DeviceType, PlaybackState,
    StateCallback,
};

/// App id of the idle screen; a receiver showing it is not "active".
const BACKDROP_APP_ID: &str = "E8C28D3C";

/// Quiet period before a pending volume value is actually sent.
const VOLUME_DEBOUNCE: Duration = Duration::from_millis(100);

/// Media portion of a receiver status report.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaStatus {
    pub playback_state: PlaybackState,
    pub title: Option<String>,
    pub artist: Option<String>,
    /// Seconds
    pub duration: Option<f64>,
    /// Seconds
    pub position: Option<f64>,
}

/// Status report from a cast receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct CastStatus {
    /// 0.0-1.0
    pub volume_level: f64,
    pub is_standby: bool,
    pub app_id: Option<String>,
    pub media: Option<MediaStatus>,
}

impl CastStatus {
    pub fn idle() -> Self {
        Self {
            volume_level: 0.0,
            is_standby: true,
            app_id: None,
            media: None,
        }
    }
}

/// Wire seam around one cast receiver session. The real protocol lives
/// behind this trait; the crate ships a simulated implementation.
#[async_trait]
pub trait CastTransport: Send + Sync {
    /// Open the session and return the first status report.
    async fn connect(&self) -> anyhow::Result<CastStatus>;

    async fn disconnect(&self);

    async fn fetch_status(&self) -> anyhow::Result<CastStatus>;

    /// `level` is 0.0-1.0.
    async fn set_volume(&self, level: f64) -> anyhow::Result<()>;

    /// Quit the foreground app.
    async fn quit_app(&self) -> anyhow::Result<()>;

    async fn play(&self) -> anyhow::Result<()>;
    async fn pause(&self) -> anyhow::Result<()>;
    async fn stop_media(&self) -> anyhow::Result<()>;

    /// Absolute position in seconds.
    async fn seek(&self, position: f64) -> anyhow::Result<()>;

    /// Receiver-push status updates.
    fn status_stream(&self) -> broadcast::Receiver<CastStatus>;
}

/// Google Cast receiver adapter.
///
/// Speaker with OnOff, Volume and Playback; Seek is added the first time a
/// status report carries a media duration. Push updates from the transport
/// drive the state-changed callback.
pub struct CastDevice {
    core: DeviceCore,
    transport: Arc<dyn CastTransport>,
    cast_type: String,
    connected: AtomicBool,
    listener: Mutex<Option<ListenerHandle>>,
    pending_volume: Arc<Mutex<Option<u8>>>,
    debounce: Mutex<Option<JoinHandle<()>>>,
    self_ref: Weak<CastDevice>,
}

struct ListenerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl CastDevice {
    pub fn new(
        device_id: impl Into<String>,
        name: impl Into<String>,
        ip_address: impl Into<String>,
        model: Option<String>,
        cast_type: impl Into<String>,
        transport: Arc<dyn CastTransport>,
    ) -> Arc<Self> {
        let mut info = DeviceInfo::new(device_id, name)
            .with_ip(ip_address)
            .with_manufacturer("Google");
        info.model = model;

        Arc::new_cyclic(|self_ref| Self {
            core: DeviceCore::new(
                info,
                [
                    DeviceCapability::OnOff,
                    DeviceCapability::Volume,
                    DeviceCapability::Playback,
                ],
            ),
            transport,
            cast_type: cast_type.into(),
            connected: AtomicBool::new(false),
            listener: Mutex::new(None),
            pending_volume: Arc::new(Mutex::new(None)),
            debounce: Mutex::new(None),
            self_ref: self_ref.clone(),
        })
    }

    /// Multi-room speaker groups announce themselves with a dedicated cast
    /// type.
    pub fn is_group(&self) -> bool {
        self.cast_type == "group"
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Fold a status report into the owned state.
    fn apply_status(&self, status: &CastStatus) {
        self.core.update_state(|state| {
            state.is_online = true;
            state.set_volume((status.volume_level.clamp(0.0, 1.0) * 100.0).round() as u8);
            state.is_on = Some(!status.is_standby);
            match &status.app_id {
                Some(app_id) => {
                    state
                        .extra
                        .insert("app_id".to_string(), serde_json::json!(app_id));
                }
                None => {
                    state.extra.remove("app_id");
                }
            }
            if let Some(media) = &status.media {
                state.playback_state = media.playback_state;
                state.media_title = media.title.clone();
                state.media_artist = media.artist.clone();
                state.media_duration = media.duration;
                state.media_position = media.position;
            }
        });

        // A known duration means the receiver can seek.
        if status
            .media
            .as_ref()
            .is_some_and(|media| media.duration.is_some())
            && self.core.add_capability(DeviceCapability::Seek)
        {
            debug!(device_id = %self.core.device_id(), "Receiver reports seekable media");
        }
    }

    fn spawn_status_listener(&self) {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let mut stream = self.transport.status_stream();
        let weak = self.self_ref.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    status = stream.recv() => match status {
                        Ok(status) => {
                            let Some(device) = weak.upgrade() else { break };
                            device.apply_status(&status);
                            device.core.notify_state_changed(&*device);
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Cast status listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        let previous = self.listener.lock().replace(ListenerHandle { cancel, task });
        if let Some(previous) = previous {
            previous.cancel.cancel();
            previous.task.abort();
        }
    }

    fn stop_status_listener(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.cancel.cancel();
            listener.task.abort();
        }
    }

    /// Send whatever volume value is still pending after the quiet period.
    async fn flush_pending_volume(self: Arc<Self>) {
        let pending = self.pending_volume.lock().take();
        let Some(level) = pending else {
            return;
        };

        match self.transport.set_volume(f64::from(level) / 100.0).await {
            Ok(()) => {
                self.core.update_state(|state| state.set_volume(level));
                debug!(device_id = %self.core.device_id(), volume = level, "Volume sent");
            }
            Err(e) => {
                error!(device_id = %self.core.device_id(), "Failed to set volume: {e}");
                self.core.mark_offline();
            }
        }
    }

    fn current_app_id(&self) -> Option<String> {
        self.core
            .state()
            .extra
            .get("app_id")
            .and_then(|value| value.as_str().map(str::to_string))
    }
}

#[async_trait]
impl Device for CastDevice {
    fn info(&self) -> DeviceInfo {
        self.core.info()
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Speaker
    }

    fn capabilities(&self) -> HashSet<DeviceCapability> {
        self.core.capabilities()
    }

    fn state(&self) -> DeviceState {
        self.core.state()
    }

    fn rename(&self, name: String) {
        self.core.rename(name);
    }

    fn set_state_callback(&self, callback: StateCallback) {
        self.core.set_state_callback(callback);
    }

    async fn connect(&self) -> bool {
        if self.is_connected() {
            return true;
        }

        match self.transport.connect().await {
            Ok(status) => {
                self.connected.store(true, Ordering::SeqCst);
                self.apply_status(&status);
                self.spawn_status_listener();
                let group_suffix = if self.is_group() { " [group]" } else { "" };
                info!(
                    device_id = %self.core.device_id(),
                    name = %self.core.name(),
                    "Connected to cast receiver{group_suffix}"
                );
                true
            }
            Err(e) => {
                error!(device_id = %self.core.device_id(), "Failed to connect: {e}");
                self.core.mark_offline();
                false
            }
        }
    }

    async fn disconnect(&self) {
        self.stop_status_listener();
        if let Some(task) = self.debounce.lock().take() {
            task.abort();
        }
        if self.connected.swap(false, Ordering::SeqCst) {
            self.transport.disconnect().await;
        }
    }

    async fn refresh_state(&self) -> DeviceState {
        if !self.is_connected() {
            return self.core.state();
        }
        match self.transport.fetch_status().await {
            Ok(status) => {
                self.apply_status(&status);
                self.core.state()
            }
            Err(e) => {
                warn!(device_id = %self.core.device_id(), "Status refresh failed: {e}");
                self.core.mark_offline()
            }
        }
    }

    /// Receivers cannot be powered on remotely; reported as success so a
    /// toggle sequence stays usable.
    async fn turn_on(&self) -> Result<bool> {
        self.require_capability(DeviceCapability::OnOff)?;
        info!(device_id = %self.core.device_id(), "Turn on is a no-op for cast receivers");
        Ok(true)
    }

    async fn turn_off(&self) -> Result<bool> {
        self.require_capability(DeviceCapability::OnOff)?;
        if !self.is_connected() {
            return Ok(false);
        }
        match self.transport.quit_app().await {
            Ok(()) => Ok(true),
            Err(e) => {
                error!(device_id = %self.core.device_id(), "Failed to quit app: {e}");
                self.core.mark_offline();
                Ok(false)
            }
        }
    }

    /// Quit the foreground app when one is active; showing the idle screen
    /// already counts as "off".
    async fn toggle(&self) -> Result<bool> {
        self.require_capability(DeviceCapability::OnOff)?;
        if !self.is_connected() {
            return Ok(false);
        }
        let has_active_app = self
            .current_app_id()
            .is_some_and(|app_id| app_id != BACKDROP_APP_ID);
        if has_active_app {
            self.turn_off().await
        } else {
            debug!(device_id = %self.core.device_id(), "No active app to quit");
            Ok(true)
        }
    }

    /// Debounced: rapid calls collapse into one send carrying the latest
    /// value after a quiet period, so a volume drag does not flood the
    /// receiver.
    async fn set_volume(&self, level: u8) -> Result<bool> {
        self.require_capability(DeviceCapability::Volume)?;
        validate_percent("volume", level)?;
        if !self.is_connected() {
            warn!(device_id = %self.core.device_id(), "Cannot set volume while disconnected");
            return Ok(false);
        }

        *self.pending_volume.lock() = Some(level);

        let Some(device) = self.self_ref.upgrade() else {
            return Ok(false);
        };
        let replaced = self.debounce.lock().replace(tokio::spawn(async move {
            tokio::time::sleep(VOLUME_DEBOUNCE).await;
            device.flush_pending_volume().await;
        }));
        if let Some(previous) = replaced {
            previous.abort();
        }
        Ok(true)
    }

    async fn play(&self) -> Result<bool> {
        self.require_capability(DeviceCapability::Playback)?;
        if !self.is_connected() {
            return Ok(false);
        }
        match self.transport.play().await {
            Ok(()) => Ok(true),
            Err(e) => {
                error!(device_id = %self.core.device_id(), "Failed to play: {e}");
                self.core.mark_offline();
                Ok(false)
            }
        }
    }

    async fn pause(&self) -> Result<bool> {
        self.require_capability(DeviceCapability::Playback)?;
        if !self.is_connected() {
            return Ok(false);
        }
        match self.transport.pause().await {
            Ok(()) => Ok(true),
            Err(e) => {
                error!(device_id = %self.core.device_id(), "Failed to pause: {e}");
                self.core.mark_offline();
                Ok(false)
            }
        }
    }

    async fn stop(&self) -> Result<bool> {
        self.require_capability(DeviceCapability::Playback)?;
        if !self.is_connected() {
            return Ok(false);
        }
        match self.transport.stop_media().await {
            Ok(()) => Ok(true),
            Err(e) => {
                error!(device_id = %self.core.device_id(), "Failed to stop: {e}");
                self.core.mark_offline();
                Ok(false)
            }
        }
    }

    async fn seek(&self, position: f64) -> Result<bool> {
        self.require_capability(DeviceCapability::Seek)?;
        if !self.is_connected() {
            return Ok(false);
        }
        match self.transport.seek(position.max(0.0)).await {
            Ok(()) => Ok(true),
            Err(e) => {
                error!(device_id = %self.core.device_id(), "Failed to seek: {e}");
                self.core.mark_offline();
                Ok(false)
            }
        }
    }

    async fn seek_relative(&self, offset: f64) -> Result<bool> {
        self.require_capability(DeviceCapability::Seek)?;
        let position = self.core.state().media_position.unwrap_or(0.0) + offset;
        self.seek(position.max(0.0)).await
    }
}

/// Description of a known receiver, fed to the manager from settings or a
/// cast-specific browser.
#[derive(Debug, Clone)]
pub struct CastEndpoint {
    pub uuid: String,
    pub name: String,
    pub ip_address: String,
    pub model: Option<String>,
    pub cast_type: String,
}

pub type CastFoundCallback = Arc<dyn Fn(Arc<CastDevice>) + Send + Sync>;
pub type CastTransportFactory = Arc<dyn Fn(&CastEndpoint) -> Arc<dyn CastTransport> + Send + Sync>;

/// Owns the cast receiver sessions: builds a device per endpoint, connects
/// it, and hands connected devices to the found callback.
pub struct CastManager {
    on_device_found: CastFoundCallback,
    transport_factory: CastTransportFactory,
    endpoints: Mutex<Vec<CastEndpoint>>,
    devices: Mutex<HashMap<String, Arc<CastDevice>>>,
    running: AtomicBool,
}

impl CastManager {
    pub fn new(on_device_found: CastFoundCallback, transport_factory: CastTransportFactory) -> Self {
        Self {
            on_device_found,
            transport_factory,
            endpoints: Mutex::new(Vec::new()),
            devices: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
        }
    }

    pub fn set_endpoints(&self, endpoints: Vec<CastEndpoint>) {
        *self.endpoints.lock() = endpoints;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn devices(&self) -> Vec<Arc<CastDevice>> {
        self.devices.lock().values().cloned().collect()
    }

    /// Connect every known endpoint. Returns true when the manager is up,
    /// even if individual receivers failed; they stay retryable.
    pub async fn start(&self) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            return true;
        }

        let endpoints = self.endpoints.lock().clone();
        for endpoint in endpoints {
            let device_id = format!("cast:{}", endpoint.uuid);
            if self.devices.lock().contains_key(&device_id) {
                continue;
            }

            let transport = (self.transport_factory)(&endpoint);
            let device = CastDevice::new(
                device_id.clone(),
                endpoint.name.clone(),
                endpoint.ip_address.clone(),
                endpoint.model.clone(),
                endpoint.cast_type.clone(),
                transport,
            );

            if device.connect().await {
                self.devices.lock().insert(device_id, Arc::clone(&device));
                (self.on_device_found)(device);
            } else {
                warn!(name = %endpoint.name, "Failed to connect to cast receiver");
            }
        }
        true
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let devices: Vec<_> = self.devices.lock().drain().map(|(_, d)| d).collect();
        for device in devices {
            device.disconnect().await;
        }
        info!("Cast manager stopped");
    }
}
