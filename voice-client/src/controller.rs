//! Session controller: the one state machine behind every voice surface.
//!
//! All observable state lives in a [`SessionSnapshot`] held by a
//! `tokio::sync::watch` channel. Every transition runs under the channel's
//! write lock, so check-and-set guards (reentrancy, stale epochs) are atomic
//! with the state change they protect.

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard,
};
use std::time::Duration;

use tokio::{sync::mpsc, sync::watch, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::{
    errors::{ClientError, DeviceError, Result},
    events::{MediaEvent, Playback, RemoteTrackInfo, TrackKind},
    models::DEFAULT_SDK_READY_TIMEOUT,
    state::{RemoteAudioOutput, SessionSnapshot, SessionState},
    traits::{CredentialSource, MediaTransport, MicrophoneAccess},
};

/// Knobs that differ between deployments of the same state machine.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Display name of the remote agent used in notices.
    pub agent_name: String,
    /// Lower-case substrings that mark a participant identity as the agent.
    pub agent_markers: Vec<String>,
    pub sdk_ready_timeout: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            agent_name: "Alex".to_string(),
            agent_markers: vec!["alex".to_string(), "agent".to_string()],
            sdk_ready_timeout: DEFAULT_SDK_READY_TIMEOUT,
        }
    }
}

impl ControllerOptions {
    pub fn with_agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = name.into();
        self
    }

    pub fn with_sdk_ready_timeout(mut self, timeout: Duration) -> Self {
        self.sdk_ready_timeout = timeout;
        self
    }

    fn is_agent(&self, identity: &str) -> bool {
        let identity = identity.to_lowercase();
        self.agent_markers
            .iter()
            .any(|marker| identity.contains(marker.as_str()))
    }
}

struct Inner {
    options: ControllerOptions,
    credentials: Arc<dyn CredentialSource>,
    transport: Arc<dyn MediaTransport>,
    microphone: Arc<dyn MicrophoneAccess>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    /// Incremented by every connect and every teardown; work tagged with an
    /// older value is discarded.
    epoch: AtomicU64,
    /// Epoch whose transport session is open; 0 until the first connect opens one.
    opened_epoch: AtomicU64,
    pump: Mutex<Option<JoinHandle<()>>>,
    /// Newest subscription id seen per track in this session.
    subscription_marks: Mutex<HashMap<String, SubscriptionMark>>,
    /// Held across a speaker toggle so transport mutes match the snapshot.
    speaker: tokio::sync::Mutex<()>,
}

#[derive(Debug, Clone, Copy)]
struct SubscriptionMark {
    id: u64,
    ended: bool,
}

/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    pub fn new(
        options: ControllerOptions,
        credentials: Arc<dyn CredentialSource>,
        transport: Arc<dyn MediaTransport>,
        microphone: Arc<dyn MicrophoneAccess>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                options,
                credentials,
                transport,
                microphone,
                snapshot_tx,
                epoch: AtomicU64::new(0),
                opened_epoch: AtomicU64::new(0),
                pump: Mutex::new(None),
                subscription_marks: Mutex::new(HashMap::new()),
                speaker: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.snapshot_tx.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.inner.snapshot_tx.borrow().state
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.inner.options
    }

    /// Epoch of the current (or most recent) session.
    pub fn current_epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    /// Opens a session. Rejected with [`ClientError::AlreadyActive`] unless
    /// the controller is Idle or Failed.
    pub async fn connect(&self) -> Result<()> {
        let epoch = self.begin_connect()?;
        info!("Connecting voice session (epoch {})", epoch);

        match self.run_connect(epoch).await {
            Ok(()) => Ok(()),
            Err(ClientError::Cancelled) => {
                // A remote disconnect during setup fails the attempt from the event pump
                let snapshot = self.snapshot();
                if snapshot.state == SessionState::Failed {
                    if let Some(message) = snapshot.last_error {
                        return Err(ClientError::Transport(message));
                    }
                }
                info!("Connection attempt {} was cancelled", epoch);
                Err(ClientError::Cancelled)
            }
            Err(e) => {
                error!("Connection failed: {}", e);
                self.fail(epoch, &e).await;
                Err(e)
            }
        }
    }

    /// Tears the session down from any state and lands in Idle. An in-flight
    /// `connect` aborts at its next step.
    pub async fn disconnect(&self) -> Result<()> {
        let mut teardown_epoch = None;
        self.update(|s| {
            if s.state == SessionState::Idle {
                return false;
            }
            teardown_epoch = Some(self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1);
            s.state = SessionState::Disconnecting;
            s.status_text = "Disconnecting...".to_string();
            true
        });

        let Some(epoch) = teardown_epoch else {
            debug!("Disconnect requested while idle");
            return Ok(());
        };

        self.stop_event_pump();
        if let Err(e) = self.inner.transport.disconnect().await {
            warn!("Disconnect error: {}", e);
        }

        let farewell = format!("Disconnected from {}.", self.inner.options.agent_name);
        self.update_for(epoch, |s| {
            s.state = SessionState::Idle;
            s.status_text = "Disconnected".to_string();
            s.last_error = None;
            s.clear_session();
            s.push_notice(farewell);
            true
        });
        info!("Voice session disconnected");
        Ok(())
    }

    /// Flips local capture. Only meaningful while Connected.
    pub async fn toggle_microphone(&self) -> Result<bool> {
        let current = {
            let snapshot = self.inner.snapshot_tx.borrow();
            if snapshot.state != SessionState::Connected {
                return Err(ClientError::NotConnected);
            }
            snapshot.microphone.enabled
        };
        let epoch = self.current_epoch();
        let target = !current;

        if let Err(e) = self.inner.transport.set_microphone_enabled(target).await {
            error!("Failed to toggle microphone: {}", e);
            return Err(e);
        }

        self.update_for(epoch, |s| {
            s.microphone.enabled = target;
            s.push_notice(if target {
                "Microphone enabled"
            } else {
                "Microphone muted"
            });
            true
        });
        Ok(target)
    }

    /// Flips local playback of every rendered remote output. Never affects
    /// the remote side.
    pub async fn toggle_speaker(&self) -> bool {
        let _serialized = self.inner.speaker.lock().await;
        let mut enabled = true;
        let mut affected = Vec::new();
        self.update(|s| {
            s.speaker_enabled = !s.speaker_enabled;
            enabled = s.speaker_enabled;
            for output in s.outputs.values_mut() {
                output.muted = !enabled;
                affected.push(output.track_sid.clone());
            }
            true
        });

        for track_sid in affected {
            if let Err(e) = self.inner.transport.set_output_muted(&track_sid, !enabled).await {
                warn!("Failed to update output {}: {}", track_sid, e);
            }
        }
        debug!("Speaker enabled: {}", enabled);
        enabled
    }

    /// Push-to-talk indicator. Returns whether the flag changed.
    pub fn set_local_speaking(&self, speaking: bool) -> bool {
        self.update(|s| {
            if s.state != SessionState::Connected || s.local_speaking == speaking {
                return false;
            }
            s.local_speaking = speaking;
            true
        })
    }

    /// Applies one transport event. Events tagged with a stale epoch are
    /// dropped.
    pub async fn handle_event(&self, epoch: u64, event: MediaEvent) {
        if epoch != self.current_epoch() {
            debug!("Dropping stale event from epoch {}: {:?}", epoch, event);
            return;
        }

        match event {
            MediaEvent::Connected | MediaEvent::Reconnected => {
                self.update_for(epoch, |s| match s.state {
                    SessionState::Connected => {
                        s.status_text = "Connected".to_string();
                        true
                    }
                    SessionState::Idle | SessionState::Failed if self.session_opened(epoch) => {
                        s.state = SessionState::Connected;
                        s.status_text = "Connected".to_string();
                        s.last_error = None;
                        true
                    }
                    _ => false,
                });
            }
            MediaEvent::Reconnecting => {
                self.update_for(epoch, |s| {
                    if s.state != SessionState::Connected {
                        return false;
                    }
                    s.status_text = "Reconnecting...".to_string();
                    true
                });
            }
            MediaEvent::Disconnected { reason } => {
                self.handle_remote_disconnect(epoch, reason).await;
            }
            MediaEvent::TrackSubscribed { track } => self.on_track_subscribed(epoch, track).await,
            MediaEvent::TrackUnsubscribed { track } => {
                debug!(
                    "Track unsubscribed: {} from {}",
                    track.track_sid, track.participant_identity
                );
                self.update_for(epoch, |s| {
                    let matches = s
                        .outputs
                        .get(&track.track_sid)
                        .is_some_and(|o| o.subscription_id == track.subscription_id);
                    if !matches || self.is_superseded(&track.track_sid, track.subscription_id) {
                        return false;
                    }
                    self.end_subscription(&track.track_sid, track.subscription_id);
                    s.outputs.remove(&track.track_sid);
                    s.recompute_remote_speaking();
                    true
                });
            }
            MediaEvent::TrackPlayback {
                track_sid,
                subscription_id,
                playback,
            } => {
                self.update_for(epoch, |s| {
                    let Some(output) = s.outputs.get_mut(&track_sid) else {
                        return false;
                    };
                    if output.subscription_id != subscription_id
                        || self.is_superseded(&track_sid, subscription_id)
                    {
                        return false;
                    }
                    output.playing = playback == Playback::Playing;
                    s.recompute_remote_speaking();
                    true
                });
            }
            MediaEvent::ParticipantJoined { identity } => {
                info!("Participant connected: {}", identity);
                if self.inner.options.is_agent(&identity) {
                    let notice = format!("{} joined the conversation!", self.inner.options.agent_name);
                    self.update_for(epoch, |s| {
                        s.agent_present = true;
                        s.push_notice(notice);
                        true
                    });
                }
            }
            MediaEvent::ParticipantLeft { identity } => {
                info!("Participant disconnected: {}", identity);
                if self.inner.options.is_agent(&identity) {
                    let notice = format!("{} left the conversation.", self.inner.options.agent_name);
                    self.update_for(epoch, |s| {
                        s.agent_present = false;
                        s.push_notice(notice);
                        true
                    });
                }
            }
            MediaEvent::LocalTrackPublished { track_sid, kind } => {
                debug!("Local track published: {} ({:?})", track_sid, kind);
                if kind == TrackKind::Audio {
                    self.update_for(epoch, |s| {
                        if s.microphone.enabled {
                            return false;
                        }
                        s.microphone.enabled = true;
                        true
                    });
                }
            }
        }
    }

    fn begin_connect(&self) -> Result<u64> {
        let mut outcome = Err(ClientError::AlreadyActive(SessionState::Connecting));
        self.update(|s| {
            if !s.state.is_idle() {
                outcome = Err(ClientError::AlreadyActive(s.state));
                return false;
            }
            let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            s.state = SessionState::Connecting;
            s.status_text = "Connecting...".to_string();
            s.last_error = None;
            s.clear_session();
            s.notices.clear();
            self.subscription_marks().clear();
            outcome = Ok(epoch);
            true
        });

        if let Err(ClientError::AlreadyActive(state)) = &outcome {
            debug!("Connect ignored, session is {}", state);
        }
        outcome
    }

    async fn run_connect(&self, epoch: u64) -> Result<()> {
        let transport = self.inner.transport.clone();

        // Bounded wait for the media SDK
        let ready = tokio::time::timeout(self.inner.options.sdk_ready_timeout, transport.ready());
        match ready.await {
            Ok(result) => result?,
            Err(_) => return Err(ClientError::SdkUnavailable),
        }
        self.ensure_current(epoch)?;

        let credential = self.inner.credentials.fetch_credential().await?;
        self.ensure_current(epoch)?;
        info!(
            "Connecting to {} as {} in room {}",
            credential.server_endpoint, credential.identity, credential.room
        );
        self.update_for(epoch, |s| {
            s.room = Some(credential.room.clone());
            s.identity = Some(credential.identity.clone());
            true
        });

        let events = transport.connect(&credential).await?;
        if self.ensure_current(epoch).is_err() {
            if let Err(e) = transport.disconnect().await {
                warn!("Failed to close abandoned session: {}", e);
            }
            return Err(ClientError::Cancelled);
        }
        self.inner.opened_epoch.store(epoch, Ordering::SeqCst);
        self.start_event_pump(epoch, events);

        self.enable_microphone(epoch).await;
        self.ensure_current(epoch)?;

        let greeting = format!(
            "Connected to {}! Start speaking naturally.",
            self.inner.options.agent_name
        );
        let entered = self.update_for(epoch, |s| {
            if s.state != SessionState::Connecting {
                return false;
            }
            s.state = SessionState::Connected;
            s.status_text = "Connected".to_string();
            s.push_notice(greeting);
            true
        });

        if entered {
            info!("Connected to room: {}", credential.room);
            Ok(())
        } else {
            Err(ClientError::Transport(
                "session ended while connecting".to_string(),
            ))
        }
    }

    /// Probe the device once, release it, then enable capture through the
    /// session. Failures are reported but never abort the connect.
    async fn enable_microphone(&self, epoch: u64) {
        self.update_for(epoch, |s| {
            s.push_notice("Requesting microphone access...");
            true
        });

        let result = match self.inner.microphone.probe().await {
            Ok(()) => self
                .inner
                .transport
                .set_microphone_enabled(true)
                .await
                .map_err(|e| DeviceError::Other(e.to_string())),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                let notice = format!(
                    "Microphone enabled! {} can now hear you.",
                    self.inner.options.agent_name
                );
                self.update_for(epoch, |s| {
                    s.microphone.enabled = true;
                    s.push_notice(notice);
                    true
                });
                info!("Microphone enabled");
            }
            Err(e) => {
                warn!("Failed to enable microphone: {}", e);
                self.update_for(epoch, |s| {
                    s.microphone.enabled = false;
                    s.push_notice(e.user_hint());
                    true
                });
            }
        }
    }

    async fn on_track_subscribed(&self, epoch: u64, track: RemoteTrackInfo) {
        debug!(
            "Track subscribed: {:?} from {}",
            track.kind, track.participant_identity
        );
        if track.kind != TrackKind::Audio {
            return;
        }

        let mut mute_new_output = false;
        self.update_for(epoch, |s| {
            if !matches!(s.state, SessionState::Connecting | SessionState::Connected) {
                return false;
            }
            // 乱序到达的旧订阅不能覆盖新订阅，也不能复活已结束的订阅
            if !self.admit_subscription(&track.track_sid, track.subscription_id) {
                debug!(
                    "Ignoring stale subscription {} for {}",
                    track.subscription_id, track.track_sid
                );
                return false;
            }
            mute_new_output = !s.speaker_enabled;
            s.outputs.insert(
                track.track_sid.clone(),
                RemoteAudioOutput {
                    track_sid: track.track_sid.clone(),
                    participant_identity: track.participant_identity.clone(),
                    subscription_id: track.subscription_id,
                    playing: true,
                    muted: !s.speaker_enabled,
                },
            );
            s.recompute_remote_speaking();
            true
        });

        if mute_new_output {
            if let Err(e) = self
                .inner
                .transport
                .set_output_muted(&track.track_sid, true)
                .await
            {
                warn!("Failed to mute output {}: {}", track.track_sid, e);
            }
        }
    }

    async fn handle_remote_disconnect(&self, epoch: u64, reason: String) {
        info!("Room disconnected: {}", reason);

        let mut was_connecting = false;
        let mut teardown_epoch = None;
        self.update_for(epoch, |s| match s.state {
            SessionState::Connecting => {
                was_connecting = true;
                false
            }
            SessionState::Connected => {
                teardown_epoch = Some(self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1);
                s.state = SessionState::Disconnecting;
                s.status_text = "Disconnecting...".to_string();
                true
            }
            _ => false,
        });

        if was_connecting {
            let err = ClientError::Transport(reason);
            self.fail(epoch, &err).await;
            return;
        }
        let Some(teardown_epoch) = teardown_epoch else {
            return;
        };

        // 事件泵自身在这里运行，只分离句柄，不能中止
        self.detach_event_pump();
        if let Err(e) = self.inner.transport.disconnect().await {
            debug!("Transport cleanup after remote disconnect: {}", e);
        }

        self.update_for(teardown_epoch, |s| {
            s.state = SessionState::Idle;
            s.status_text = "Disconnected".to_string();
            s.clear_session();
            true
        });
    }

    async fn fail(&self, epoch: u64, err: &ClientError) {
        let message = format!("Connection failed: {}", err);
        let failed = self.update_for(epoch, |s| {
            if s.state != SessionState::Connecting {
                return false;
            }
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
            s.state = SessionState::Failed;
            s.status_text = message.clone();
            s.last_error = Some(message.clone());
            s.clear_session();
            s.push_notice(message.clone());
            true
        });

        if failed {
            self.detach_event_pump();
            if let Err(e) = self.inner.transport.disconnect().await {
                debug!("Transport cleanup after failure: {}", e);
            }
        }
    }

    fn start_event_pump(&self, epoch: u64, mut events: mpsc::UnboundedReceiver<MediaEvent>) {
        let controller = self.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                controller.handle_event(epoch, event).await;
            }
            controller
                .handle_event(
                    epoch,
                    MediaEvent::Disconnected {
                        reason: "event stream closed".to_string(),
                    },
                )
                .await;
            debug!("Event pump for epoch {} stopped", epoch);
        });

        if let Ok(mut slot) = self.inner.pump.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }
    }

    fn stop_event_pump(&self) {
        if let Ok(mut slot) = self.inner.pump.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }

    fn detach_event_pump(&self) {
        if let Ok(mut slot) = self.inner.pump.lock() {
            slot.take();
        }
    }

    /// Epochs start at 1, so 0 never names an opened session.
    fn session_opened(&self, epoch: u64) -> bool {
        epoch != 0 && self.inner.opened_epoch.load(Ordering::SeqCst) == epoch
    }

    fn subscription_marks(&self) -> MutexGuard<'_, HashMap<String, SubscriptionMark>> {
        match self.inner.subscription_marks.lock() {
            Ok(marks) => marks,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Records a subscription; false when a newer one was seen or this one already ended.
    fn admit_subscription(&self, track_sid: &str, id: u64) -> bool {
        let mut marks = self.subscription_marks();
        match marks.get(track_sid) {
            Some(mark) if id < mark.id || (id == mark.id && mark.ended) => false,
            _ => {
                marks.insert(track_sid.to_string(), SubscriptionMark { id, ended: false });
                true
            }
        }
    }

    fn is_superseded(&self, track_sid: &str, id: u64) -> bool {
        self.subscription_marks()
            .get(track_sid)
            .is_some_and(|mark| id < mark.id)
    }

    fn end_subscription(&self, track_sid: &str, id: u64) {
        if let Some(mark) = self.subscription_marks().get_mut(track_sid) {
            if mark.id == id {
                mark.ended = true;
            }
        }
    }

    fn ensure_current(&self, epoch: u64) -> Result<()> {
        if self.current_epoch() == epoch {
            Ok(())
        } else {
            Err(ClientError::Cancelled)
        }
    }

    /// Runs `f` under the snapshot lock; publishes only when it reports a change.
    fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut SessionSnapshot) -> bool,
    {
        self.inner.snapshot_tx.send_if_modified(|snapshot| {
            let changed = f(snapshot);
            if changed {
                snapshot.revision += 1;
            }
            changed
        })
    }

    fn update_for<F>(&self, epoch: u64, f: F) -> bool
    where
        F: FnOnce(&mut SessionSnapshot) -> bool,
    {
        self.update(|snapshot| {
            if self.current_epoch() != epoch {
                return false;
            }
            f(snapshot)
        })
    }
}
