use async_trait::async_trait;
use livekit::prelude::*;
use livekit::options::TrackPublishOptions;
use livekit::webrtc::audio_frame::AudioFrame;
use livekit::webrtc::audio_source::{native::NativeAudioSource, AudioSourceOptions, RtcAudioSource};
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    errors::{ClientError, Result},
    events::{self, MediaEvent, Playback, RemoteTrackInfo},
    models::Credential,
    traits::MediaTransport,
};

const MICROPHONE_TRACK_NAME: &str = "microphone";
const SAMPLE_RATE: u32 = 48_000;
const NUM_CHANNELS: u32 = 1;
const QUEUE_SIZE_MS: u32 = 100;
const FRAME_MS: u32 = 10;
const SAMPLES_PER_FRAME: u32 = SAMPLE_RATE / 1000 * FRAME_MS;

type RemoteAudio = Arc<std::sync::Mutex<HashMap<String, RemoteAudioTrack>>>;

struct ActiveRoom {
    room: Arc<Room>,
    microphone: Option<LocalAudioTrack>,
    capture: Option<JoinHandle<()>>,
    remote_audio: RemoteAudio,
    forwarder: JoinHandle<()>,
}

/// [`MediaTransport`] backed by a LiveKit room.
///
/// The microphone is published once as a [`LocalAudioTrack`] and muted or
/// unmuted afterwards. Its samples are raw 48 kHz mono signed 16-bit
/// little-endian PCM read from the capture path, e.g. a FIFO filled by
/// `arecord -t raw -f S16_LE -r 48000 -c 1`. Without a capture path the
/// microphone cannot be enabled.
pub struct LiveKitTransport {
    active: Mutex<Option<ActiveRoom>>,
    next_subscription: Arc<AtomicU64>,
    capture_path: Option<PathBuf>,
}

impl Default for LiveKitTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveKitTransport {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
            next_subscription: Arc::new(AtomicU64::new(0)),
            capture_path: None,
        }
    }

    pub fn with_capture_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.capture_path = Some(path.into());
        self
    }

    async fn publish_microphone(&self, active: &mut ActiveRoom) -> Result<()> {
        let input = open_capture(self.capture_path.as_ref()).await?;

        let source = NativeAudioSource::new(
            AudioSourceOptions {
                echo_cancellation: true,
                noise_suppression: true,
                auto_gain_control: true,
            },
            SAMPLE_RATE,
            NUM_CHANNELS,
            QUEUE_SIZE_MS,
        );
        let track = LocalAudioTrack::create_audio_track(
            MICROPHONE_TRACK_NAME,
            RtcAudioSource::Native(source.clone()),
        );

        active
            .room
            .local_participant()
            .publish_track(
                LocalTrack::Audio(track.clone()),
                TrackPublishOptions {
                    source: TrackSource::Microphone,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ClientError::Transport(format!("Failed to publish microphone: {}", e)))?;

        info!("Published microphone track");
        active.microphone = Some(track);
        active.capture = Some(tokio::spawn(feed_microphone(PcmFrames::new(input), source)));
        Ok(())
    }
}

async fn open_capture(path: Option<&PathBuf>) -> Result<tokio::fs::File> {
    let path = path.ok_or_else(|| {
        ClientError::Transport("no capture input configured (VOICE_CAPTURE_PATH)".to_string())
    })?;
    tokio::fs::File::open(path).await.map_err(|e| {
        ClientError::Transport(format!("Failed to open capture input {}: {}", path.display(), e))
    })
}

async fn feed_microphone<R>(mut frames: PcmFrames<R>, source: NativeAudioSource)
where
    R: AsyncRead + Unpin,
{
    loop {
        match frames.next_frame().await {
            Ok(Some(frame)) => {
                if let Err(e) = source.capture_frame(&frame).await {
                    warn!("Failed to push microphone frame: {}", e);
                    return;
                }
            }
            Ok(None) => {
                info!("Capture input ended");
                return;
            }
            Err(e) => {
                warn!("Capture input error: {}", e);
                return;
            }
        }
    }
}

/// Splits a raw PCM byte stream into 10 ms frames. A trailing partial frame
/// is dropped.
pub struct PcmFrames<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> PcmFrames<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: vec![0; (SAMPLES_PER_FRAME * NUM_CHANNELS) as usize * 2],
        }
    }

    pub async fn next_frame(&mut self) -> std::io::Result<Option<AudioFrame<'static>>> {
        match self.reader.read_exact(&mut self.buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }

        let data: Vec<i16> = self
            .buf
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Some(AudioFrame {
            data: data.into(),
            sample_rate: SAMPLE_RATE,
            num_channels: NUM_CHANNELS,
            samples_per_channel: SAMPLES_PER_FRAME,
        }))
    }
}

#[async_trait]
impl MediaTransport for LiveKitTransport {
    async fn connect(&self, credential: &Credential) -> Result<mpsc::UnboundedReceiver<MediaEvent>> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            warn!("Replacing an open room before connecting");
            close_room(previous).await;
        }

        let (room, mut room_events) = Room::connect(
            credential.server_endpoint.as_str(),
            &credential.token,
            RoomOptions::default(),
        )
        .await
        .map_err(|e| ClientError::Transport(format!("Failed to connect to room: {}", e)))?;

        info!("Connected to LiveKit room {}", room.name());

        let (tx, rx) = mpsc::unbounded_channel();
        let remote_audio: RemoteAudio = Arc::default();
        let mut translator =
            EventTranslator::new(self.next_subscription.clone(), remote_audio.clone());

        let forwarder = tokio::spawn(async move {
            while let Some(event) = room_events.recv().await {
                for event in translator.translate(event) {
                    if tx.send(event).is_err() {
                        debug!("Session event receiver dropped");
                        return;
                    }
                }
            }
        });

        *active = Some(ActiveRoom {
            room: Arc::new(room),
            microphone: None,
            capture: None,
            remote_audio,
            forwarder,
        });
        Ok(rx)
    }

    async fn disconnect(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        match active.take() {
            Some(room) => {
                close_room(room).await;
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn set_microphone_enabled(&self, enabled: bool) -> Result<()> {
        let mut guard = self.active.lock().await;
        let active = guard.as_mut().ok_or(ClientError::NotConnected)?;

        if active.microphone.is_none() {
            if !enabled {
                return Ok(());
            }
            self.publish_microphone(active).await?;
        }

        if let Some(track) = &active.microphone {
            if enabled {
                track.unmute();
            } else {
                track.mute();
            }
        }
        Ok(())
    }

    async fn set_output_muted(&self, track_sid: &str, muted: bool) -> Result<()> {
        let guard = self.active.lock().await;
        let active = guard.as_ref().ok_or(ClientError::NotConnected)?;
        let outputs = active
            .remote_audio
            .lock()
            .map_err(|_| ClientError::Transport("remote audio map poisoned".to_string()))?;

        match outputs.get(track_sid) {
            Some(track) if muted => track.disable(),
            Some(track) => track.enable(),
            None => debug!("No rendered output for {}", track_sid),
        }
        Ok(())
    }
}

async fn close_room(active: ActiveRoom) {
    if let Some(capture) = active.capture {
        capture.abort();
    }
    if let Err(e) = active.room.close().await {
        warn!("Error closing room: {}", e);
    }
    active.forwarder.abort();
}

/// Turns SDK room events into session events, assigning a fresh
/// subscription id to every remote audio subscription.
struct EventTranslator {
    next_subscription: Arc<AtomicU64>,
    remote_audio: RemoteAudio,
    /// track sid -> (subscription id, participant identity)
    subscriptions: HashMap<String, (u64, String)>,
    speaking: HashSet<String>,
}

impl EventTranslator {
    fn new(next_subscription: Arc<AtomicU64>, remote_audio: RemoteAudio) -> Self {
        Self {
            next_subscription,
            remote_audio,
            subscriptions: HashMap::new(),
            speaking: HashSet::new(),
        }
    }

    fn translate(&mut self, event: RoomEvent) -> Vec<MediaEvent> {
        match event {
            RoomEvent::Connected {
                participants_with_tracks,
            } => {
                let mut out = vec![MediaEvent::Connected];
                out.extend(participants_with_tracks.into_iter().map(|(participant, _)| {
                    MediaEvent::ParticipantJoined {
                        identity: participant.identity().to_string(),
                    }
                }));
                out
            }
            RoomEvent::Reconnecting => vec![MediaEvent::Reconnecting],
            RoomEvent::Reconnected => vec![MediaEvent::Reconnected],
            RoomEvent::Disconnected { reason } => vec![MediaEvent::Disconnected {
                reason: format!("{:?}", reason),
            }],
            RoomEvent::ParticipantConnected(participant) => vec![MediaEvent::ParticipantJoined {
                identity: participant.identity().to_string(),
            }],
            RoomEvent::ParticipantDisconnected(participant) => vec![MediaEvent::ParticipantLeft {
                identity: participant.identity().to_string(),
            }],
            RoomEvent::TrackSubscribed {
                track: RemoteTrack::Audio(track),
                participant,
                ..
            } => {
                let sid = track.sid().to_string();
                if let Ok(mut outputs) = self.remote_audio.lock() {
                    outputs.insert(sid.clone(), track);
                }
                vec![self.subscribed(sid, participant.identity().to_string())]
            }
            RoomEvent::TrackUnsubscribed {
                track: RemoteTrack::Audio(track),
                ..
            } => {
                let sid = track.sid().to_string();
                if let Ok(mut outputs) = self.remote_audio.lock() {
                    outputs.remove(&sid);
                }
                self.unsubscribed(&sid).into_iter().collect()
            }
            RoomEvent::TrackMuted {
                participant: Participant::Remote(_),
                publication,
            } => self
                .playback(&publication.sid().to_string(), Playback::Paused)
                .into_iter()
                .collect(),
            RoomEvent::TrackUnmuted {
                participant: Participant::Remote(_),
                publication,
            } => self
                .playback(&publication.sid().to_string(), Playback::Playing)
                .into_iter()
                .collect(),
            RoomEvent::ActiveSpeakersChanged { speakers } => {
                let identities: Vec<String> = speakers
                    .iter()
                    .map(|participant| participant.identity().to_string())
                    .collect();
                self.speakers_changed(&identities)
            }
            RoomEvent::LocalTrackPublished { track, .. } => {
                let kind = match track {
                    LocalTrack::Audio(_) => events::TrackKind::Audio,
                    LocalTrack::Video(_) => events::TrackKind::Video,
                };
                vec![MediaEvent::LocalTrackPublished {
                    track_sid: track.sid().to_string(),
                    kind,
                }]
            }
            other => {
                debug!("Ignoring room event: {:?}", other);
                Vec::new()
            }
        }
    }

    fn subscribed(&mut self, track_sid: String, participant_identity: String) -> MediaEvent {
        let subscription_id = self.next_subscription.fetch_add(1, Ordering::SeqCst) + 1;
        self.subscriptions
            .insert(track_sid.clone(), (subscription_id, participant_identity.clone()));
        MediaEvent::TrackSubscribed {
            track: RemoteTrackInfo {
                track_sid,
                participant_identity,
                kind: events::TrackKind::Audio,
                subscription_id,
            },
        }
    }

    fn unsubscribed(&mut self, track_sid: &str) -> Option<MediaEvent> {
        let (subscription_id, participant_identity) = self.subscriptions.remove(track_sid)?;
        Some(MediaEvent::TrackUnsubscribed {
            track: RemoteTrackInfo {
                track_sid: track_sid.to_string(),
                participant_identity,
                kind: events::TrackKind::Audio,
                subscription_id,
            },
        })
    }

    fn playback(&self, track_sid: &str, playback: Playback) -> Option<MediaEvent> {
        let (subscription_id, _) = self.subscriptions.get(track_sid)?;
        Some(MediaEvent::TrackPlayback {
            track_sid: track_sid.to_string(),
            subscription_id: *subscription_id,
            playback,
        })
    }

    /// Emits playback changes only for participants whose speaking state flipped.
    fn speakers_changed(&mut self, identities: &[String]) -> Vec<MediaEvent> {
        let now: HashSet<String> = identities.iter().cloned().collect();
        let mut out = Vec::new();

        for (track_sid, (subscription_id, identity)) in &self.subscriptions {
            let was = self.speaking.contains(identity);
            let is = now.contains(identity);
            if was != is {
                out.push(MediaEvent::TrackPlayback {
                    track_sid: track_sid.clone(),
                    subscription_id: *subscription_id,
                    playback: if is { Playback::Playing } else { Playback::Paused },
                });
            }
        }

        self.speaking = now;
        out
    }
}
