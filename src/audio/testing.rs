//! Dobles de prueba para la capa de voz, los streams y los avisos.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use songbird::input::{File, Input};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::sync::Notify;

use super::{
    notice::{Notice, NoticeSink},
    player::{ConnectionEvents, PlaybackEvents},
    transport::{TransportError, VoiceHandle, VoiceTransport},
};
use crate::sources::{AudioStream, CodecTag, StreamError, StreamSource, Track, TrackOrigin};

pub fn locator(title: &str) -> String {
    format!("https://youtu.be/{}", title)
}

pub fn track(title: &str) -> Track {
    Track::new(title, locator(title), TrackOrigin::YouTube, UserId::new(42))
}

#[derive(Default)]
pub struct FakeTransport {
    fail_connect: AtomicBool,
    connects: AtomicUsize,
    stops: AtomicUsize,
    disconnects: AtomicUsize,
    plays: Mutex<Vec<PlaybackEvents>>,
    connection: Mutex<Option<ConnectionEvents>>,
    connect_gate: Mutex<Option<Arc<Notify>>>,
    play_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeTransport {
    pub fn fail_connects(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    /// `connect` espera hasta `release_connect`
    pub fn gate_connect(&self) {
        *self.connect_gate.lock() = Some(Arc::new(Notify::new()));
    }

    pub fn release_connect(&self) {
        if let Some(gate) = self.connect_gate.lock().as_ref() {
            gate.notify_one();
        }
    }

    pub async fn wait_for_connects(&self, count: usize) {
        while self.connect_count() < count {
            tokio::task::yield_now().await;
        }
    }

    /// `play` registra el track y espera hasta `release_play`
    pub fn gate_play(&self) {
        *self.play_gate.lock() = Some(Arc::new(Notify::new()));
    }

    pub fn release_play(&self) {
        if let Some(gate) = self.play_gate.lock().as_ref() {
            gate.notify_one();
        }
    }

    pub async fn wait_for_plays(&self, count: usize) {
        while self.play_count() < count {
            tokio::task::yield_now().await;
        }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn play_count(&self) -> usize {
        self.plays.lock().len()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn last_playback(&self) -> PlaybackEvents {
        self.plays.lock().last().cloned().expect("nothing was played")
    }

    pub fn connection(&self) -> ConnectionEvents {
        self.connection.lock().clone().expect("never connected")
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        events: ConnectionEvents,
    ) -> Result<VoiceHandle, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let gate = self.connect_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Join("missing permissions".to_string()));
        }
        *self.connection.lock() = Some(events);
        Ok(VoiceHandle { guild_id, channel_id })
    }

    async fn play(
        &self,
        _handle: &VoiceHandle,
        _stream: AudioStream,
        events: PlaybackEvents,
    ) -> Result<(), TransportError> {
        self.plays.lock().push(events);
        let gate = self.play_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(())
    }

    fn pause(&self, _handle: &VoiceHandle) -> Result<(), TransportError> {
        Ok(())
    }

    fn resume(&self, _handle: &VoiceHandle) -> Result<(), TransportError> {
        Ok(())
    }

    fn stop(&self, _handle: &VoiceHandle) -> Result<(), TransportError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self, _handle: VoiceHandle) -> Result<(), TransportError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fuente de streams con fallos y esperas controladas por título
#[derive(Default)]
pub struct FakeStreams {
    failing: Mutex<HashSet<String>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    opened: Mutex<Vec<String>>,
}

impl FakeStreams {
    pub fn fail(&self, title: &str) {
        self.failing.lock().insert(locator(title));
    }

    /// `open` para este título espera hasta `release`
    pub fn gate(&self, title: &str) {
        self.gates.lock().insert(locator(title), Arc::new(Notify::new()));
    }

    pub fn release(&self, title: &str) {
        if let Some(gate) = self.gates.lock().get(&locator(title)) {
            gate.notify_one();
        }
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }

    pub async fn wait_for_opens(&self, count: usize) {
        while self.opened.lock().len() < count {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl StreamSource for FakeStreams {
    async fn open(&self, locator: &str) -> Result<AudioStream, StreamError> {
        self.opened.lock().push(locator.to_string());

        let gate = self.gates.lock().get(locator).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.failing.lock().contains(locator) {
            return Err(StreamError::Unavailable(format!("{} is gone", locator)));
        }
        Ok(AudioStream::new(Input::from(File::new(locator.to_string())), CodecTag::Opus))
    }
}

#[derive(Default)]
pub struct RecordingNotices {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotices {
    pub fn all(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn now_playing(&self) -> Vec<String> {
        self.notices
            .lock()
            .iter()
            .filter_map(|notice| match notice {
                Notice::NowPlaying(track) => Some(track.title().to_string()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl NoticeSink for RecordingNotices {
    async fn publish(&self, _guild_id: GuildId, notice: Notice) {
        self.notices.lock().push(notice);
    }
}
