use futures::{future::BoxFuture, FutureExt};
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::{
    auto_leave::{AutoLeaveTimer, TimerTicket},
    notice::{Notice, NoticeSink},
    queue::{PlaybackQueue, QueueError, QueueSnapshot},
    registry::SessionRegistry,
    transport::{TransportError, VoiceHandle, VoiceTransport},
};
use crate::{config::Config, sources::StreamSource, sources::Track};

/// Límites y tiempos de una sesión de reproducción
#[derive(Debug, Clone)]
pub struct PlaybackSettings {
    pub max_queue_length: usize,
    pub auto_leave_delay: Duration,
    pub max_retry: u32,
    pub reconnect_grace: Duration,
}

impl PlaybackSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_queue_length: config.max_queue_size,
            auto_leave_delay: config.auto_leave_delay,
            max_retry: config.max_retry.max(1),
            reconnect_grace: config.reconnect_grace,
        }
    }
}

/// Dependencias externas compartidas por todas las sesiones
#[derive(Clone)]
pub struct PlaybackServices {
    pub streams: Arc<dyn StreamSource>,
    pub transport: Arc<dyn VoiceTransport>,
    pub notices: Arc<dyn NoticeSink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Connecting,
    Playing,
    Paused,
    AwaitingNext,
    Stopped,
}

impl PlaybackState {
    fn is_active(self) -> bool {
        matches!(
            self,
            PlaybackState::Connecting
                | PlaybackState::Playing
                | PlaybackState::Paused
                | PlaybackState::AwaitingNext
        )
    }
}

/// Resultado de un intento de avanzar la reproducción
#[derive(Debug, Clone)]
pub enum PlaybackOutcome {
    Playing(Arc<Track>),
    /// La sesión ya estaba reproduciendo o conectando
    AlreadyActive,
    QueueEmpty,
    /// Otro comando tomó el control mientras se obtenía el stream
    Superseded,
    /// Se alcanzó el límite de fallos consecutivos; la sesión terminó
    GaveUp,
    /// Se descartó un track antes de que empezara a sonar
    Skipped(Arc<Track>),
    /// No había nada que saltar
    Inactive,
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("{0}")]
    Connect(#[source] TransportError),
    #[error("the session is closing")]
    SessionClosed,
}

/// Vista de la sesión para comandos de consulta
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: PlaybackState,
    pub queue: QueueSnapshot,
    pub channel_id: Option<ChannelId>,
    pub consecutive_failures: u32,
    pub auto_leave_armed: bool,
}

struct ControllerState {
    status: PlaybackState,
    queue: PlaybackQueue,
    /// Se incrementa con cada adquisición, stop, skip y cierre
    generation: u64,
    consecutive_failures: u32,
    voice: Option<VoiceHandle>,
    link_down: bool,
    link_epoch: u64,
    auto_leave: AutoLeaveTimer,
}

enum FailureVerdict {
    Retry,
    GaveUp,
}

/// Máquina de estados de reproducción de un guild.
///
/// Todo el estado vive detrás de un único mutex asíncrono. El lock nunca se
/// mantiene durante la conexión de voz, la obtención de streams ni las
/// esperas de temporizadores; cada obtención queda marcada con la generación
/// vigente y su resultado se descarta si la generación cambió entretanto.
pub struct PlaybackController {
    guild_id: GuildId,
    settings: PlaybackSettings,
    services: PlaybackServices,
    registry: Weak<SessionRegistry>,
    me: Weak<PlaybackController>,
    state: Mutex<ControllerState>,
}

impl PlaybackController {
    pub fn new(
        guild_id: GuildId,
        settings: PlaybackSettings,
        services: PlaybackServices,
        registry: Weak<SessionRegistry>,
    ) -> Arc<Self> {
        let state = ControllerState {
            status: PlaybackState::Idle,
            queue: PlaybackQueue::new(settings.max_queue_length),
            generation: 0,
            consecutive_failures: 0,
            voice: None,
            link_down: false,
            link_epoch: 0,
            auto_leave: AutoLeaveTimer::new(settings.auto_leave_delay),
        };

        Arc::new_cyclic(|me| Self {
            guild_id,
            settings,
            services,
            registry,
            me: me.clone(),
            state: Mutex::new(state),
        })
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub async fn state(&self) -> PlaybackState {
        self.state.lock().await.status
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let st = self.state.lock().await;
        SessionSnapshot {
            state: st.status,
            queue: st.queue.snapshot(),
            channel_id: st.voice.as_ref().map(|voice| voice.channel_id),
            consecutive_failures: st.consecutive_failures,
            auto_leave_armed: st.auto_leave.is_armed(),
        }
    }

    /// Agrega tracks a la cola (todo o nada) y cancela el auto-leave
    pub async fn enqueue(&self, tracks: Vec<Track>) -> Result<usize, PlaybackError> {
        let mut st = self.state.lock().await;
        if st.status == PlaybackState::Stopped {
            return Err(PlaybackError::SessionClosed);
        }

        let added = st.queue.enqueue_many(tracks)?;
        if st.auto_leave.cancel() {
            debug!("⏱️ Auto-leave cancelado en guild {}: hay tracks nuevos", self.guild_id);
        }
        Ok(added)
    }

    /// Conecta (si hace falta) y comienza a reproducir la cola.
    ///
    /// Si la sesión ya está activa no hace nada. Un fallo de conexión
    /// termina la sesión y se informa una única vez en el `Err`.
    pub async fn start(&self, channel_id: ChannelId) -> Result<PlaybackOutcome, PlaybackError> {
        let (generation, needs_connect) = {
            let mut st = self.state.lock().await;
            if st.status == PlaybackState::Stopped {
                return Err(PlaybackError::SessionClosed);
            }
            st.auto_leave.cancel();
            if st.status.is_active() {
                return Ok(PlaybackOutcome::AlreadyActive);
            }

            st.status = PlaybackState::Connecting;
            st.generation += 1;
            (st.generation, st.voice.is_none())
        };

        if needs_connect {
            info!("🔗 Conectando al canal {} en guild {}", channel_id, self.guild_id);
            let events = ConnectionEvents {
                controller: self.me.clone(),
            };
            let connected = self
                .services
                .transport
                .connect(self.guild_id, channel_id, events)
                .await;

            let mut st = self.state.lock().await;
            if st.status == PlaybackState::Stopped {
                drop(st);
                if let Ok(voice) = connected {
                    self.disconnect_quietly(voice).await;
                }
                return Ok(PlaybackOutcome::Superseded);
            }

            match connected {
                Ok(voice) => {
                    info!("🔊 Conectado al canal {} en guild {}", voice.channel_id, self.guild_id);
                    st.voice = Some(voice);
                }
                Err(e) => {
                    warn!("❌ No se pudo conectar en guild {}: {}", self.guild_id, e);
                    st.status = PlaybackState::Stopped;
                    st.generation += 1;
                    st.auto_leave.cancel();
                    st.queue.clear();
                    drop(st);
                    self.release();
                    return Err(PlaybackError::Connect(e));
                }
            }
        }

        Ok(self.advance_and_play(Some(generation)).await)
    }

    /// Avanza la cola y reproduce el siguiente track disponible.
    ///
    /// `guard` es la generación observada por quien pide el avance; si ya
    /// no es la vigente, otro comando ganó y no se hace nada.
    async fn advance_and_play(&self, mut guard: Option<u64>) -> PlaybackOutcome {
        loop {
            let (generation, track) = {
                let mut st = self.state.lock().await;
                if st.status == PlaybackState::Stopped {
                    return PlaybackOutcome::Superseded;
                }
                if let Some(expected) = guard {
                    if st.generation != expected {
                        debug!(
                            "🗑️ Avance obsoleto en guild {} (gen {} != {})",
                            self.guild_id, expected, st.generation
                        );
                        return PlaybackOutcome::Superseded;
                    }
                }

                st.generation += 1;
                let generation = st.generation;
                match st.queue.advance() {
                    Some(track) => {
                        if st.status != PlaybackState::Connecting {
                            st.status = PlaybackState::AwaitingNext;
                        }
                        (generation, track)
                    }
                    None => {
                        info!("📭 Cola terminada en guild {}", self.guild_id);
                        st.status = PlaybackState::Idle;
                        self.arm_auto_leave(&mut st);
                        return PlaybackOutcome::QueueEmpty;
                    }
                }
            };

            debug!("🎯 Obteniendo stream (gen {}): {}", generation, track.title());
            let opened = self.services.streams.open(track.locator()).await;

            let mut st = self.state.lock().await;
            if st.generation != generation || st.status == PlaybackState::Stopped {
                debug!(
                    "🗑️ Stream descartado en guild {} (gen {} != {}): {}",
                    self.guild_id,
                    generation,
                    st.generation,
                    track.title()
                );
                return PlaybackOutcome::Superseded;
            }

            let reason = match (opened, st.voice.clone()) {
                (Ok(stream), Some(voice)) => {
                    info!("🎵 Reproduciendo en guild {}: {} ({})", self.guild_id, track.title(), stream.codec);
                    let events = PlaybackEvents {
                        controller: self.me.clone(),
                        generation,
                    };
                    match self.services.transport.play(&voice, stream, events).await {
                        Ok(()) => {
                            st.status = PlaybackState::Playing;
                            st.auto_leave.cancel();
                            drop(st);
                            self.announce(Notice::NowPlaying(Arc::clone(&track))).await;
                            return PlaybackOutcome::Playing(track);
                        }
                        Err(e) => e.to_string(),
                    }
                }
                (Ok(_), None) => TransportError::NotConnected.to_string(),
                (Err(e), _) => e.to_string(),
            };

            match self.record_failure(st, &track, reason).await {
                FailureVerdict::Retry => guard = Some(generation),
                FailureVerdict::GaveUp => return PlaybackOutcome::GaveUp,
            }
        }
    }

    /// Cuenta un fallo consecutivo. Al llegar al límite cierra la sesión.
    async fn record_failure(
        &self,
        mut st: MutexGuard<'_, ControllerState>,
        track: &Track,
        reason: String,
    ) -> FailureVerdict {
        st.consecutive_failures += 1;
        let failures = st.consecutive_failures;
        warn!(
            "⚠️ Fallo {}/{} en guild {}: {} ({})",
            failures,
            self.settings.max_retry,
            self.guild_id,
            track.title(),
            reason
        );

        if failures >= self.settings.max_retry {
            let voice = self.begin_teardown(&mut st);
            drop(st);
            self.announce(Notice::GivingUp { failures, reason }).await;
            self.finish_teardown(voice).await;
            return FailureVerdict::GaveUp;
        }

        drop(st);
        self.announce(Notice::SkippingBroken {
            title: track.title().to_string(),
            reason,
        })
        .await;
        FailureVerdict::Retry
    }

    /// Un track que termina limpio es el único éxito que reinicia el contador
    /// de fallos; aceptar el stream no basta.
    async fn on_track_end(&self, generation: u64) {
        {
            let mut st = self.state.lock().await;
            if st.generation != generation
                || !matches!(st.status, PlaybackState::Playing | PlaybackState::Paused)
            {
                debug!("🗑️ Fin de track obsoleto ignorado (gen {})", generation);
                return;
            }
            st.consecutive_failures = 0;
        }

        debug!("🔚 Track terminado en guild {}", self.guild_id);
        self.advance_and_play(Some(generation)).await;
    }

    async fn on_track_error(&self, generation: u64, reason: String) {
        let mut st = self.state.lock().await;
        if st.generation != generation
            || !matches!(st.status, PlaybackState::Playing | PlaybackState::Paused)
        {
            debug!("🗑️ Error de track obsoleto ignorado (gen {})", generation);
            return;
        }
        let Some(track) = st.queue.current().cloned() else {
            return;
        };

        let loop_disabled = st.queue.is_looping();
        if loop_disabled {
            st.queue.set_loop(false);
        }
        st.status = PlaybackState::AwaitingNext;

        if let FailureVerdict::GaveUp = self.record_failure(st, &track, reason).await {
            return;
        }
        if loop_disabled {
            self.announce(Notice::LoopDisabled {
                title: track.title().to_string(),
            })
            .await;
        }
        self.advance_and_play(Some(generation)).await;
    }

    pub async fn pause(&self) -> bool {
        let mut st = self.state.lock().await;
        if st.status != PlaybackState::Playing {
            return false;
        }
        let Some(voice) = st.voice.as_ref() else {
            return false;
        };

        match self.services.transport.pause(voice) {
            Ok(()) => {
                st.status = PlaybackState::Paused;
                info!("⏸️ Pausado en guild {}", self.guild_id);
                true
            }
            Err(e) => {
                warn!("⚠️ No se pudo pausar en guild {}: {}", self.guild_id, e);
                false
            }
        }
    }

    pub async fn resume(&self) -> bool {
        let mut st = self.state.lock().await;
        if st.status != PlaybackState::Paused {
            return false;
        }
        let Some(voice) = st.voice.as_ref() else {
            return false;
        };

        match self.services.transport.resume(voice) {
            Ok(()) => {
                st.status = PlaybackState::Playing;
                info!("▶️ Reanudado en guild {}", self.guild_id);
                true
            }
            Err(e) => {
                warn!("⚠️ No se pudo reanudar en guild {}: {}", self.guild_id, e);
                false
            }
        }
    }

    /// Salta al siguiente track, descartando cualquier obtención en curso
    pub async fn skip(&self) -> PlaybackOutcome {
        let generation = {
            let mut st = self.state.lock().await;
            let status = st.status;
            match status {
                PlaybackState::Playing | PlaybackState::Paused => {
                    if let Some(voice) = st.voice.as_ref() {
                        if let Err(e) = self.services.transport.stop(voice) {
                            debug!("Error deteniendo track (ignorado): {}", e);
                        }
                    }
                    st.status = PlaybackState::AwaitingNext;
                }
                PlaybackState::AwaitingNext => {}
                PlaybackState::Connecting if st.voice.is_some() => {}
                // La primera conexión sigue pendiente: `start` avanzará al
                // terminar, así que basta con quitar la cabeza de la cola.
                PlaybackState::Connecting => {
                    return match st.queue.remove(0) {
                        Some(track) => {
                            info!(
                                "⏭️ Saltado antes de conectar en guild {}: {}",
                                self.guild_id,
                                track.title()
                            );
                            PlaybackOutcome::Skipped(track)
                        }
                        None => PlaybackOutcome::Inactive,
                    };
                }
                _ => return PlaybackOutcome::Inactive,
            }
            st.generation
        };

        info!("⏭️ Saltando track en guild {}", self.guild_id);
        self.advance_and_play(Some(generation)).await
    }

    /// Vacía la cola y detiene la reproducción sin salir del canal
    pub async fn stop(&self) -> bool {
        let mut st = self.state.lock().await;
        if st.status == PlaybackState::Stopped {
            return false;
        }

        st.queue.clear();
        st.generation += 1;
        st.consecutive_failures = 0;
        if let Some(voice) = st.voice.as_ref() {
            if let Err(e) = self.services.transport.stop(voice) {
                debug!("Error deteniendo track (ignorado): {}", e);
            }
        }
        st.status = PlaybackState::Idle;
        self.arm_auto_leave(&mut st);
        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
        true
    }

    pub async fn toggle_loop(&self) -> bool {
        let enabled = self.state.lock().await.queue.toggle_loop();
        info!("🔁 Loop {} en guild {}", if enabled { "activado" } else { "desactivado" }, self.guild_id);
        enabled
    }

    pub async fn set_loop(&self, enabled: bool) {
        self.state.lock().await.queue.set_loop(enabled);
    }

    /// Mezcla los pendientes. Devuelve cuántos se mezclaron.
    pub async fn shuffle(&self) -> usize {
        self.state.lock().await.queue.shuffle()
    }

    /// Quita el pendiente en `index` (base 0)
    pub async fn remove(&self, index: usize) -> Option<Arc<Track>> {
        self.state.lock().await.queue.remove(index)
    }

    /// Track que está sonando y si está en pausa
    pub async fn now_playing(&self) -> Option<(Arc<Track>, bool)> {
        let st = self.state.lock().await;
        match st.status {
            PlaybackState::Playing | PlaybackState::Paused => st
                .queue
                .current()
                .map(|track| (Arc::clone(track), st.status == PlaybackState::Paused)),
            _ => None,
        }
    }

    /// Cierra una sesión que nunca llegó a usarse (sin voz ni tracks).
    pub async fn discard_if_unused(&self) -> bool {
        {
            let mut st = self.state.lock().await;
            if st.status != PlaybackState::Idle
                || st.voice.is_some()
                || !st.queue.snapshot().is_empty()
            {
                return false;
            }
            self.begin_teardown(&mut st);
        }
        self.release();
        debug!("🧹 Sesión sin uso descartada en guild {}", self.guild_id);
        true
    }

    /// Sale del canal y cierra la sesión. Devuelve `false` si ya estaba cerrada.
    pub async fn leave(&self) -> bool {
        let voice = {
            let mut st = self.state.lock().await;
            if st.status == PlaybackState::Stopped {
                return false;
            }
            self.begin_teardown(&mut st)
        };
        self.finish_teardown(voice).await;
        true
    }

    fn begin_teardown(&self, st: &mut ControllerState) -> Option<VoiceHandle> {
        st.status = PlaybackState::Stopped;
        st.generation += 1;
        st.auto_leave.cancel();
        st.queue.clear();
        st.link_down = false;
        if let Some(voice) = st.voice.as_ref() {
            if let Err(e) = self.services.transport.stop(voice) {
                debug!("Error deteniendo track (ignorado): {}", e);
            }
        }
        st.voice.take()
    }

    async fn finish_teardown(&self, voice: Option<VoiceHandle>) {
        if let Some(voice) = voice {
            self.disconnect_quietly(voice).await;
        }
        self.release();
        info!("👋 Sesión cerrada en guild {}", self.guild_id);
    }

    async fn disconnect_quietly(&self, voice: VoiceHandle) {
        if let Err(e) = self.services.transport.disconnect(voice).await {
            debug!("Error desconectando en guild {} (ignorado): {}", self.guild_id, e);
        }
    }

    fn release(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.release(self.guild_id, self);
        }
    }

    fn arm_auto_leave(&self, st: &mut ControllerState) {
        let controller = self.me.clone();
        st.auto_leave
            .arm(move |ticket| auto_leave_task(controller, ticket));
    }

    async fn on_auto_leave(&self, ticket: TimerTicket) {
        let voice = {
            let mut st = self.state.lock().await;
            if !st.auto_leave.claim(ticket) {
                debug!("⏱️ Auto-leave {:?} ya no es vigente", ticket);
                return;
            }
            if st.status != PlaybackState::Idle || !st.queue.is_empty() {
                debug!("⏱️ Auto-leave ignorado en guild {}: la sesión sigue activa", self.guild_id);
                return;
            }
            self.begin_teardown(&mut st)
        };

        info!("🚪 Saliendo por inactividad de guild {}", self.guild_id);
        self.announce(Notice::IdleTimeout).await;
        self.finish_teardown(voice).await;
    }

    async fn on_link_lost(&self) {
        let epoch = {
            let mut st = self.state.lock().await;
            if st.status == PlaybackState::Stopped || st.voice.is_none() {
                return;
            }
            st.link_down = true;
            st.link_epoch += 1;
            st.link_epoch
        };

        warn!(
            "🔌 Conexión de voz perdida en guild {}, esperando {:?}",
            self.guild_id, self.settings.reconnect_grace
        );
        tokio::spawn(link_grace_task(self.me.clone(), epoch, self.settings.reconnect_grace));
    }

    async fn on_link_restored(&self) {
        let mut st = self.state.lock().await;
        if st.link_down {
            st.link_down = false;
            st.link_epoch += 1;
            info!("🔄 Conexión de voz recuperada en guild {}", self.guild_id);
        }
    }

    async fn on_link_grace_elapsed(&self, epoch: u64) {
        let voice = {
            let mut st = self.state.lock().await;
            if !st.link_down || st.link_epoch != epoch || st.status == PlaybackState::Stopped {
                return;
            }
            self.begin_teardown(&mut st)
        };

        self.announce(Notice::ConnectionLost).await;
        self.finish_teardown(voice).await;
    }

    async fn announce(&self, notice: Notice) {
        self.services.notices.publish(self.guild_id, notice).await;
    }
}

fn auto_leave_task(controller: Weak<PlaybackController>, ticket: TimerTicket) -> BoxFuture<'static, ()> {
    async move {
        if let Some(controller) = controller.upgrade() {
            controller.on_auto_leave(ticket).await;
        }
    }
    .boxed()
}

fn link_grace_task(
    controller: Weak<PlaybackController>,
    epoch: u64,
    grace: Duration,
) -> BoxFuture<'static, ()> {
    async move {
        tokio::time::sleep(grace).await;
        if let Some(controller) = controller.upgrade() {
            controller.on_link_grace_elapsed(epoch).await;
        }
    }
    .boxed()
}

/// Notificaciones de un track concreto, entregadas por la capa de voz.
///
/// Llevan la generación con la que se inició el track; si ya no es la
/// vigente se ignoran.
#[derive(Clone)]
pub struct PlaybackEvents {
    controller: Weak<PlaybackController>,
    generation: u64,
}

impl PlaybackEvents {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn finished(&self) {
        if let Some(controller) = self.controller.upgrade() {
            controller.on_track_end(self.generation).await;
        }
    }

    pub async fn failed(&self, reason: String) {
        if let Some(controller) = self.controller.upgrade() {
            controller.on_track_error(self.generation, reason).await;
        }
    }
}

/// Notificaciones del estado del enlace de voz
#[derive(Clone)]
pub struct ConnectionEvents {
    controller: Weak<PlaybackController>,
}

impl ConnectionEvents {
    pub async fn lost(&self) {
        if let Some(controller) = self.controller.upgrade() {
            controller.on_link_lost().await;
        }
    }

    pub async fn restored(&self) {
        if let Some(controller) = self.controller.upgrade() {
            controller.on_link_restored().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        queue::LoopMode,
        testing::{locator, track, FakeStreams, FakeTransport, RecordingNotices},
    };
    use pretty_assertions::assert_eq;

    struct Harness {
        controller: Arc<PlaybackController>,
        transport: Arc<FakeTransport>,
        streams: Arc<FakeStreams>,
        notices: Arc<RecordingNotices>,
    }

    fn settings() -> PlaybackSettings {
        PlaybackSettings {
            max_queue_length: 10,
            auto_leave_delay: Duration::from_millis(100),
            max_retry: 3,
            reconnect_grace: Duration::from_millis(50),
        }
    }

    fn harness() -> Harness {
        let transport = Arc::new(FakeTransport::default());
        let streams = Arc::new(FakeStreams::default());
        let notices = Arc::new(RecordingNotices::default());
        let services = PlaybackServices {
            streams: streams.clone(),
            transport: transport.clone(),
            notices: notices.clone(),
        };
        let controller = PlaybackController::new(GuildId::new(1), settings(), services, Weak::new());
        Harness {
            controller,
            transport,
            streams,
            notices,
        }
    }

    fn tracks(titles: &[&str]) -> Vec<Track> {
        titles.iter().map(|title| track(title)).collect()
    }

    fn pending_titles(snapshot: &SessionSnapshot) -> Vec<String> {
        snapshot
            .queue
            .pending
            .iter()
            .map(|t| t.title().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_plays_queue_in_order_then_arms_auto_leave() {
        let h = harness();
        h.controller.enqueue(tracks(&["a", "b"])).await.unwrap();

        let outcome = h.controller.start(ChannelId::new(9)).await.unwrap();
        assert!(matches!(outcome, PlaybackOutcome::Playing(ref t) if t.title() == "a"));
        assert_eq!(h.controller.state().await, PlaybackState::Playing);

        h.transport.last_playback().finished().await;
        assert_eq!(h.notices.now_playing(), vec!["a", "b"]);

        h.transport.last_playback().finished().await;
        let snapshot = h.controller.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert!(snapshot.queue.is_empty());
        assert!(snapshot.auto_leave_armed);
        assert_eq!(h.transport.connect_count(), 1);
        assert_eq!(h.streams.opened(), vec![locator("a"), locator("b")]);
    }

    #[tokio::test]
    async fn test_start_while_active_is_a_no_op() {
        let h = harness();
        h.controller.enqueue(tracks(&["a", "b"])).await.unwrap();
        h.controller.start(ChannelId::new(9)).await.unwrap();

        let again = h.controller.start(ChannelId::new(9)).await.unwrap();
        assert!(matches!(again, PlaybackOutcome::AlreadyActive));
        assert_eq!(h.transport.connect_count(), 1);
        assert_eq!(h.notices.now_playing(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_loop_replays_same_track() {
        let h = harness();
        h.controller.enqueue(tracks(&["a", "b"])).await.unwrap();
        h.controller.start(ChannelId::new(9)).await.unwrap();
        assert!(h.controller.toggle_loop().await);

        for _ in 0..3 {
            h.transport.last_playback().finished().await;
        }
        assert_eq!(h.notices.now_playing(), vec!["a", "a", "a", "a"]);
        assert_eq!(pending_titles(&h.controller.snapshot().await), vec!["b"]);

        h.controller.set_loop(false).await;
        h.transport.last_playback().finished().await;
        assert_eq!(h.notices.now_playing().last().map(String::as_str), Some("b"));
    }

    #[tokio::test]
    async fn test_stale_completion_is_ignored() {
        let h = harness();
        h.controller.enqueue(tracks(&["a", "b", "c"])).await.unwrap();
        h.controller.start(ChannelId::new(9)).await.unwrap();
        let first = h.transport.last_playback();

        let outcome = h.controller.skip().await;
        assert!(matches!(outcome, PlaybackOutcome::Playing(ref t) if t.title() == "b"));

        first.finished().await;
        assert_eq!(h.notices.now_playing(), vec!["a", "b"]);
        assert_eq!(pending_titles(&h.controller.snapshot().await), vec!["c"]);
        assert_eq!(h.transport.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_consecutive_failures() {
        let h = harness();
        for title in ["a", "b", "c", "d", "e"] {
            h.streams.fail(title);
        }
        h.controller.enqueue(tracks(&["a", "b", "c", "d", "e"])).await.unwrap();

        let outcome = h.controller.start(ChannelId::new(9)).await.unwrap();
        assert!(matches!(outcome, PlaybackOutcome::GaveUp));
        assert_eq!(h.controller.state().await, PlaybackState::Stopped);
        assert_eq!(h.streams.opened().len(), 3);
        assert_eq!(h.transport.play_count(), 0);
        assert_eq!(h.transport.disconnect_count(), 1);

        let notices = h.notices.all();
        assert_eq!(notices.len(), 3);
        assert!(matches!(notices[0], Notice::SkippingBroken { ref title, .. } if title == "a"));
        assert!(matches!(notices[1], Notice::SkippingBroken { ref title, .. } if title == "b"));
        assert!(matches!(notices[2], Notice::GivingUp { failures: 3, .. }));

        let late = h.controller.enqueue(tracks(&["f"])).await;
        assert!(matches!(late, Err(PlaybackError::SessionClosed)));
    }

    #[tokio::test]
    async fn test_looping_broken_track_terminates() {
        let h = harness();
        h.streams.fail("a");
        h.controller.enqueue(tracks(&["a"])).await.unwrap();
        h.controller.set_loop(true).await;
        h.controller.start(ChannelId::new(9)).await.unwrap();

        // primer intento saca "a" de la cola; los siguientes lo repiten
        assert_eq!(h.streams.opened(), vec![locator("a"); 3]);
        assert_eq!(h.controller.state().await, PlaybackState::Stopped);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let h = harness();
        for title in ["bad1", "bad2", "bad3"] {
            h.streams.fail(title);
        }
        h.controller
            .enqueue(tracks(&["bad1", "good", "bad2", "bad3", "good2"]))
            .await
            .unwrap();

        h.controller.start(ChannelId::new(9)).await.unwrap();
        assert_eq!(h.controller.snapshot().await.consecutive_failures, 1);

        h.transport.last_playback().finished().await;
        let snapshot = h.controller.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(snapshot.consecutive_failures, 2);
        assert_eq!(snapshot.queue.current.map(|t| t.title().to_string()), Some("good2".to_string()));
        assert_eq!(h.notices.now_playing(), vec!["good", "good2"]);
    }

    #[tokio::test]
    async fn test_playback_errors_in_a_row_give_up() {
        let h = harness();
        h.controller
            .enqueue(tracks(&["a", "b", "c", "d", "e", "f"]))
            .await
            .unwrap();
        h.controller.start(ChannelId::new(9)).await.unwrap();

        for _ in 0..3 {
            h.transport.last_playback().failed("HTTP 403".to_string()).await;
        }

        assert_eq!(h.controller.state().await, PlaybackState::Stopped);
        assert_eq!(h.transport.play_count(), 3);
        assert_eq!(h.transport.disconnect_count(), 1);
        assert_eq!(h.notices.now_playing(), vec!["a", "b", "c"]);
        assert!(matches!(
            h.notices.all().last(),
            Some(Notice::GivingUp { failures: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_skip_during_acquisition_discards_stale_stream() {
        let h = harness();
        h.streams.gate("a");
        h.controller.enqueue(tracks(&["a", "b"])).await.unwrap();

        let controller = Arc::clone(&h.controller);
        let start = tokio::spawn(async move { controller.start(ChannelId::new(9)).await });
        h.streams.wait_for_opens(1).await;

        let skipped = h.controller.skip().await;
        assert!(matches!(skipped, PlaybackOutcome::Playing(ref t) if t.title() == "b"));

        h.streams.release("a");
        let started = start.await.unwrap().unwrap();
        assert!(matches!(started, PlaybackOutcome::Superseded));

        assert_eq!(h.transport.play_count(), 1);
        assert_eq!(h.notices.now_playing(), vec!["b"]);
        let snapshot = h.controller.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(snapshot.queue.current.map(|t| t.title().to_string()), Some("b".to_string()));
    }

    #[tokio::test]
    async fn test_skip_while_connecting_drops_first_track() {
        let h = harness();
        h.transport.gate_connect();
        h.controller.enqueue(tracks(&["a", "b"])).await.unwrap();

        let controller = h.controller.clone();
        let start = tokio::spawn(async move { controller.start(ChannelId::new(9)).await });
        h.transport.wait_for_connects(1).await;

        let skipped = h.controller.skip().await;
        assert!(matches!(skipped, PlaybackOutcome::Skipped(ref t) if t.title() == "a"));

        h.transport.release_connect();
        let started = start.await.unwrap().unwrap();
        assert!(matches!(started, PlaybackOutcome::Playing(ref t) if t.title() == "b"));
        assert_eq!(h.streams.opened(), vec![locator("b")]);
        assert_eq!(h.notices.now_playing(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_stop_during_acquisition_discards_stream() {
        let h = harness();
        h.streams.gate("a");
        h.controller.enqueue(tracks(&["a", "b"])).await.unwrap();

        let controller = Arc::clone(&h.controller);
        let start = tokio::spawn(async move { controller.start(ChannelId::new(9)).await });
        h.streams.wait_for_opens(1).await;

        assert!(h.controller.stop().await);
        h.streams.release("a");
        assert!(matches!(start.await.unwrap().unwrap(), PlaybackOutcome::Superseded));

        let snapshot = h.controller.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert!(snapshot.queue.is_empty());
        assert_eq!(h.transport.play_count(), 0);
    }

    #[tokio::test]
    async fn test_playback_error_disables_loop_and_advances() {
        let h = harness();
        h.controller.enqueue(tracks(&["a", "b"])).await.unwrap();
        h.controller.start(ChannelId::new(9)).await.unwrap();
        h.controller.set_loop(true).await;

        h.transport.last_playback().failed("decoder crashed".to_string()).await;

        let snapshot = h.controller.snapshot().await;
        assert_eq!(snapshot.queue.loop_mode, LoopMode::Off);
        assert_eq!(snapshot.queue.current.map(|t| t.title().to_string()), Some("b".to_string()));
        assert!(h
            .notices
            .all()
            .contains(&Notice::LoopDisabled { title: "a".to_string() }));
    }

    #[tokio::test]
    async fn test_now_playing_shuffle_and_remove() {
        let h = harness();
        assert!(h.controller.now_playing().await.is_none());
        h.controller.enqueue(tracks(&["a", "b", "c", "d"])).await.unwrap();
        h.controller.start(ChannelId::new(9)).await.unwrap();

        let (current, paused) = h.controller.now_playing().await.unwrap();
        assert_eq!(current.title(), "a");
        assert!(!paused);
        h.controller.pause().await;
        assert!(h.controller.now_playing().await.unwrap().1);

        assert_eq!(h.controller.remove(0).await.map(|t| t.title().to_string()), Some("b".to_string()));
        assert!(h.controller.remove(5).await.is_none());
        assert_eq!(h.controller.shuffle().await, 2);

        let mut rest = pending_titles(&h.controller.snapshot().await);
        rest.sort();
        assert_eq!(rest, vec!["c", "d"]);
    }

    #[tokio::test]
    async fn test_discard_only_unused_sessions() {
        let h = harness();
        h.controller.enqueue(tracks(&["a"])).await.unwrap();
        assert!(!h.controller.discard_if_unused().await);

        let fresh = harness();
        assert!(fresh.controller.discard_if_unused().await);
        assert_eq!(fresh.controller.state().await, PlaybackState::Stopped);
        assert_eq!(fresh.transport.disconnect_count(), 0);
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let h = harness();
        assert!(!h.controller.pause().await);

        h.controller.enqueue(tracks(&["a"])).await.unwrap();
        h.controller.start(ChannelId::new(9)).await.unwrap();

        assert!(h.controller.pause().await);
        assert!(!h.controller.pause().await);
        assert_eq!(h.controller.state().await, PlaybackState::Paused);
        assert!(h.controller.resume().await);
        assert!(!h.controller.resume().await);
        assert_eq!(h.controller.state().await, PlaybackState::Playing);
    }

    #[tokio::test]
    async fn test_skip_when_idle_is_inactive() {
        let h = harness();
        assert!(matches!(h.controller.skip().await, PlaybackOutcome::Inactive));
    }

    #[tokio::test]
    async fn test_stop_keeps_connection_for_next_start() {
        let h = harness();
        h.controller.enqueue(tracks(&["a", "b"])).await.unwrap();
        h.controller.start(ChannelId::new(9)).await.unwrap();

        assert!(h.controller.stop().await);
        let snapshot = h.controller.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert!(snapshot.queue.is_empty());
        assert!(snapshot.auto_leave_armed);

        h.controller.enqueue(tracks(&["c"])).await.unwrap();
        assert!(!h.controller.snapshot().await.auto_leave_armed);
        h.controller.start(ChannelId::new(9)).await.unwrap();

        assert_eq!(h.transport.connect_count(), 1);
        assert_eq!(h.notices.now_playing(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_connect_failure_ends_session() {
        let h = harness();
        h.transport.fail_connects();
        h.controller.enqueue(tracks(&["a"])).await.unwrap();

        let result = h.controller.start(ChannelId::new(9)).await;
        assert!(matches!(result, Err(PlaybackError::Connect(_))));
        assert_eq!(h.controller.state().await, PlaybackState::Stopped);
        assert!(h.notices.all().is_empty());
    }

    #[tokio::test]
    async fn test_leave_disconnects_once() {
        let h = harness();
        h.controller.enqueue(tracks(&["a"])).await.unwrap();
        h.controller.start(ChannelId::new(9)).await.unwrap();

        assert!(h.controller.leave().await);
        assert!(!h.controller.leave().await);
        assert_eq!(h.transport.disconnect_count(), 1);
        assert_eq!(h.controller.state().await, PlaybackState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_link_tears_down_after_grace() {
        let h = harness();
        h.controller.enqueue(tracks(&["a"])).await.unwrap();
        h.controller.start(ChannelId::new(9)).await.unwrap();

        h.transport.connection().lost().await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(h.controller.state().await, PlaybackState::Stopped);
        assert!(h.notices.all().contains(&Notice::ConnectionLost));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restored_link_keeps_session() {
        let h = harness();
        h.controller.enqueue(tracks(&["a"])).await.unwrap();
        h.controller.start(ChannelId::new(9)).await.unwrap();

        h.transport.connection().lost().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.transport.connection().restored().await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(h.controller.state().await, PlaybackState::Playing);
        assert!(!h.notices.all().contains(&Notice::ConnectionLost));
    }
}
