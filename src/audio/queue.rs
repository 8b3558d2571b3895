use rand::seq::SliceRandom;
use std::{collections::VecDeque, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info};

use crate::sources::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Off,
    CurrentTrack,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue limit ({limit}) exceeded")]
    Full { limit: usize },
}

/// Cola de reproducción de un guild: pendientes FIFO, slot actual y modo loop.
///
/// Sin I/O. `pending` nunca contiene a `current`.
#[derive(Debug)]
pub struct PlaybackQueue {
    pending: VecDeque<Arc<Track>>,
    current: Option<Arc<Track>>,
    loop_mode: LoopMode,
    max_len: usize,
}

impl PlaybackQueue {
    pub fn new(max_len: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            current: None,
            loop_mode: LoopMode::Off,
            max_len,
        }
    }

    /// Agrega un track al final de la cola
    pub fn enqueue(&mut self, track: Track) -> Result<(), QueueError> {
        if self.pending.len() >= self.max_len {
            return Err(QueueError::Full { limit: self.max_len });
        }

        info!("➕ Agregado a la cola: {}", track.title());
        self.pending.push_back(Arc::new(track));
        Ok(())
    }

    /// Agrega varios tracks en orden. Todo o nada: si no caben, la cola no cambia.
    pub fn enqueue_many(&mut self, tracks: Vec<Track>) -> Result<usize, QueueError> {
        if self.pending.len() + tracks.len() > self.max_len {
            return Err(QueueError::Full { limit: self.max_len });
        }

        let added = tracks.len();
        self.pending.extend(tracks.into_iter().map(Arc::new));
        info!("➕ Agregadas {} canciones a la cola", added);
        Ok(added)
    }

    /// Avanza al siguiente track.
    ///
    /// En modo loop devuelve el mismo `current`; si no, saca la cabeza de
    /// `pending` (o deja `current` vacío).
    pub fn advance(&mut self) -> Option<Arc<Track>> {
        if self.loop_mode == LoopMode::CurrentTrack {
            if let Some(current) = &self.current {
                debug!("🔂 Repitiendo track: {}", current.title());
                return Some(Arc::clone(current));
            }
        }

        self.current = self.pending.pop_front();
        match &self.current {
            Some(next) => debug!("➡️ Siguiente en cola (FIFO): {}", next.title()),
            None => debug!("📭 Cola vacía, no hay siguiente track"),
        }
        self.current.clone()
    }

    /// Vacía la cola y el slot actual
    pub fn clear(&mut self) {
        let removed = self.pending.len();
        self.pending.clear();
        self.current = None;
        info!("🗑️ Cola limpiada: {} tracks removidos", removed);
    }

    /// Mezcla los pendientes. El track actual no se mueve.
    pub fn shuffle(&mut self) -> usize {
        let mut items: Vec<_> = self.pending.drain(..).collect();
        let mut rng = rand::thread_rng();
        items.shuffle(&mut rng);
        let shuffled = items.len();
        self.pending.extend(items);
        info!("🔀 Cola mezclada: {} tracks", shuffled);
        shuffled
    }

    /// Quita el pendiente en `index` (base 0)
    pub fn remove(&mut self, index: usize) -> Option<Arc<Track>> {
        let removed = self.pending.remove(index)?;
        info!("🗑️ Removido de la cola: {}", removed.title());
        Some(removed)
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.loop_mode = if enabled { LoopMode::CurrentTrack } else { LoopMode::Off };
    }

    pub fn toggle_loop(&mut self) -> bool {
        let enabled = !self.is_looping();
        self.set_loop(enabled);
        enabled
    }

    pub fn is_looping(&self) -> bool {
        self.loop_mode == LoopMode::CurrentTrack
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    /// Tracks pendientes (sin contar el actual)
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn current(&self) -> Option<&Arc<Track>> {
        self.current.as_ref()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Arc<Track>> {
        self.pending.iter()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            current: self.current.clone(),
            pending: self.pending.iter().cloned().collect(),
            loop_mode: self.loop_mode,
            total_duration: self.total_duration(),
        }
    }

    fn total_duration(&self) -> Duration {
        self.current
            .iter()
            .chain(self.pending.iter())
            .filter_map(|track| track.duration())
            .sum()
    }
}

/// Copia inmutable del estado de la cola para mostrarla
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub current: Option<Arc<Track>>,
    pub pending: Vec<Arc<Track>>,
    pub loop_mode: LoopMode,
    pub total_duration: Duration,
}

impl QueueSnapshot {
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.pending.is_empty()
    }
}
