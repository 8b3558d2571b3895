use futures::future::BoxFuture;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Identifica un armado concreto del temporizador
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTicket(u64);

struct ArmedTimer {
    ticket: TimerTicket,
    cancel: CancellationToken,
}

/// Acción diferida única por sesión que desconecta tras inactividad.
///
/// Armar siempre cancela el armado anterior. La tarea disparada debe
/// reclamar su ticket con [`AutoLeaveTimer::claim`] antes de actuar: si
/// entretanto se canceló o se volvió a armar, el reclamo falla.
pub struct AutoLeaveTimer {
    delay: Duration,
    next_ticket: u64,
    armed: Option<ArmedTimer>,
}

impl AutoLeaveTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            next_ticket: 0,
            armed: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Programa `on_fire` tras el retardo configurado. Requiere un runtime tokio.
    pub fn arm<F>(&mut self, on_fire: F) -> TimerTicket
    where
        F: FnOnce(TimerTicket) -> BoxFuture<'static, ()>,
    {
        self.cancel();

        self.next_ticket += 1;
        let ticket = TimerTicket(self.next_ticket);
        let cancel = CancellationToken::new();
        let cancelled = cancel.clone();
        let delay = self.delay;
        let fire = on_fire(ticket);

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {
                    debug!("⏱️ Auto-leave {:?} cancelado", ticket);
                }
                _ = tokio::time::sleep(delay) => {
                    fire.await;
                }
            }
        });

        debug!("⏱️ Auto-leave armado ({:?}) en {:?}", ticket, delay);
        self.armed = Some(ArmedTimer { ticket, cancel });
        ticket
    }

    /// Cancela el armado pendiente. Devuelve `true` si había uno.
    pub fn cancel(&mut self) -> bool {
        match self.armed.take() {
            Some(armed) => {
                armed.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Consume el armado si `ticket` sigue siendo el vigente
    pub fn claim(&mut self, ticket: TimerTicket) -> bool {
        match &self.armed {
            Some(armed) if armed.ticket == ticket => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }
}

impl Drop for AutoLeaveTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
