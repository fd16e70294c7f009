//! # Registro de Conexiones
//! src/server/registry.rs
//!
//! Cada conexión vive en una `ConnectionCell` compartida por `Arc` entre el
//! registro del reactor, su timer y (mientras la procesa) un worker.
//!
//! ## Cierre
//!
//! `close()` es idempotente: solo la primera llamada quita el socket de
//! epoll, hace `shutdown` y descuenta la conexión. El descriptor se cierra
//! de verdad cuando se suelta el último `Arc`, así que un desalojo que
//! compite con un worker nunca libera memoria ni un fd que el worker
//! todavía usa, y el número de fd no se reutiliza mientras alguien lo tenga.

use crate::http::Connection;
use crate::metrics::ServerStats;
use crate::server::poller::Poller;
use crate::timer::TimerHandle;
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Conexión compartida entre threads
#[derive(Debug)]
pub struct ConnectionCell {
    fd: RawFd,
    closed: AtomicBool,
    conn: Mutex<Connection>,
}

impl ConnectionCell {
    pub fn new(conn: Connection) -> Self {
        Self {
            fd: conn.fd(),
            closed: AtomicBool::new(false),
            conn: Mutex::new(conn),
        }
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Cierra la conexión una sola vez
    ///
    /// No toma el lock de la conexión: un worker puede tenerlo.
    pub fn close(&self, poller: &Poller, stats: &ServerStats) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        if let Err(e) = poller.deregister(self.fd) {
            tracing::warn!(fd = self.fd, error = %e, "epoll deregister failed");
        }
        unsafe {
            libc::shutdown(self.fd, libc::SHUT_RDWR);
        }
        stats.connection_closed();

        tracing::debug!(fd = self.fd, "connection closed");
        true
    }
}

/// Entrada del registro: la conexión y su timer
pub struct Entry {
    pub cell: Arc<ConnectionCell>,
    pub timer: TimerHandle,
}

/// Tabla fd → conexión, propiedad exclusiva del reactor
#[derive(Default)]
pub struct Registry {
    entries: HashMap<RawFd, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cell: Arc<ConnectionCell>, timer: TimerHandle) {
        self.entries.insert(cell.fd(), Entry { cell, timer });
    }

    pub fn get(&self, fd: RawFd) -> Option<&Entry> {
        self.entries.get(&fd)
    }

    pub fn remove(&mut self, fd: RawFd) -> Option<Entry> {
        self.entries.remove(&fd)
    }

    /// Quita la entrada solo si su conexión ya está cerrada
    pub fn remove_if_closed(&mut self, fd: RawFd) -> Option<Entry> {
        match self.entries.get(&fd) {
            Some(entry) if entry.cell.is_closed() => self.entries.remove(&fd),
            _ => None,
        }
    }

    /// fds de las conexiones ya cerradas
    pub fn closed_fds(&self) -> Vec<RawFd> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.cell.is_closed())
            .map(|(&fd, _)| fd)
            .collect()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Entry> + '_ {
        self.entries.drain().map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TriggerMode;
    use crate::server::poller::{Interest, Registration};
    use crate::timer::TimerList;
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};
    use std::time::{Duration, Instant};

    fn cell() -> (TcpStream, Arc<ConnectionCell>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, peer) = listener.accept().unwrap();
        stream.set_nonblocking(true).unwrap();

        let conn = Connection::new(stream, peer, TriggerMode::Level, 2048, 1024);
        (client, Arc::new(ConnectionCell::new(conn)))
    }

    #[test]
    fn test_close_is_idempotent() {
        let poller = Poller::new().unwrap();
        let stats = ServerStats::new();
        let (mut client, cell) = cell();

        poller
            .register(cell.fd(), cell.fd() as u64, Registration::oneshot(Interest::Read, false))
            .unwrap();
        stats.connection_opened();

        assert!(cell.close(&poller, &stats));
        assert!(!cell.close(&poller, &stats));
        assert!(cell.is_closed());
        assert_eq!(stats.snapshot().closed, 1);
        assert_eq!(stats.live(), 0);

        // El peer ve EOF aunque el Arc siga vivo
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_close_while_locked_by_worker() {
        let poller = Poller::new().unwrap();
        let stats = ServerStats::new();
        let (_client, cell) = cell();

        let guard = cell.lock();
        assert!(cell.close(&poller, &stats));
        assert_eq!(guard.fd(), cell.fd());
    }

    #[test]
    fn test_registry_tracks_closed_entries() {
        let poller = Poller::new().unwrap();
        let stats = ServerStats::new();
        let mut timers = TimerList::new();
        let mut registry = Registry::new();

        let (_a, open) = cell();
        let (_b, closed) = cell();
        let deadline = Instant::now() + Duration::from_secs(60);

        registry.insert(Arc::clone(&open), timers.insert(deadline, Box::new(|| {})));
        registry.insert(Arc::clone(&closed), timers.insert(deadline, Box::new(|| {})));
        assert_eq!(registry.len(), 2);

        closed.close(&poller, &stats);
        assert_eq!(registry.closed_fds(), vec![closed.fd()]);

        assert!(registry.remove_if_closed(open.fd()).is_none());
        let entry = registry.remove_if_closed(closed.fd()).unwrap();
        assert!(timers.remove(entry.timer));
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.drain().count(), 1);
        assert!(registry.is_empty());
    }
}
