//! # Reactor
//! src/server/reactor.rs
//!
//! `Server` es la raíz de composición: construye el socket que escucha,
//! epoll, el canal de avisos, el almacén de credenciales, el pool de
//! sesiones, las métricas y el pool de workers, y los reparte. No hay
//! estado global salvo el fd que usa el handler de señales.
//!
//! ## Loop
//!
//! ```text
//! epoll_wait ──► socket que escucha ──► accept + Connection + timer + registro one-shot
//!            ├─► canal de avisos    ──► tick (barrer timers) / stop / cierres de workers
//!            ├─► RDHUP | HUP | ERR  ──► cerrar
//!            ├─► EPOLLIN            ──► leer en el reactor, pasar al pool
//!            └─► EPOLLOUT           ──► escribir en el reactor
//! ```
//!
//! ## Dueño de cada conexión
//!
//! El thread que recibe el evento one-shot es dueño de la conexión hasta que
//! la rearma: el reactor para leer y escribir, un worker para parsear y
//! componer la respuesta. Los timers y el registro son exclusivos del
//! reactor; un worker que cierra una conexión se lo avisa por un canal.

use crate::config::Config;
use crate::error::{Rejected, ServerError};
use crate::http::{Connection, ProcessStatus, Resolver, WriteStatus};
use crate::metrics::ServerStats;
use crate::pool::WorkerPool;
use crate::resource::{CredentialStore, ResourcePool, Session};
use crate::server::poller::{Event, Events, Interest, Poller, Registration};
use crate::server::registry::{ConnectionCell, Registry};
use crate::server::signal::{self, Notifier, WakeChannel};
use crate::timer::{EvictFn, TimerList};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Token del socket que escucha
const LISTENER: u64 = u64::MAX;

/// Token del canal de avisos
const WAKE: u64 = u64::MAX - 1;

/// Eventos por llamada a `epoll_wait`
const MAX_EVENTS: usize = 1024;

/// Espera máxima mientras hay conexiones esperando lugar en la cola
const RETRY_INTERVAL_MS: i32 = 10;

/// Mensaje para conexiones por encima del máximo
const BUSY_MESSAGE: &[u8] = b"Internal server busy";

/// Control del servidor desde otro thread
#[derive(Clone)]
pub struct ServerHandle {
    notifier: Notifier,
}

impl ServerHandle {
    /// Pide un barrido de timers (lo mismo que hace `SIGALRM`)
    pub fn tick(&self) {
        self.notifier.tick();
    }

    /// Pide detener el loop
    pub fn shutdown(&self) {
        self.notifier.stop();
    }
}

/// Procesamiento de una conexión dentro de un worker
struct ConnectionHandler {
    resolver: Arc<Resolver>,
    poller: Arc<Poller>,
    stats: ServerStats,
    closes: Mutex<Sender<RawFd>>,
    notifier: Notifier,
    edge: bool,
}

impl ConnectionHandler {
    fn handle(&self, cell: Arc<ConnectionCell>, session: Option<&Session>) {
        // Un pánico al procesar cierra la conexión en vez de dejarla sin rearmar
        let processed = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut conn = cell.lock();
            if cell.is_closed() {
                return None;
            }

            let status = conn.process(&self.resolver, session);
            if status == ProcessStatus::Respond {
                if let Some(code) = conn.response_status() {
                    self.stats.record_response(code);
                }
            }
            Some(status)
        }));

        let status = match processed {
            Ok(Some(status)) => status,
            Ok(None) => return,
            Err(_) => {
                tracing::error!(fd = cell.fd(), "request processing panicked");
                return self.close(&cell);
            }
        };

        let interest = match status {
            ProcessStatus::Incomplete => Interest::Read,
            ProcessStatus::Respond => Interest::Write,
            ProcessStatus::Close => return self.close(&cell),
        };

        let reg = Registration::oneshot(interest, self.edge);
        if let Err(e) = self.poller.rearm(cell.fd(), cell.fd() as u64, reg) {
            tracing::warn!(fd = cell.fd(), error = %e, "rearm failed");
            self.close(&cell);
        }
    }

    fn close(&self, cell: &ConnectionCell) {
        if cell.close(&self.poller, &self.stats) {
            let sent = self
                .closes
                .lock()
                .map(|tx| tx.send(cell.fd()).is_ok())
                .unwrap_or(false);
            if sent {
                self.notifier.closed();
            }
        }
    }
}

/// Servidor: raíz de composición y loop del reactor
pub struct Server {
    config: Config,
    listener: TcpListener,
    poller: Arc<Poller>,
    wake: WakeChannel,
    closes: Receiver<RawFd>,
    credentials: Arc<CredentialStore>,
    stats: ServerStats,
    pool: WorkerPool<Arc<ConnectionCell>>,
    registry: Registry,
    timers: TimerList,

    /// Conexiones con datos leídos que la cola no aceptó todavía
    deferred: VecDeque<Arc<ConnectionCell>>,

    /// `SIGALRM` reenviado al reactor (solo tras `install_signal_handlers`)
    alarm: bool,
}

impl Server {
    /// Construye todo lo necesario; cualquier fallo aborta el arranque
    pub fn new(config: Config) -> Result<Self, ServerError> {
        config.validate().map_err(ServerError::Config)?;

        let listener = TcpListener::bind(config.address())?;
        listener.set_nonblocking(true)?;

        let poller = Arc::new(Poller::new()?);
        let wake = WakeChannel::new()?;

        poller.register(
            listener.as_raw_fd(),
            LISTENER,
            Registration::read(config.listen_trigger.is_edge()),
        )?;
        poller.register(wake.reader_fd(), WAKE, Registration::read(false))?;

        let credentials = Arc::new(match &config.users_file {
            Some(path) => CredentialStore::open(path)?,
            None => CredentialStore::in_memory(),
        });
        let resources = Arc::new(ResourcePool::new(
            Arc::clone(&credentials),
            config.resource_pool,
            config.acquire_timeout(),
        ));

        let stats = ServerStats::new();
        let (close_tx, close_rx) = mpsc::channel();

        let handler = ConnectionHandler {
            resolver: Arc::new(Resolver::new(&config.doc_root)),
            poller: Arc::clone(&poller),
            stats: stats.clone(),
            closes: Mutex::new(close_tx),
            notifier: wake.notifier(),
            edge: config.conn_trigger.is_edge(),
        };

        let pool = WorkerPool::new(
            config.workers,
            config.max_requests,
            resources,
            move |cell, session| handler.handle(cell, session),
        )?;

        tracing::info!(
            address = %listener.local_addr()?,
            doc_root = %config.doc_root.display(),
            "server ready"
        );

        Ok(Self {
            config,
            listener,
            poller,
            wake,
            closes: close_rx,
            credentials,
            stats,
            pool,
            registry: Registry::new(),
            timers: TimerList::new(),
            deferred: VecDeque::new(),
            alarm: false,
        })
    }

    /// Dirección real (útil con puerto 0)
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            notifier: self.wake.notifier(),
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn stats(&self) -> ServerStats {
        self.stats.clone()
    }

    /// Reenvía `SIGALRM`/`SIGTERM`/`SIGINT` al reactor y activa la alarma
    /// periódica. Afecta a todo el proceso: solo para el binario.
    pub fn install_signal_handlers(&mut self) -> Result<(), ServerError> {
        signal::install(self.wake.writer_fd())?;
        self.alarm = true;
        Ok(())
    }

    /// Loop principal; retorna al recibir stop o ante un fallo de `epoll_wait`
    pub fn run(mut self) -> Result<(), ServerError> {
        if self.alarm {
            signal::schedule_alarm(self.config.timeslot_secs);
        }

        let result = self.event_loop();
        self.teardown();
        result
    }

    fn event_loop(&mut self) -> Result<(), ServerError> {
        let mut events = Events::with_capacity(MAX_EVENTS);

        loop {
            self.retry_deferred();

            let timeout = if self.deferred.is_empty() { -1 } else { RETRY_INTERVAL_MS };
            match self.poller.wait(&mut events, timeout) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::error!(error = %e, "epoll_wait failed");
                    return Err(e.into());
                }
            }

            let mut tick = false;
            let mut stop = false;

            for event in events.iter() {
                match event.token {
                    LISTENER => self.accept(),
                    WAKE => {
                        let wakeups = self.wake.drain();
                        tick |= wakeups.tick;
                        stop |= wakeups.stop;
                    }
                    token => self.dispatch(token as RawFd, event),
                }
            }

            self.drain_closes();

            if tick {
                self.sweep();
            }
            if stop {
                tracing::info!("stop requested");
                return Ok(());
            }
        }
    }

    // ==================== Accept ====================

    fn accept(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    self.admit(stream, peer);
                    if !self.config.listen_trigger.is_edge() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    fn admit(&mut self, stream: TcpStream, peer: SocketAddr) {
        if self.stats.live() >= self.config.max_connections {
            if let Err(e) = (&stream).write(BUSY_MESSAGE) {
                tracing::debug!(%peer, error = %e, "busy notice not delivered");
            }
            self.stats.record_busy();
            tracing::warn!(%peer, "internal server busy");
            return;
        }

        if let Err(e) = stream.set_nonblocking(true) {
            tracing::warn!(%peer, error = %e, "set_nonblocking failed");
            return;
        }

        let fd = stream.as_raw_fd();
        let conn = Connection::new(
            stream,
            peer,
            self.config.conn_trigger,
            self.config.read_buffer,
            self.config.write_buffer,
        );
        let cell = Arc::new(ConnectionCell::new(conn));

        let reg = Registration::oneshot(Interest::Read, self.config.conn_trigger.is_edge());
        if let Err(e) = self.poller.register(fd, fd as u64, reg) {
            // Al soltar `cell` se cierra el socket
            tracing::warn!(%peer, error = %e, "epoll register failed");
            return;
        }

        self.stats.connection_opened();
        let deadline = Instant::now() + self.config.idle_timeout();
        let timer = self.timers.insert(deadline, self.eviction(&cell));
        self.registry.insert(cell, timer);

        tracing::debug!(%peer, fd, "connection accepted");
    }

    /// Callback del timer: cierra la conexión si sigue abierta
    fn eviction(&self, cell: &Arc<ConnectionCell>) -> EvictFn {
        let cell = Arc::clone(cell);
        let poller = Arc::clone(&self.poller);
        let stats = self.stats.clone();

        Box::new(move || {
            if cell.close(&poller, &stats) {
                stats.record_eviction();
                tracing::info!(fd = cell.fd(), "idle connection evicted");
            }
        })
    }

    // ==================== Eventos de conexiones ====================

    fn dispatch(&mut self, fd: RawFd, event: Event) {
        let Some(entry) = self.registry.get(fd) else {
            return;
        };
        let cell = Arc::clone(&entry.cell);
        let timer = entry.timer;

        if cell.is_closed() {
            self.forget(fd);
            return;
        }

        if event.closed {
            self.close(fd);
            return;
        }

        if event.readable {
            if !cell.lock().read_once() {
                self.close(fd);
                return;
            }

            self.timers.reposition(timer, Instant::now() + self.config.idle_timeout());
            self.submit(cell);
        } else if event.writable {
            let (status, sent) = {
                let mut conn = cell.lock();
                let status = conn.write();
                (status, conn.take_sent())
            };
            self.stats.add_bytes_sent(sent);

            let interest = match status {
                WriteStatus::Pending => Interest::Write,
                WriteStatus::KeepAlive => Interest::Read,
                WriteStatus::Close => {
                    self.close(fd);
                    return;
                }
            };

            self.timers.reposition(timer, Instant::now() + self.config.idle_timeout());
            self.rearm(fd, interest);
        }
    }

    fn rearm(&mut self, fd: RawFd, interest: Interest) {
        let reg = Registration::oneshot(interest, self.config.conn_trigger.is_edge());
        if let Err(e) = self.poller.rearm(fd, fd as u64, reg) {
            tracing::warn!(fd, error = %e, "rearm failed");
            self.close(fd);
        }
    }

    /// Pasa la conexión al pool; si la cola está llena queda en espera
    fn submit(&mut self, cell: Arc<ConnectionCell>) {
        if let Err(Rejected(cell)) = self.pool.submit(cell) {
            self.stats.record_rejected();
            tracing::warn!(fd = cell.fd(), "task queue full, deferring connection");
            self.deferred.push_back(cell);
        }
    }

    fn retry_deferred(&mut self) {
        while let Some(cell) = self.deferred.pop_front() {
            if cell.is_closed() {
                continue;
            }
            if let Err(Rejected(cell)) = self.pool.submit(cell) {
                self.deferred.push_front(cell);
                break;
            }
        }
    }

    // ==================== Cierre ====================

    /// Cierre iniciado por el reactor
    fn close(&mut self, fd: RawFd) {
        if let Some(entry) = self.registry.remove(fd) {
            self.timers.remove(entry.timer);
            entry.cell.close(&self.poller, &self.stats);
        }
    }

    /// Olvida una conexión ya cerrada por otro
    fn forget(&mut self, fd: RawFd) {
        if let Some(entry) = self.registry.remove_if_closed(fd) {
            self.timers.remove(entry.timer);
        }
    }

    /// Cierres avisados por los workers
    fn drain_closes(&mut self) {
        while let Ok(fd) = self.closes.try_recv() {
            self.forget(fd);
        }
    }

    /// Barre los timers vencidos y reprograma la alarma
    fn sweep(&mut self) {
        let evicted = self.timers.sweep(Instant::now());

        for fd in self.registry.closed_fds() {
            self.forget(fd);
        }

        if evicted > 0 {
            tracing::debug!(evicted, live = self.registry.len(), "timer sweep");
        }

        if self.alarm {
            signal::schedule_alarm(self.config.timeslot_secs);
        }
    }

    fn teardown(&mut self) {
        if self.alarm {
            signal::uninstall();
        }

        for entry in self.registry.drain() {
            entry.cell.close(&self.poller, &self.stats);
        }
        self.timers = TimerList::new();
        self.deferred.clear();

        self.pool.shutdown();

        tracing::info!(stats = %self.stats.to_json(), "server stopped");
    }
}
