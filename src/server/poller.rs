//! # Poller epoll
//! src/server/poller.rs
//!
//! Envoltura mínima sobre `epoll(7)`. Cada registro lleva un token (`u64`)
//! que vuelve en los eventos.
//!
//! ## One-shot
//!
//! Un registro con `oneshot` entrega a lo sumo un evento y queda deshabilitado
//! hasta `rearm()`. Es lo que garantiza que un solo thread a la vez toque
//! los buffers de una conexión: quien recibe el evento es dueño de la
//! conexión hasta que la rearma.

use std::io;
use std::os::unix::io::RawFd;

/// Interés de un registro
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
}

/// Interés más modo de notificación
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub interest: Interest,
    pub edge: bool,
    pub oneshot: bool,
}

impl Registration {
    /// Lectura, sin one-shot (socket que escucha, canal de avisos)
    pub fn read(edge: bool) -> Self {
        Self {
            interest: Interest::Read,
            edge,
            oneshot: false,
        }
    }

    /// Registro one-shot de una conexión
    pub fn oneshot(interest: Interest, edge: bool) -> Self {
        Self {
            interest,
            edge,
            oneshot: true,
        }
    }

    fn events(&self) -> u32 {
        let mut events = match self.interest {
            Interest::Read => libc::EPOLLIN,
            Interest::Write => libc::EPOLLOUT,
        } | libc::EPOLLRDHUP;

        if self.edge {
            events |= libc::EPOLLET;
        }
        if self.oneshot {
            events |= libc::EPOLLONESHOT;
        }
        events as u32
    }
}

/// Evento entregado por `wait`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub token: u64,
    pub readable: bool,
    pub writable: bool,

    /// El peer cerró o hubo error (`EPOLLRDHUP | EPOLLHUP | EPOLLERR`)
    pub closed: bool,
}

/// Buffer de eventos reutilizable
pub struct Events {
    buf: Vec<libc::epoll_event>,
    len: usize,
}

impl Events {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![libc::epoll_event { events: 0, u64: 0 }; capacity.max(1)],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.buf[..self.len].iter().map(|raw| {
            // Copias por valor: `epoll_event` es packed en x86_64
            let events = raw.events;
            let token = raw.u64;

            Event {
                token,
                readable: events & libc::EPOLLIN as u32 != 0,
                writable: events & libc::EPOLLOUT as u32 != 0,
                closed: events & (libc::EPOLLRDHUP | libc::EPOLLHUP | libc::EPOLLERR) as u32 != 0,
            }
        })
    }
}

/// Instancia de epoll
///
/// `register`, `rearm` y `deregister` pueden llamarse desde cualquier
/// thread; `wait` solo desde el reactor.
#[derive(Debug)]
pub struct Poller {
    epfd: RawFd,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        let epfd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epfd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { epfd })
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, token: u64, reg: Registration) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: reg.events(),
            u64: token,
        };

        let ret = unsafe { libc::epoll_ctl(self.epfd, op, fd, &mut event) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Agrega `fd` al conjunto
    pub fn register(&self, fd: RawFd, token: u64, reg: Registration) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, token, reg)
    }

    /// Rehabilita un registro one-shot (o cambia su interés)
    pub fn rearm(&self, fd: RawFd, token: u64, reg: Registration) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, token, reg)
    }

    /// Quita `fd` del conjunto. `ENOENT` y `EBADF` no son error.
    pub fn deregister(&self, fd: RawFd) -> io::Result<()> {
        let ret =
            unsafe { libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::ENOENT) | Some(libc::EBADF) => {}
                _ => return Err(err),
            }
        }
        Ok(())
    }

    /// Espera eventos; `timeout_ms = -1` bloquea sin límite
    ///
    /// `Interrupted` se devuelve tal cual: el llamador decide si reintenta.
    pub fn wait(&self, events: &mut Events, timeout_ms: i32) -> io::Result<usize> {
        let n = unsafe {
            libc::epoll_wait(
                self.epfd,
                events.buf.as_mut_ptr(),
                events.buf.len() as libc::c_int,
                timeout_ms,
            )
        };

        if n < 0 {
            events.len = 0;
            return Err(io::Error::last_os_error());
        }

        events.len = n as usize;
        Ok(events.len)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epfd);
        }
    }
}
