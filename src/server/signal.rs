//! # Señales y Canal de Avisos
//! src/server/signal.rs
//!
//! Las señales no se atienden dentro del handler: el handler solo escribe
//! un byte (el número de señal) en un par de sockets Unix registrado en el
//! reactor. El trabajo real ocurre en el thread del reactor cuando ese
//! socket se vuelve legible.
//!
//! | Byte | Origen | Efecto |
//! |---|---|---|
//! | `SIGALRM` (14) | alarma / `ServerHandle::tick` | barrer timers |
//! | `SIGTERM` (15), `SIGINT` (2) | señal / `ServerHandle::shutdown` | detener el loop |
//! | `b'c'` | worker | hay cierres pendientes en el canal |

use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Barrer timers
pub const TICK: u8 = libc::SIGALRM as u8;

/// Detener el reactor
pub const STOP: u8 = libc::SIGTERM as u8;

/// Ctrl-C
pub const INTERRUPT: u8 = libc::SIGINT as u8;

/// Un worker cerró una conexión
pub const CLOSED: u8 = b'c';

/// Extremo de escritura visible para el handler de señales (-1 = ninguno)
static WAKE_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn forward_signal(sig: libc::c_int) {
    // Solo llamadas async-signal-safe; errno se preserva
    unsafe {
        let errno = libc::__errno_location();
        let saved = *errno;

        let fd = WAKE_FD.load(Ordering::Relaxed);
        if fd >= 0 {
            let byte = sig as u8;
            libc::send(
                fd,
                &byte as *const u8 as *const libc::c_void,
                1,
                libc::MSG_DONTWAIT | libc::MSG_NOSIGNAL,
            );
        }

        *errno = saved;
    }
}

fn set_handler(sig: libc::c_int, handler: libc::sighandler_t) -> io::Result<()> {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler;
        action.sa_flags = libc::SA_RESTART;
        libc::sigfillset(&mut action.sa_mask);

        if libc::sigaction(sig, &action, std::ptr::null_mut()) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Reenvía `SIGALRM`, `SIGTERM` y `SIGINT` como bytes a `wake_fd`
pub fn install(wake_fd: RawFd) -> io::Result<()> {
    WAKE_FD.store(wake_fd, Ordering::Relaxed);

    let handler = forward_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    for sig in [libc::SIGALRM, libc::SIGTERM, libc::SIGINT] {
        set_handler(sig, handler)?;
    }
    Ok(())
}

/// Restaura los handlers por defecto y cancela la alarma
pub fn uninstall() {
    cancel_alarm();
    WAKE_FD.store(-1, Ordering::Relaxed);
    for sig in [libc::SIGALRM, libc::SIGTERM, libc::SIGINT] {
        let _ = set_handler(sig, libc::SIG_DFL);
    }
}

/// Un peer desaparecido no debe matar el proceso
pub fn ignore_sigpipe() -> io::Result<()> {
    set_handler(libc::SIGPIPE, libc::SIG_IGN)
}

/// Programa el próximo `SIGALRM`
pub fn schedule_alarm(secs: u64) {
    unsafe {
        libc::alarm(secs.min(u32::MAX as u64) as libc::c_uint);
    }
}

pub fn cancel_alarm() {
    unsafe {
        libc::alarm(0);
    }
}

/// Avisos acumulados desde la última lectura
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Wakeups {
    pub tick: bool,
    pub stop: bool,
    pub closed: bool,
}

/// Par de sockets: el reactor lee de uno, todos los demás escriben en el otro
pub struct WakeChannel {
    reader: UnixStream,
    writer: Arc<UnixStream>,
}

impl WakeChannel {
    pub fn new() -> io::Result<Self> {
        let (reader, writer) = UnixStream::pair()?;
        reader.set_nonblocking(true)?;
        writer.set_nonblocking(true)?;

        Ok(Self {
            reader,
            writer: Arc::new(writer),
        })
    }

    pub fn reader_fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }

    pub fn writer_fd(&self) -> RawFd {
        self.writer.as_raw_fd()
    }

    pub fn notifier(&self) -> Notifier {
        Notifier {
            writer: Arc::clone(&self.writer),
        }
    }

    /// Lee todos los bytes pendientes
    pub fn drain(&self) -> Wakeups {
        let mut wakeups = Wakeups::default();
        let mut buf = [0u8; 256];

        loop {
            match (&self.reader).read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    for &byte in &buf[..n] {
                        match byte {
                            TICK => wakeups.tick = true,
                            STOP | INTERRUPT => wakeups.stop = true,
                            CLOSED => wakeups.closed = true,
                            other => tracing::debug!(byte = other, "unknown wake byte"),
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }

        wakeups
    }
}

/// Extremo de escritura compartible entre threads
#[derive(Clone)]
pub struct Notifier {
    writer: Arc<UnixStream>,
}

impl Notifier {
    /// Si el socket está lleno ya hay un aviso pendiente: se ignora
    fn send(&self, byte: u8) {
        let _ = (&*self.writer).write(&[byte]);
    }

    pub fn tick(&self) {
        self.send(TICK);
    }

    pub fn stop(&self) {
        self.send(STOP);
    }

    pub fn closed(&self) {
        self.send(CLOSED);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_collects_wakeups() {
        let channel = WakeChannel::new().unwrap();
        let notifier = channel.notifier();

        assert_eq!(channel.drain(), Wakeups::default());

        notifier.tick();
        notifier.closed();
        notifier.tick();
        let wakeups = channel.drain();
        assert!(wakeups.tick);
        assert!(wakeups.closed);
        assert!(!wakeups.stop);

        notifier.stop();
        assert!(channel.drain().stop);
        assert_eq!(channel.drain(), Wakeups::default());
    }

    #[test]
    fn test_interrupt_means_stop() {
        let channel = WakeChannel::new().unwrap();
        let _ = (&*channel.writer).write(&[INTERRUPT]);
        assert!(channel.drain().stop);
    }

    #[test]
    fn test_signal_bytes() {
        assert_eq!(TICK, 14);
        assert_eq!(STOP, 15);
        assert_eq!(INTERRUPT, 2);
    }
}
