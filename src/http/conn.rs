//! # Estado por Conexión
//! src/http/conn.rs
//!
//! Una `Connection` por socket aceptado. Junta el buffer de lectura, el
//! parser, el buffer de escritura y el archivo mapeado de la respuesta en
//! curso.
//!
//! ## Ciclo
//!
//! ```text
//! read_once ──► process ──► Incomplete ──► (rearmar lectura)
//!                   │
//!                   └─────► Respond ──► write ──► Pending   (rearmar escritura)
//!                                           ├──► KeepAlive (reset, rearmar lectura)
//!                                           └──► Close
//! ```
//!
//! Solo un thread a la vez toca una conexión: el registro one-shot en epoll
//! garantiza que nadie más recibe eventos de este socket hasta rearmarlo.

use super::mmap::MappedFile;
use super::request::{CheckState, HttpCode, RequestParser};
use super::resource::{Outcome, Resolver};
use super::response::{ResponseBuffer, EMPTY_PAGE};
use super::StatusCode;
use crate::config::TriggerMode;
use crate::resource::Session;
use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};

/// Resultado de procesar lo que hay en el buffer de lectura
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Faltan bytes: volver a esperar lectura
    Incomplete,

    /// Respuesta compuesta: esperar escritura
    Respond,

    /// No se pudo componer la respuesta: cerrar
    Close,
}

/// Resultado de un intento de escritura
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// El socket se llenó: esperar escritura de nuevo
    Pending,

    /// Respuesta enviada, conexión reiniciada para el siguiente request
    KeepAlive,

    /// Respuesta enviada (o error de escritura): cerrar
    Close,
}

/// Estado de una conexión
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    trigger: TriggerMode,

    /// Buffer de lectura de capacidad fija; `read_idx` = bytes llenos
    read_buf: Vec<u8>,
    read_idx: usize,

    parser: RequestParser,

    /// Headers (o página de error completa)
    response: ResponseBuffer,

    /// Segunda parte del envío, si la respuesta es un archivo
    file: Option<MappedFile>,

    bytes_to_send: usize,
    bytes_have_send: usize,

    /// La respuesta en curso mantiene la conexión abierta
    linger: bool,

    status: Option<StatusCode>,

    /// Bytes enviados aún no reportados a las métricas
    unreported_sent: usize,
}

impl Connection {
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        trigger: TriggerMode,
        read_capacity: usize,
        write_capacity: usize,
    ) -> Self {
        Self {
            stream,
            peer,
            trigger,
            read_buf: vec![0; read_capacity],
            read_idx: 0,
            parser: RequestParser::new(),
            response: ResponseBuffer::new(write_capacity),
            file: None,
            bytes_to_send: 0,
            bytes_have_send: 0,
            linger: false,
            status: None,
            unreported_sent: 0,
        }
    }

    pub fn fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn read_idx(&self) -> usize {
        self.read_idx
    }

    /// Código de la respuesta en curso, si hay
    pub fn response_status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn keep_alive(&self) -> bool {
        self.linger
    }

    /// Bytes enviados desde la última llamada
    pub fn take_sent(&mut self) -> usize {
        std::mem::take(&mut self.unreported_sent)
    }

    /// Lee del socket al buffer
    ///
    /// Nivel: una sola lectura. Borde: hasta `WouldBlock`. Retorna false si
    /// el peer cerró, hubo error, o el buffer ya estaba lleno.
    pub fn read_once(&mut self) -> bool {
        if self.read_idx >= self.read_buf.len() {
            return false;
        }

        loop {
            match (&self.stream).read(&mut self.read_buf[self.read_idx..]) {
                Ok(0) => return false,
                Ok(n) => {
                    self.read_idx += n;
                    if !self.trigger.is_edge() || self.read_idx >= self.read_buf.len() {
                        return true;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return true,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!(peer = %self.peer, error = %e, "read failed");
                    return false;
                }
            }
        }
    }

    /// Parsea lo leído y, si el request está completo (o es inválido),
    /// compone la respuesta
    pub fn process(&mut self, resolver: &Resolver, session: Option<&Session>) -> ProcessStatus {
        let code = self.parser.parse(&mut self.read_buf, self.read_idx);

        let outcome = match code {
            HttpCode::NoRequest => {
                if self.request_cannot_fit() {
                    tracing::debug!(peer = %self.peer, "request exceeds read buffer");
                    Outcome::BadRequest
                } else {
                    return ProcessStatus::Incomplete;
                }
            }
            HttpCode::BadRequest => Outcome::BadRequest,
            HttpCode::GetRequest => resolver.resolve(self.parser.request(), session),
        };

        match self.compose(outcome) {
            Ok(()) => ProcessStatus::Respond,
            Err(_) => {
                tracing::warn!(peer = %self.peer, "response does not fit in write buffer");
                ProcessStatus::Close
            }
        }
    }

    /// El buffer está lleno, o el body anunciado no cabe en lo que queda
    fn request_cannot_fit(&self) -> bool {
        let capacity = self.read_buf.len();
        if self.read_idx >= capacity {
            return true;
        }

        self.parser.state() == CheckState::Body
            && self
                .parser
                .checked_idx()
                .checked_add(self.parser.request().content_length())
                .map_or(true, |end| end > capacity)
    }

    fn compose(&mut self, outcome: Outcome) -> Result<(), super::response::BufferFull> {
        let status = outcome.status();

        // 400 y 500 siempre cierran
        self.linger = self.parser.request().keep_alive()
            && !matches!(status, StatusCode::BadRequest | StatusCode::InternalError);
        self.status = Some(status);

        match outcome {
            Outcome::File(file) if !file.is_empty() => {
                self.response.compose(status, file.len(), self.linger, None)?;
                self.bytes_to_send = self.response.len() + file.len();
                self.file = Some(file);
            }
            Outcome::File(_) => {
                self.response
                    .compose(status, EMPTY_PAGE.len(), self.linger, Some(EMPTY_PAGE))?;
                self.bytes_to_send = self.response.len();
            }
            _ => {
                let body = status.error_body().unwrap_or("");
                self.response.compose(status, body.len(), self.linger, Some(body))?;
                self.bytes_to_send = self.response.len();
            }
        }

        self.bytes_have_send = 0;
        Ok(())
    }

    /// Envía lo pendiente con un envío vectorizado (headers + archivo)
    pub fn write(&mut self) -> WriteStatus {
        if self.bytes_to_send == 0 {
            self.reset();
            return WriteStatus::KeepAlive;
        }

        loop {
            let head = self.response.as_bytes();
            let body = self.file.as_ref().map(|f| f.as_slice()).unwrap_or(&[]);
            let sent = self.bytes_have_send;

            let (first, second) = if sent < head.len() {
                (&head[sent..], body)
            } else {
                (&head[head.len()..], &body[sent - head.len()..])
            };

            match send_vectored(self.stream.as_raw_fd(), first, second) {
                Ok(n) => {
                    self.bytes_have_send += n;
                    self.unreported_sent += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return WriteStatus::Pending,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!(peer = %self.peer, error = %e, "write failed");
                    self.file = None;
                    return WriteStatus::Close;
                }
            }

            if self.bytes_have_send >= self.bytes_to_send {
                self.file = None;

                if self.linger {
                    self.reset();
                    return WriteStatus::KeepAlive;
                }
                return WriteStatus::Close;
            }
        }
    }

    /// Deja la conexión lista para el siguiente request
    ///
    /// Libera el mapeo de la respuesta anterior, si quedaba alguno.
    pub fn reset(&mut self) {
        self.read_buf[..self.read_idx].fill(0);
        self.read_idx = 0;
        self.parser.reset();
        self.response.clear();
        self.file = None;
        self.bytes_to_send = 0;
        self.bytes_have_send = 0;
        self.linger = false;
        self.status = None;
    }
}

/// `sendmsg` con `MSG_NOSIGNAL`: un peer desaparecido da `EPIPE`, no `SIGPIPE`
fn send_vectored(fd: RawFd, first: &[u8], second: &[u8]) -> io::Result<usize> {
    let mut iov = [
        libc::iovec {
            iov_base: first.as_ptr() as *mut libc::c_void,
            iov_len: first.len(),
        },
        libc::iovec {
            iov_base: second.as_ptr() as *mut libc::c_void,
            iov_len: second.len(),
        },
    ];
    let count = if second.is_empty() { 1 } else { 2 };

    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_iov = iov.as_mut_ptr();
    msg.msg_iovlen = count as _;

    let n = unsafe { libc::sendmsg(fd, &msg, libc::MSG_NOSIGNAL | libc::MSG_DONTWAIT) };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use std::net::TcpListener;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use std::thread;
    use std::time::Duration;

    struct DocRoot(PathBuf);

    impl DocRoot {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir()
                .join(format!("tinyweb_conn_{}_{}", name, std::process::id()));
            let _ = fs::remove_dir_all(&dir);
            fs::create_dir_all(&dir).unwrap();

            let page = dir.join("judge.html");
            fs::write(&page, "<html>judge</html>").unwrap();
            fs::set_permissions(&page, fs::Permissions::from_mode(0o644)).unwrap();

            let big = dir.join("big.bin");
            fs::write(&big, vec![b'z'; 300_000]).unwrap();
            fs::set_permissions(&big, fs::Permissions::from_mode(0o644)).unwrap();

            DocRoot(dir)
        }
    }

    impl Drop for DocRoot {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    /// (cliente, conexión del lado servidor)
    fn pair(trigger: TriggerMode, read_capacity: usize) -> (TcpStream, Connection) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, peer) = listener.accept().unwrap();
        stream.set_nonblocking(true).unwrap();

        (client, Connection::new(stream, peer, trigger, read_capacity, 1024))
    }

    fn read_until_closed(client: &mut TcpStream) -> Vec<u8> {
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).unwrap();
        out
    }

    fn send(client: &mut TcpStream, bytes: &[u8]) {
        client.write_all(bytes).unwrap();
        thread::sleep(Duration::from_millis(20));
    }

    #[test]
    fn test_serves_file_and_closes() {
        let root = DocRoot::new("serve");
        let resolver = Resolver::new(&root.0);
        let (mut client, mut conn) = pair(TriggerMode::Level, 2048);

        send(&mut client, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        assert!(conn.read_once());
        assert_eq!(conn.process(&resolver, None), ProcessStatus::Respond);
        assert_eq!(conn.response_status(), Some(StatusCode::Ok));
        assert_eq!(conn.write(), WriteStatus::Close);
        drop(conn);

        let response = String::from_utf8(read_until_closed(&mut client)).unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Content-Length: 18\r\n"));
        assert!(response.contains("Connection: close\r\n"));
        assert!(response.ends_with("\r\n\r\n<html>judge</html>"));
    }

    #[test]
    fn test_incomplete_then_complete() {
        let root = DocRoot::new("partial");
        let resolver = Resolver::new(&root.0);
        let (mut client, mut conn) = pair(TriggerMode::Edge, 2048);

        send(&mut client, b"GET /judge.html HT");
        assert!(conn.read_once());
        assert_eq!(conn.process(&resolver, None), ProcessStatus::Incomplete);

        send(&mut client, b"TP/1.1\r\n\r\n");
        assert!(conn.read_once());
        assert_eq!(conn.process(&resolver, None), ProcessStatus::Respond);
    }

    #[test]
    fn test_keep_alive_resets_state() {
        let root = DocRoot::new("keepalive");
        let resolver = Resolver::new(&root.0);
        let (mut client, mut conn) = pair(TriggerMode::Level, 2048);

        send(&mut client, b"GET /nope HTTP/1.1\r\nConnection: keep-alive\r\n\r\n");
        assert!(conn.read_once());
        assert_eq!(conn.process(&resolver, None), ProcessStatus::Respond);
        assert_eq!(conn.response_status(), Some(StatusCode::NotFound));
        assert!(conn.keep_alive());

        assert_eq!(conn.write(), WriteStatus::KeepAlive);
        assert_eq!(conn.read_idx(), 0);
        assert_eq!(conn.response_status(), None);
        assert!(conn.take_sent() > 0);
        assert_eq!(conn.take_sent(), 0);
    }

    #[test]
    fn test_bad_request_never_lingers() {
        let root = DocRoot::new("bad");
        let resolver = Resolver::new(&root.0);
        let (mut client, mut conn) = pair(TriggerMode::Level, 2048);

        send(&mut client, b"DELETE / HTTP/1.1\r\nConnection: keep-alive\r\n\r\n");
        assert!(conn.read_once());
        assert_eq!(conn.process(&resolver, None), ProcessStatus::Respond);
        assert_eq!(conn.response_status(), Some(StatusCode::BadRequest));
        assert!(!conn.keep_alive());
        assert_eq!(conn.write(), WriteStatus::Close);
    }

    #[test]
    fn test_oversize_request_is_bad_request() {
        let root = DocRoot::new("oversize");
        let resolver = Resolver::new(&root.0);
        let (mut client, mut conn) = pair(TriggerMode::Edge, 128);

        let mut raw = b"GET /".to_vec();
        raw.extend(std::iter::repeat(b'a').take(400));
        send(&mut client, &raw);

        assert!(conn.read_once());
        assert_eq!(conn.read_idx(), 128);
        assert_eq!(conn.process(&resolver, None), ProcessStatus::Respond);
        assert_eq!(conn.response_status(), Some(StatusCode::BadRequest));
    }

    #[test]
    fn test_body_larger_than_buffer_is_bad_request() {
        let root = DocRoot::new("bigbody");
        let resolver = Resolver::new(&root.0);
        let (mut client, mut conn) = pair(TriggerMode::Level, 256);

        send(&mut client, b"POST /2 HTTP/1.1\r\nContent-Length: 5000\r\n\r\nuser=");
        assert!(conn.read_once());
        assert_eq!(conn.process(&resolver, None), ProcessStatus::Respond);
        assert_eq!(conn.response_status(), Some(StatusCode::BadRequest));
    }

    #[test]
    fn test_max_content_length_is_bad_request() {
        let root = DocRoot::new("maxbody");
        let resolver = Resolver::new(&root.0);
        let (mut client, mut conn) = pair(TriggerMode::Level, 2048);

        let raw = format!("POST /2 HTTP/1.1\r\nContent-Length: {}\r\n\r\nx", usize::MAX);
        send(&mut client, raw.as_bytes());
        assert!(conn.read_once());
        assert_eq!(conn.process(&resolver, None), ProcessStatus::Respond);
        assert_eq!(conn.response_status(), Some(StatusCode::BadRequest));
        assert_eq!(conn.write(), WriteStatus::Close);
    }

    #[test]
    fn test_peer_close_reads_false() {
        let (client, mut conn) = pair(TriggerMode::Level, 2048);
        drop(client);
        thread::sleep(Duration::from_millis(20));
        assert!(!conn.read_once());
    }

    #[test]
    fn test_large_file_is_sent_across_partial_writes() {
        let root = DocRoot::new("large");
        let resolver = Resolver::new(&root.0);
        let (mut client, mut conn) = pair(TriggerMode::Level, 2048);

        send(&mut client, b"GET /big.bin HTTP/1.1\r\n\r\n");
        assert!(conn.read_once());
        assert_eq!(conn.process(&resolver, None), ProcessStatus::Respond);

        let reader = thread::spawn(move || read_until_closed(&mut client));

        loop {
            match conn.write() {
                WriteStatus::Pending => thread::sleep(Duration::from_millis(1)),
                WriteStatus::Close => break,
                WriteStatus::KeepAlive => panic!("response did not ask for keep-alive"),
            }
        }
        drop(conn);

        let response = reader.join().unwrap();
        let split = response.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        assert_eq!(response.len() - split, 300_000);
        assert!(response[split..].iter().all(|&b| b == b'z'));
    }
}
