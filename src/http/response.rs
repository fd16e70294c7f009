//! # Composición de Respuestas HTTP
//! src/http/response.rs
//!
//! Buffer de escritura de capacidad fija. Cada `add_*` verifica que quede
//! espacio antes de copiar; si no alcanza, retorna `BufferFull` y el buffer
//! no se modifica.
//!
//! ## Formato
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Length: 1024\r\n
//! Connection: keep-alive\r\n
//! \r\n
//! ```
//!
//! Para un archivo, el body no se copia aquí: viaja como segunda parte del
//! envío vectorizado, directamente desde el mapeo en memoria.

use super::StatusCode;
use std::fmt::{self, Write as _};

/// Cuerpo para un archivo existente pero vacío
pub const EMPTY_PAGE: &str = "<html><body></body></html>";

/// El buffer no tiene espacio para lo que se quiso agregar
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("response buffer full")]
pub struct BufferFull;

/// Buffer de escritura de la conexión
#[derive(Debug)]
pub struct ResponseBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl ResponseBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    fn append(&mut self, bytes: &[u8]) -> Result<(), BufferFull> {
        if self.buf.len() + bytes.len() > self.capacity {
            return Err(BufferFull);
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn append_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<(), BufferFull> {
        let mut line = String::new();
        line.write_fmt(args).map_err(|_| BufferFull)?;
        self.append(line.as_bytes())
    }

    /// `HTTP/1.1 <code> <reason>`
    pub fn add_status_line(&mut self, status: StatusCode) -> Result<(), BufferFull> {
        self.append_fmt(format_args!(
            "HTTP/1.1 {} {}\r\n",
            status.as_u16(),
            status.reason_phrase()
        ))
    }

    /// `Content-Length`, `Connection` y la línea en blanco
    pub fn add_headers(&mut self, content_length: usize, keep_alive: bool) -> Result<(), BufferFull> {
        self.append_fmt(format_args!("Content-Length: {}\r\n", content_length))?;
        self.append_fmt(format_args!(
            "Connection: {}\r\n",
            if keep_alive { "keep-alive" } else { "close" }
        ))?;
        self.append(b"\r\n")
    }

    /// Contenido literal (páginas de error)
    pub fn add_content(&mut self, content: &str) -> Result<(), BufferFull> {
        self.append(content.as_bytes())
    }

    /// Respuesta completa: status line, headers y, si hay, body literal
    ///
    /// `content_length` se pasa aparte para que un archivo mapeado pueda
    /// anunciar su tamaño sin copiarse al buffer. Si algo no cabe, el
    /// buffer queda vacío.
    pub fn compose(
        &mut self,
        status: StatusCode,
        content_length: usize,
        keep_alive: bool,
        body: Option<&str>,
    ) -> Result<(), BufferFull> {
        self.clear();

        let result = self.write_response(status, content_length, keep_alive, body);
        if result.is_err() {
            self.clear();
        }
        result
    }

    fn write_response(
        &mut self,
        status: StatusCode,
        content_length: usize,
        keep_alive: bool,
        body: Option<&str>,
    ) -> Result<(), BufferFull> {
        self.add_status_line(status)?;
        self.add_headers(content_length, keep_alive)?;
        if let Some(body) = body {
            self.add_content(body)?;
        }
        Ok(())
    }
}
