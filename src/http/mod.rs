//! # Módulo HTTP
//! src/http/mod.rs
//!
//! Subconjunto de HTTP/1.1 implementado sobre los buffers de cada conexión,
//! sin librerías de alto nivel:
//!
//! - `request`: separador de líneas + máquina de estados del request
//! - `response`: composición de status line y headers en un buffer fijo
//! - `mmap`: mapeo de solo lectura de los archivos servidos
//! - `resource`: del target al recurso (archivos, atajos, credenciales)
//! - `conn`: estado por conexión (leer, procesar, escribir)
//!
//! ### Formato de Request
//!
//! ```text
//! GET /judge.html HTTP/1.1\r\n
//! Host: localhost\r\n
//! Connection: keep-alive\r\n
//! \r\n
//! ```
//!
//! ### Formato de Response
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Length: 13\r\n
//! Connection: keep-alive\r\n
//! \r\n
//! <html></html>
//! ```

pub mod conn;
pub mod mmap;
pub mod request;
pub mod resource;
pub mod response;
pub mod status;

pub use conn::{Connection, ProcessStatus, WriteStatus};
pub use request::{HttpCode, Method, Request, RequestParser};
pub use resource::{Outcome, Resolver};
pub use response::ResponseBuffer;
pub use status::StatusCode;
