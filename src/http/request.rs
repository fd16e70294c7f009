//! # Parsing Incremental de Requests HTTP/1.1
//! src/http/request.rs
//!
//! Dos máquinas de estado que cooperan sobre el buffer de lectura de la
//! conexión:
//!
//! 1. **Separador de líneas** (`parse_line`): busca `\r\n` desde el último
//!    índice revisado. Nunca bloquea; solo mira lo que ya está en el buffer.
//! 2. **Máquina del request** (`RequestParser`): consume una línea completa
//!    a la vez en los estados `RequestLine` → `Headers` → `Body`.
//!
//! El request puede llegar partido en cualquier byte: cada llamada a
//! `RequestParser::parse` retoma exactamente donde quedó la anterior.
//!
//! ## Formato aceptado
//!
//! ```text
//! POST /2CGISQL.cgi HTTP/1.1\r\n
//! Host: localhost\r\n
//! Content-Length: 19\r\n
//! \r\n
//! user=bob&passwd=pw1
//! ```

/// Documento servido cuando el target es `/`
pub const DEFAULT_DOCUMENT: &str = "/judge.html";

/// Métodos HTTP soportados
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// GET - Obtener un recurso
    #[default]
    GET,

    /// POST - Enviar el formulario de credenciales
    POST,
}

impl Method {
    /// Parsea el método sin distinguir mayúsculas
    fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("GET") {
            Some(Method::GET)
        } else if s.eq_ignore_ascii_case("POST") {
            Some(Method::POST)
        } else {
            None
        }
    }

    /// Convierte el método a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
        }
    }
}

/// Resultado del separador de líneas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    /// Línea completa; el terminador quedó en cero
    Ok,

    /// Faltan bytes
    Open,

    /// `\r` seguido de otra cosa, o `\n` suelto
    Bad,
}

/// Estado de la máquina del request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    RequestLine,
    Headers,
    Body,
}

/// Resultado de una pasada del parser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpCode {
    /// El request todavía no está completo
    NoRequest,

    /// Request completo
    GetRequest,

    /// Error de sintaxis (terminal)
    BadRequest,
}

/// Request parseado
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Request {
    method: Method,
    target: String,
    version: String,
    host: Option<String>,
    content_length: usize,
    keep_alive: bool,
    body: String,
}

impl Request {
    pub fn method(&self) -> Method {
        self.method
    }

    /// Target ya normalizado (sin esquema, `/` reemplazado por el documento por defecto)
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn content_length(&self) -> usize {
        self.content_length
    }

    /// `Connection: keep-alive` presente
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Body tal como llegó (solo el formulario de credenciales lo usa)
    pub fn body(&self) -> &str {
        &self.body
    }
}

/// Busca el siguiente terminador de línea en `buf[*checked_idx..read_idx]`
///
/// Con `Ok`, los dos bytes del terminador se ponen en cero y `checked_idx`
/// queda justo después. Con `Open` por un `\r` final, `checked_idx` queda
/// apuntando a ese `\r` para revisarlo de nuevo cuando llegue el resto.
pub fn parse_line(buf: &mut [u8], checked_idx: &mut usize, read_idx: usize) -> LineStatus {
    while *checked_idx < read_idx {
        let i = *checked_idx;
        match buf[i] {
            b'\r' => {
                if i + 1 == read_idx {
                    return LineStatus::Open;
                }
                if buf[i + 1] == b'\n' {
                    buf[i] = 0;
                    buf[i + 1] = 0;
                    *checked_idx = i + 2;
                    return LineStatus::Ok;
                }
                return LineStatus::Bad;
            }
            b'\n' => {
                if i > 0 && buf[i - 1] == b'\r' {
                    buf[i - 1] = 0;
                    buf[i] = 0;
                    *checked_idx = i + 1;
                    return LineStatus::Ok;
                }
                return LineStatus::Bad;
            }
            _ => *checked_idx += 1,
        }
    }

    LineStatus::Open
}

/// Máquina de estados del request
#[derive(Debug)]
pub struct RequestParser {
    state: CheckState,

    /// Próximo byte a revisar por el separador de líneas
    checked_idx: usize,

    /// Inicio de la línea en curso
    start_line: usize,

    request: Request,
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            state: CheckState::RequestLine,
            checked_idx: 0,
            start_line: 0,
            request: Request::default(),
        }
    }

    /// Vuelve al estado inicial para el siguiente request de la conexión
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn state(&self) -> CheckState {
        self.state
    }

    pub fn checked_idx(&self) -> usize {
        self.checked_idx
    }

    /// Request parseado hasta ahora (completo solo tras `GetRequest`)
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Avanza sobre `buf[..read_idx]`
    ///
    /// Retorna `NoRequest` mientras falten bytes. `GetRequest` y
    /// `BadRequest` son terminales hasta el próximo `reset()`.
    pub fn parse(&mut self, buf: &mut [u8], read_idx: usize) -> HttpCode {
        loop {
            if self.state == CheckState::Body {
                return self.parse_body(buf, read_idx);
            }

            match parse_line(buf, &mut self.checked_idx, read_idx) {
                LineStatus::Open => return HttpCode::NoRequest,
                LineStatus::Bad => return HttpCode::BadRequest,
                LineStatus::Ok => {}
            }

            let line = &buf[self.start_line..self.checked_idx - 2];
            self.start_line = self.checked_idx;

            let Ok(text) = std::str::from_utf8(line) else {
                return HttpCode::BadRequest;
            };

            let code = match self.state {
                CheckState::RequestLine => self.parse_request_line(text),
                _ => self.parse_header(text),
            };

            if code != HttpCode::NoRequest {
                return code;
            }
        }
    }

    /// `METHOD SP TARGET SP VERSION`
    fn parse_request_line(&mut self, text: &str) -> HttpCode {
        let parts: Vec<&str> = text.split_ascii_whitespace().collect();
        if parts.len() != 3 {
            return HttpCode::BadRequest;
        }

        let Some(method) = Method::parse(parts[0]) else {
            return HttpCode::BadRequest;
        };

        if !parts[2].eq_ignore_ascii_case("HTTP/1.1") {
            return HttpCode::BadRequest;
        }

        let Some(target) = strip_scheme(parts[1]) else {
            return HttpCode::BadRequest;
        };

        if !target.starts_with('/') {
            return HttpCode::BadRequest;
        }

        self.request.method = method;
        self.request.version = parts[2].to_string();
        self.request.target = if target == "/" {
            DEFAULT_DOCUMENT.to_string()
        } else {
            target.to_string()
        };

        tracing::debug!(method = method.as_str(), target = %self.request.target, "request line");

        self.state = CheckState::Headers;
        HttpCode::NoRequest
    }

    /// Una línea de header; la línea vacía cierra el bloque
    fn parse_header(&mut self, text: &str) -> HttpCode {
        if text.is_empty() {
            if self.request.content_length > 0 {
                self.state = CheckState::Body;
                return HttpCode::NoRequest;
            }
            return HttpCode::GetRequest;
        }

        let Some((name, value)) = text.split_once(':') else {
            tracing::debug!(line = text, "ignoring malformed header");
            return HttpCode::NoRequest;
        };

        let name = name.trim();
        let value = value.trim();

        if name.eq_ignore_ascii_case("Connection") {
            if value.eq_ignore_ascii_case("keep-alive") {
                self.request.keep_alive = true;
            }
        } else if name.eq_ignore_ascii_case("Content-Length") {
            match value.parse::<usize>() {
                Ok(n) => self.request.content_length = n,
                Err(_) => return HttpCode::BadRequest,
            }
        } else if name.eq_ignore_ascii_case("Host") {
            self.request.host = Some(value.to_string());
        } else {
            tracing::trace!(header = name, "unknown header");
        }

        HttpCode::NoRequest
    }

    /// Completo cuando hay `Content-Length` bytes después de los headers
    ///
    /// Un body que no cabe en `buf` nunca se completará: `BadRequest`.
    fn parse_body(&mut self, buf: &[u8], read_idx: usize) -> HttpCode {
        let end = match self.checked_idx.checked_add(self.request.content_length) {
            Some(end) if end <= buf.len() => end,
            _ => {
                tracing::debug!(
                    content_length = self.request.content_length,
                    capacity = buf.len(),
                    "body does not fit in read buffer"
                );
                return HttpCode::BadRequest;
            }
        };
        if read_idx < end {
            return HttpCode::NoRequest;
        }

        match std::str::from_utf8(&buf[self.checked_idx..end]) {
            Ok(body) => {
                self.request.body = body.to_string();
                HttpCode::GetRequest
            }
            Err(_) => HttpCode::BadRequest,
        }
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Quita `http://host` o `https://host`, dejando el path
///
/// Retorna None si después del host no hay `/`.
fn strip_scheme(target: &str) -> Option<&str> {
    for scheme in ["http://", "https://"] {
        if target.len() >= scheme.len() && target[..scheme.len()].eq_ignore_ascii_case(scheme) {
            let rest = &target[scheme.len()..];
            return rest.find('/').map(|i| &rest[i..]);
        }
    }
    Some(target)
}
