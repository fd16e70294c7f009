//! # Códigos de Estado HTTP
//! src/http/status.rs
//!
//! Los cinco códigos que produce el servidor:
//!
//! - **2xx**: 200 OK
//! - **4xx**: 400, 403, 404
//! - **5xx**: 500

/// Códigos de estado HTTP que soporta el servidor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// 200 OK - Recurso servido
    Ok = 200,

    /// 400 Bad Request - Request mal formado o target inválido
    BadRequest = 400,

    /// 403 Forbidden - Recurso sin permiso de lectura
    Forbidden = 403,

    /// 404 Not Found - Recurso inexistente
    NotFound = 404,

    /// 500 Internal Error - Fallo interno al servir el recurso
    InternalError = 500,
}

impl StatusCode {
    /// Convierte el código a su valor numérico
    ///
    /// # Ejemplo
    /// ```
    /// use tinyweb::http::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// ```
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Texto de razón que acompaña al código en la status line
    ///
    /// # Ejemplo
    /// ```
    /// use tinyweb::http::StatusCode;
    /// assert_eq!(StatusCode::NotFound.reason_phrase(), "Not Found");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalError => "Internal Error",
        }
    }

    /// Cuerpo fijo para las páginas de error (None para 200)
    pub fn error_body(&self) -> Option<&'static str> {
        match self {
            StatusCode::Ok => None,
            StatusCode::BadRequest => Some(
                "Your request has bad syntax or is inherently impossible to satisfy.\n",
            ),
            StatusCode::Forbidden => {
                Some("You do not have permission to get this file from this server.\n")
            }
            StatusCode::NotFound => Some("The requested file was not found on this server.\n"),
            StatusCode::InternalError => {
                Some("There was an unusual problem serving the requested file.\n")
            }
        }
    }

    /// Verifica si el código indica éxito (2xx)
    pub fn is_success(&self) -> bool {
        matches!(self, StatusCode::Ok)
    }

    /// Verifica si el código indica error del cliente (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.as_u16())
    }

    /// Verifica si el código indica error del servidor (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.as_u16())
    }
}

impl std::fmt::Display for StatusCode {
    /// Formato: "200 OK"
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}
