//! # Resolución de Recursos
//! src/http/resource.rs
//!
//! Traduce el target de un request completo a un resultado:
//!
//! - POST a un target cuyo último segmento empieza con `2` (login) o `3`
//!   (registro): consulta el almacén de credenciales y sustituye el target
//!   por una página fija de resultado.
//! - Atajos `/0`, `/1`, `/5`, `/6`, `/7`: páginas fijas.
//! - Cualquier otro target: `doc_root + target`, verificado con `stat` y
//!   mapeado en memoria.
//!
//! | Último segmento | Página |
//! |---|---|
//! | `0` | `/register.html` |
//! | `1` | `/log.html` |
//! | `5` | `/picture.html` |
//! | `6` | `/video.html` |
//! | `7` | `/fans.html` |

use super::mmap::MappedFile;
use super::request::{Method, Request};
use super::StatusCode;
use crate::resource::Session;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Resultado de resolver un request
#[derive(Debug)]
pub enum Outcome {
    /// Archivo legible, ya mapeado (puede estar vacío)
    File(MappedFile),

    /// El recurso no existe
    NoResource,

    /// Sin permiso de lectura para "otros", o target con `..`
    Forbidden,

    /// Target es un directorio, o formulario inválido
    BadRequest,

    /// Fallo interno (sin sesión, mmap fallido)
    Internal,
}

impl Outcome {
    /// Código de estado con el que se responde
    pub fn status(&self) -> StatusCode {
        match self {
            Outcome::File(_) => StatusCode::Ok,
            Outcome::NoResource => StatusCode::NotFound,
            Outcome::Forbidden => StatusCode::Forbidden,
            Outcome::BadRequest => StatusCode::BadRequest,
            Outcome::Internal => StatusCode::InternalError,
        }
    }
}

/// Resolución de targets contra el directorio raíz
#[derive(Debug, Clone)]
pub struct Resolver {
    doc_root: PathBuf,
}

impl Resolver {
    pub fn new(doc_root: impl Into<PathBuf>) -> Self {
        Self {
            doc_root: doc_root.into(),
        }
    }

    pub fn doc_root(&self) -> &Path {
        &self.doc_root
    }

    /// Resuelve un request completo
    ///
    /// `session` solo se usa para los targets de credenciales; sin sesión
    /// esos targets resultan en `Internal`.
    pub fn resolve(&self, request: &Request, session: Option<&Session>) -> Outcome {
        let target = request.target();

        if target.split('/').any(|segment| segment == "..") {
            return Outcome::Forbidden;
        }

        let last = target.rsplit('/').next().unwrap_or("");

        let page = if request.method() == Method::POST
            && (last.starts_with('2') || last.starts_with('3'))
        {
            match self.authenticate(last.starts_with('2'), request.body(), session) {
                Ok(page) => page,
                Err(outcome) => return outcome,
            }
        } else {
            match last {
                "0" => "/register.html",
                "1" => "/log.html",
                "5" => "/picture.html",
                "6" => "/video.html",
                "7" => "/fans.html",
                _ => target,
            }
        };

        self.open(page)
    }

    /// Login o registro; retorna la página de resultado
    fn authenticate(
        &self,
        login: bool,
        body: &str,
        session: Option<&Session>,
    ) -> Result<&'static str, Outcome> {
        let Some((name, password)) = parse_form(body) else {
            return Err(Outcome::BadRequest);
        };

        let Some(session) = session else {
            tracing::warn!(user = name, "no session available for credential lookup");
            return Err(Outcome::Internal);
        };

        if login {
            if session.verify(name, password) {
                tracing::info!(user = name, "login ok");
                Ok("/welcome.html")
            } else {
                tracing::info!(user = name, "login failed");
                Ok("/logError.html")
            }
        } else {
            match session.register(name, password) {
                Ok(true) => {
                    tracing::info!(user = name, "user registered");
                    Ok("/log.html")
                }
                Ok(false) => Ok("/registerError.html"),
                Err(e) => {
                    tracing::warn!(user = name, error = %e, "registration failed");
                    Ok("/registerError.html")
                }
            }
        }
    }

    /// `stat` + permisos + mapeo
    fn open(&self, target: &str) -> Outcome {
        let path = self.doc_root.join(target.trim_start_matches('/'));

        let metadata = match fs::metadata(&path) {
            Ok(m) => m,
            Err(_) => return Outcome::NoResource,
        };

        // Legible por "otros"
        if metadata.permissions().mode() & 0o004 == 0 {
            return Outcome::Forbidden;
        }

        if metadata.is_dir() {
            return Outcome::BadRequest;
        }

        match MappedFile::open(&path) {
            Ok(file) => Outcome::File(file),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to map file");
                Outcome::Internal
            }
        }
    }
}

/// `user=<name>&passwd=<password>` (también acepta `name=`)
fn parse_form(body: &str) -> Option<(&str, &str)> {
    let mut name = None;
    let mut password = None;

    for pair in body.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            match key {
                "user" | "name" => name = Some(value),
                "passwd" => password = Some(value),
                _ => {}
            }
        }
    }

    match (name, password) {
        (Some(name), Some(password)) if !name.is_empty() => Some((name, password)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::{HttpCode, RequestParser};
    use crate::resource::{CredentialStore, ResourcePool};
    use std::sync::Arc;
    use std::time::Duration;

    struct DocRoot(PathBuf);

    impl DocRoot {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir()
                .join(format!("tinyweb_resolver_{}_{}", name, std::process::id()));
            let _ = fs::remove_dir_all(&dir);
            fs::create_dir_all(dir.join("sub")).unwrap();

            for page in [
                "judge.html",
                "welcome.html",
                "logError.html",
                "log.html",
                "registerError.html",
                "register.html",
                "picture.html",
            ] {
                fs::write(dir.join(page), page).unwrap();
                fs::set_permissions(dir.join(page), fs::Permissions::from_mode(0o644)).unwrap();
            }
            fs::set_permissions(dir.join("sub"), fs::Permissions::from_mode(0o755)).unwrap();
            fs::write(dir.join("empty.html"), "").unwrap();
            fs::set_permissions(dir.join("empty.html"), fs::Permissions::from_mode(0o644))
                .unwrap();
            fs::write(dir.join("private.html"), "secret").unwrap();
            fs::set_permissions(dir.join("private.html"), fs::Permissions::from_mode(0o600))
                .unwrap();

            DocRoot(dir)
        }
    }

    impl Drop for DocRoot {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn request(raw: &str) -> Request {
        let mut buf = raw.as_bytes().to_vec();
        let len = buf.len();
        let mut parser = RequestParser::new();
        assert_eq!(parser.parse(&mut buf, len), HttpCode::GetRequest);
        parser.request().clone()
    }

    fn post(target: &str, body: &str) -> Request {
        request(&format!(
            "POST {} HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}",
            target,
            body.len(),
            body
        ))
    }

    fn file_contents(outcome: Outcome) -> Vec<u8> {
        match outcome {
            Outcome::File(file) => file.as_slice().to_vec(),
            other => panic!("expected file, got {:?}", other),
        }
    }

    fn pool() -> ResourcePool {
        let store = Arc::new(CredentialStore::in_memory());
        store.insert("bob", "pw1").unwrap();
        ResourcePool::new(store, 1, Duration::from_millis(50))
    }

    // ==================== Archivos ====================

    #[test]
    fn test_default_document() {
        let root = DocRoot::new("default");
        let resolver = Resolver::new(&root.0);

        let outcome = resolver.resolve(&request("GET / HTTP/1.1\r\n\r\n"), None);
        assert_eq!(outcome.status(), StatusCode::Ok);
        assert_eq!(file_contents(outcome), b"judge.html");
    }

    #[test]
    fn test_missing_file() {
        let root = DocRoot::new("missing");
        let resolver = Resolver::new(&root.0);

        let outcome = resolver.resolve(&request("GET /nope HTTP/1.1\r\n\r\n"), None);
        assert!(matches!(outcome, Outcome::NoResource));
        assert_eq!(outcome.status(), StatusCode::NotFound);
    }

    #[test]
    fn test_directory_is_bad_request() {
        let root = DocRoot::new("dir");
        let resolver = Resolver::new(&root.0);

        let outcome = resolver.resolve(&request("GET /sub HTTP/1.1\r\n\r\n"), None);
        assert!(matches!(outcome, Outcome::BadRequest));
    }

    #[test]
    fn test_not_world_readable_is_forbidden() {
        let root = DocRoot::new("private");
        let resolver = Resolver::new(&root.0);

        let outcome = resolver.resolve(&request("GET /private.html HTTP/1.1\r\n\r\n"), None);
        assert!(matches!(outcome, Outcome::Forbidden));
    }

    #[test]
    fn test_parent_segment_is_forbidden() {
        let root = DocRoot::new("dotdot");
        let resolver = Resolver::new(&root.0);

        let outcome = resolver.resolve(&request("GET /sub/../judge.html HTTP/1.1\r\n\r\n"), None);
        assert!(matches!(outcome, Outcome::Forbidden));
    }

    #[test]
    fn test_empty_file() {
        let root = DocRoot::new("empty");
        let resolver = Resolver::new(&root.0);

        let outcome = resolver.resolve(&request("GET /empty.html HTTP/1.1\r\n\r\n"), None);
        assert!(file_contents(outcome).is_empty());
    }

    #[test]
    fn test_page_shortcuts() {
        let root = DocRoot::new("shortcuts");
        let resolver = Resolver::new(&root.0);

        let outcome = resolver.resolve(&request("GET /0 HTTP/1.1\r\n\r\n"), None);
        assert_eq!(file_contents(outcome), b"register.html");

        let outcome = resolver.resolve(&request("GET /5 HTTP/1.1\r\n\r\n"), None);
        assert_eq!(file_contents(outcome), b"picture.html");

        // Un GET a /2 no es login: se busca el archivo literal
        let outcome = resolver.resolve(&request("GET /2 HTTP/1.1\r\n\r\n"), None);
        assert!(matches!(outcome, Outcome::NoResource));
    }

    // ==================== Credenciales ====================

    #[test]
    fn test_login_success_and_failure() {
        let root = DocRoot::new("login");
        let resolver = Resolver::new(&root.0);
        let pool = pool();
        let session = pool.acquire().unwrap();

        let ok = resolver.resolve(&post("/2CGISQL.cgi", "user=bob&passwd=pw1"), session.get());
        assert_eq!(file_contents(ok), b"welcome.html");

        let bad = resolver.resolve(&post("/2CGISQL.cgi", "user=bob&passwd=nope"), session.get());
        assert_eq!(file_contents(bad), b"logError.html");
    }

    #[test]
    fn test_registration() {
        let root = DocRoot::new("register");
        let resolver = Resolver::new(&root.0);
        let pool = pool();
        let session = pool.acquire().unwrap();

        let new_user = resolver.resolve(&post("/3CGISQL.cgi", "user=ann&passwd=x"), session.get());
        assert_eq!(file_contents(new_user), b"log.html");

        let duplicate = resolver.resolve(&post("/3CGISQL.cgi", "name=bob&passwd=x"), session.get());
        assert_eq!(file_contents(duplicate), b"registerError.html");

        assert!(session.get().unwrap().verify("ann", "x"));
    }

    #[test]
    fn test_malformed_form() {
        let root = DocRoot::new("form");
        let resolver = Resolver::new(&root.0);
        let pool = pool();
        let session = pool.acquire().unwrap();

        let outcome = resolver.resolve(&post("/2CGISQL.cgi", "hello"), session.get());
        assert!(matches!(outcome, Outcome::BadRequest));
    }

    #[test]
    fn test_credentials_without_session() {
        let root = DocRoot::new("nosession");
        let resolver = Resolver::new(&root.0);

        let outcome = resolver.resolve(&post("/2CGISQL.cgi", "user=bob&passwd=pw1"), None);
        assert!(matches!(outcome, Outcome::Internal));
        assert_eq!(outcome.status(), StatusCode::InternalError);
    }

    #[test]
    fn test_parse_form() {
        assert_eq!(parse_form("user=bob&passwd=pw1"), Some(("bob", "pw1")));
        assert_eq!(parse_form("passwd=pw1&name=bob&x=y"), Some(("bob", "pw1")));
        assert_eq!(parse_form("user=&passwd=pw1"), None);
        assert_eq!(parse_form("user=bob"), None);
    }
}
