//! # Configuración del Servidor
//! src/config.rs
//!
//! Configuración del servidor con argumentos CLI y variables de entorno.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./tinyweb 9006 \
//!   --workers 8 \
//!   --doc-root ./root \
//!   --conn-trigger edge
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! TINYWEB_HOST=127.0.0.1 TINYWEB_WORKERS=4 ./tinyweb 9006
//! ```

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Modo de notificación de epoll
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TriggerMode {
    /// Una lectura / un accept por notificación
    Level,

    /// Drenar hasta `WouldBlock` en cada notificación
    Edge,
}

impl TriggerMode {
    pub fn is_edge(&self) -> bool {
        matches!(self, TriggerMode::Edge)
    }
}

/// Formato de los logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Compact,
}

/// Configuración del servidor
#[derive(Debug, Clone, Parser)]
#[command(name = "tinyweb")]
#[command(about = "Servidor HTTP/1.1 con reactor epoll y pool de workers")]
#[command(version)]
pub struct Config {
    /// Puerto en el que escucha el servidor
    #[arg(value_name = "PORT")]
    pub port: u16,

    /// Host/IP en el que escucha
    #[arg(long, default_value = "0.0.0.0", env = "TINYWEB_HOST")]
    pub host: String,

    /// Directorio raíz de los documentos servidos
    #[arg(long, default_value = "./root", env = "TINYWEB_DOC_ROOT")]
    pub doc_root: PathBuf,

    // === Workers ===

    /// Número de threads del pool
    #[arg(long, default_value = "8", env = "TINYWEB_WORKERS")]
    pub workers: usize,

    /// Máximo de tareas pendientes en la cola
    #[arg(long, default_value = "10000", env = "TINYWEB_MAX_REQUESTS")]
    pub max_requests: usize,

    // === Conexiones ===

    /// Máximo de conexiones vivas; las siguientes reciben "Internal server busy"
    #[arg(long, default_value = "65536", env = "TINYWEB_MAX_CONNECTIONS")]
    pub max_connections: usize,

    /// Período de la alarma que barre los timers (segundos)
    #[arg(long = "timeslot-secs", default_value = "5", env = "TINYWEB_TIMESLOT")]
    pub timeslot_secs: u64,

    /// Inactividad tras la cual se cierra una conexión (milisegundos)
    #[arg(long = "idle-timeout-ms", default_value = "15000", env = "TINYWEB_IDLE_TIMEOUT")]
    pub idle_timeout_ms: u64,

    /// Modo de notificación del socket que escucha
    #[arg(long, value_enum, default_value = "level", env = "TINYWEB_LISTEN_TRIGGER")]
    pub listen_trigger: TriggerMode,

    /// Modo de notificación de las conexiones
    #[arg(long, value_enum, default_value = "level", env = "TINYWEB_CONN_TRIGGER")]
    pub conn_trigger: TriggerMode,

    /// Tamaño del buffer de lectura por conexión
    #[arg(long, default_value = "2048", env = "TINYWEB_READ_BUFFER")]
    pub read_buffer: usize,

    /// Tamaño del buffer de escritura por conexión
    #[arg(long, default_value = "1024", env = "TINYWEB_WRITE_BUFFER")]
    pub write_buffer: usize,

    // === Credenciales ===

    /// Sesiones del pool de recursos
    #[arg(long = "resource-pool", default_value = "8", env = "TINYWEB_RESOURCE_POOL")]
    pub resource_pool: usize,

    /// Espera máxima por una sesión (milisegundos)
    #[arg(long = "acquire-timeout-ms", default_value = "5000", env = "TINYWEB_ACQUIRE_TIMEOUT")]
    pub acquire_timeout_ms: u64,

    /// Archivo JSON que respalda el almacén de credenciales
    #[arg(long, env = "TINYWEB_USERS_FILE")]
    pub users_file: Option<PathBuf>,

    // === Logging ===

    /// Nivel de log (RUST_LOG tiene prioridad)
    #[arg(long, default_value = "info", env = "TINYWEB_LOG_LEVEL")]
    pub log_level: String,

    /// Formato de log
    #[arg(long, value_enum, default_value = "pretty", env = "TINYWEB_LOG_FORMAT")]
    pub log_format: LogFormat,
}

/// Tamaño mínimo aceptado para los buffers de cada conexión
pub const MIN_BUFFER: usize = 128;

impl Config {
    /// Crea una configuración parseando argumentos CLI
    pub fn new() -> Self {
        Config::parse()
    }

    /// Dirección completa para bind (host:port)
    ///
    /// # Ejemplo
    /// ```rust
    /// use tinyweb::config::Config;
    ///
    /// let mut config = Config::default();
    /// config.port = 9006;
    /// assert_eq!(config.address(), "127.0.0.1:9006");
    /// ```
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn timeslot(&self) -> Duration {
        Duration::from_secs(self.timeslot_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Valida la configuración
    ///
    /// Retorna errores si hay valores inválidos
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("workers must be >= 1".to_string());
        }
        if self.max_requests == 0 {
            return Err("max requests must be >= 1".to_string());
        }
        if self.max_connections == 0 {
            return Err("max connections must be >= 1".to_string());
        }

        if self.timeslot_secs == 0 {
            return Err("timeslot must be > 0".to_string());
        }
        if self.idle_timeout_ms == 0 {
            return Err("idle timeout must be > 0".to_string());
        }

        if self.resource_pool == 0 {
            return Err("resource pool must have >= 1 session".to_string());
        }

        if self.read_buffer < MIN_BUFFER {
            return Err(format!("read buffer must be >= {} bytes", MIN_BUFFER));
        }
        if self.write_buffer < MIN_BUFFER {
            return Err(format!("write buffer must be >= {} bytes", MIN_BUFFER));
        }

        Ok(())
    }

    /// Imprime un resumen de la configuración
    pub fn print_summary(&self) {
        println!("╔══════════════════════════════════════════════════════════════╗");
        println!("║                  tinyweb configuration                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝");
        println!();
        println!("🌐 Network:");
        println!("   Address:      {}", self.address());
        println!("   Doc root:     {}", self.doc_root.display());
        println!("   Triggers:     listen={:?} conn={:?}", self.listen_trigger, self.conn_trigger);
        println!("   Buffers:      read={} write={}", self.read_buffer, self.write_buffer);
        println!();
        println!("👷 Workers:");
        println!("   Threads:      {}", self.workers);
        println!("   Queue depth:  {}", self.max_requests);
        println!("   Connections:  {}", self.max_connections);
        println!();
        println!("⏱️  Timers:");
        println!("   Timeslot:     {} s", self.timeslot_secs);
        println!("   Idle timeout: {} ms", self.idle_timeout_ms);
        println!();
        println!("🔑 Credentials:");
        println!("   Sessions:     {} ({} ms max wait)", self.resource_pool, self.acquire_timeout_ms);
        match &self.users_file {
            Some(path) => println!("   Users file:   {}", path.display()),
            None => println!("   Users file:   (in memory)"),
        }
        println!();
        println!("═══════════════════════════════════════════════════════════════");
        println!();
    }
}

impl Default for Config {
    /// Configuración por defecto: puerto efímero en loopback
    fn default() -> Self {
        Self {
            port: 0,
            host: "127.0.0.1".to_string(),
            doc_root: PathBuf::from("./root"),
            workers: 8,
            max_requests: 10_000,
            max_connections: 65_536,
            timeslot_secs: 5,
            idle_timeout_ms: 15_000,
            listen_trigger: TriggerMode::Level,
            conn_trigger: TriggerMode::Level,
            read_buffer: 2048,
            write_buffer: 1024,
            resource_pool: 8,
            acquire_timeout_ms: 5_000,
            users_file: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}
