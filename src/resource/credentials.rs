//! # Almacén de Credenciales
//! src/resource/credentials.rs
//!
//! Mapa usuario → SHA-256 de la contraseña. Opcionalmente respaldado por un
//! archivo JSON que se carga al arrancar y se reescribe (de forma atómica)
//! en cada alta exitosa.
//!
//! ## Formato del archivo
//!
//! ```text
//! {
//!   "bob": "6b3a55e0261b0304143f805a24924d0c1c44524821305f31d9277843b8a10f4e"
//! }
//! ```

use crate::error::ServerError;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Almacén thread-safe de credenciales
pub struct CredentialStore {
    /// Ruta al archivo de persistencia (None = solo memoria)
    path: Option<PathBuf>,

    /// usuario → digest hex de la contraseña
    users: Mutex<HashMap<String, String>>,
}

impl CredentialStore {
    /// Crea un almacén vacío sin persistencia
    pub fn in_memory() -> Self {
        Self {
            path: None,
            users: Mutex::new(HashMap::new()),
        }
    }

    /// Abre (o crea) un almacén respaldado por `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref().to_path_buf();

        let users = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            HashMap::new()
        };

        tracing::info!(path = %path.display(), users = users.len(), "credential store loaded");

        Ok(Self {
            path: Some(path),
            users: Mutex::new(users),
        })
    }

    /// Carga usuarios desde el archivo
    fn load_from_file(path: &Path) -> Result<HashMap<String, String>, ServerError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        serde_json::from_reader(reader)
            .map_err(|e| ServerError::Store(format!("{}: {}", path.display(), e)))
    }

    /// Guarda el mapa completo (archivo temporal + rename)
    fn save_to_file(path: &Path, users: &HashMap<String, String>) -> Result<(), ServerError> {
        let temp_path = path.with_extension("tmp");
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);

        serde_json::to_writer_pretty(&mut writer, users)
            .map_err(|e| ServerError::Store(e.to_string()))?;
        writer.flush()?;

        // Renombrar (atómico en sistemas Unix)
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.users.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// SHA-256 en hexadecimal
    pub fn digest(password: &str) -> String {
        let hash = Sha256::digest(password.as_bytes());
        hash.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Busca el digest guardado para `name`
    pub fn lookup(&self, name: &str) -> Option<String> {
        self.lock().get(name).cloned()
    }

    /// Verifica usuario y contraseña
    pub fn verify(&self, name: &str, password: &str) -> bool {
        match self.lookup(name) {
            Some(stored) => stored == Self::digest(password),
            None => false,
        }
    }

    /// Da de alta un usuario nuevo
    ///
    /// Retorna `Ok(false)` si el nombre ya existe. Si la persistencia
    /// falla, el alta se deshace y se retorna el error.
    pub fn insert(&self, name: &str, password: &str) -> Result<bool, ServerError> {
        let mut users = self.lock();
        if users.contains_key(name) {
            return Ok(false);
        }

        users.insert(name.to_string(), Self::digest(password));

        if let Some(path) = &self.path {
            if let Err(e) = Self::save_to_file(path, &users) {
                users.remove(name);
                return Err(e);
            }
        }

        Ok(true)
    }

    /// Número de usuarios registrados
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Verifica si no hay usuarios
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
