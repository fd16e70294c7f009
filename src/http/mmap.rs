//! # Mapeo de Archivos en Memoria
//! src/http/mmap.rs
//!
//! Mapeo de solo lectura de un archivo servido, sobre `memmap2`. El mapeo
//! se libera cuando la conexión se reinicia o se cierra.

use memmap2::Mmap;
use std::fs::File;
use std::io;
use std::path::Path;

/// Archivo mapeado de solo lectura (`None` si está vacío)
#[derive(Debug)]
pub struct MappedFile {
    map: Option<Mmap>,
}

impl MappedFile {
    /// Mapea el archivo completo. Un archivo vacío no se mapea.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(Self { map: None });
        }

        // El descriptor puede cerrarse después: el mapeo sigue siendo válido
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self { map: Some(map) })
    }

    pub fn len(&self) -> usize {
        self.map.as_ref().map_or(0, |map| map.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }
}
