use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use log::debug;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use crate::backport::{Backporter, RunSummary};
use crate::class_pool::ClassPool;
use crate::error::BackportError;
use crate::ClassFile;

const CLASS_SUFFIX: &str = ".class";
// Classes of these entries never hold code the backporter rewrites.
const SKIPPED_CLASSES: [&str; 2] = ["module-info.class", "package-info.class"];

#[derive(Error, Debug)]
pub enum JarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Class {path}: {source}")]
    Class {
        path: String,
        #[source]
        source: BackportError,
    },
    #[error("Entry not found: {0}")]
    MissingEntry(String),
}

pub type JarResult<T> = Result<T, JarError>;

/// In-memory JAR (ZIP) archive. Entries map paths to raw bytes, sorted by
/// path, so archives are written deterministically.
#[derive(Clone, Debug, Default)]
pub struct JarFile {
    entries: BTreeMap<String, Vec<u8>>,
}

impl JarFile {
    pub fn new() -> Self {
        JarFile::default()
    }

    pub fn read<R: Read + Seek>(reader: R) -> JarResult<Self> {
        let mut archive = zip::ZipArchive::new(reader)?;
        let mut entries = BTreeMap::new();

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            entries.insert(name, data);
        }

        Ok(JarFile { entries })
    }

    pub fn from_bytes(bytes: &[u8]) -> JarResult<Self> {
        Self::read(Cursor::new(bytes))
    }

    pub fn open(path: impl AsRef<Path>) -> JarResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::read(std::io::BufReader::new(file))
    }

    /// Write every entry with Deflated compression.
    pub fn write<W: Write + Seek>(&self, writer: W) -> JarResult<()> {
        let mut zip_writer = zip::ZipWriter::new(writer);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, data) in &self.entries {
            zip_writer.start_file(name.as_str(), options)?;
            zip_writer.write_all(data)?;
        }

        zip_writer.finish()?;
        Ok(())
    }

    pub fn to_bytes(&self) -> JarResult<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        self.write(&mut buf)?;
        Ok(buf.into_inner())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> JarResult<()> {
        let file = std::fs::File::create(path)?;
        self.write(std::io::BufWriter::new(file))
    }

    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    /// `.class` entries that hold program classes.
    pub fn class_entries(&self) -> impl Iterator<Item = &str> {
        self.entry_names().filter(|n| {
            n.ends_with(CLASS_SUFFIX)
                && !n.starts_with("META-INF/")
                && !SKIPPED_CLASSES.iter().any(|skipped| n.rsplit('/').next() == Some(*skipped))
        })
    }

    pub fn get_entry(&self, path: &str) -> Option<&[u8]> {
        self.entries.get(path).map(|v| v.as_slice())
    }

    pub fn set_entry(&mut self, path: impl Into<String>, data: Vec<u8>) {
        self.entries.insert(path.into(), data);
    }

    pub fn remove_entry(&mut self, path: &str) -> Option<Vec<u8>> {
        self.entries.remove(path)
    }

    pub fn contains_entry(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn parse_class(&self, path: &str) -> JarResult<ClassFile> {
        let data = self
            .get_entry(path)
            .ok_or_else(|| JarError::MissingEntry(path.to_string()))?;
        ClassFile::from_bytes(data).map_err(|source| JarError::Class {
            path: path.to_string(),
            source,
        })
    }

    pub fn set_class(&mut self, class_file: &ClassFile) -> JarResult<()> {
        let name = class_file.name().map_err(|source| JarError::Class {
            path: "<unnamed>".to_string(),
            source,
        })?;
        let path = format!("{}{}", name, CLASS_SUFFIX);
        let bytes = class_file.to_bytes().map_err(|source| JarError::Class {
            path: path.clone(),
            source,
        })?;
        self.set_entry(path, bytes);
        Ok(())
    }

    /// Parse every class entry into a pool.
    pub fn class_pool(&self) -> JarResult<ClassPool> {
        let mut pool = ClassPool::new();
        for path in self.class_entries() {
            let class = self.parse_class(path)?;
            pool.insert(class).map_err(|source| JarError::Class {
                path: path.to_string(),
                source,
            })?;
        }
        debug!("Loaded {} classes", pool.len());
        Ok(pool)
    }
}

/// Backport every class of `jar` in place. Only modified and created classes
/// are written back; other entries keep their original bytes.
pub fn backport_jar(jar: &mut JarFile, library: &ClassPool, backporter: &Backporter<'_>) -> JarResult<RunSummary> {
    let mut program = jar.class_pool()?;
    let mut touched = Vec::new();
    let summary = backporter.run_with(&mut program, library, |name| touched.push(name.to_string()), |_, _| {});
    for name in touched {
        if let Some(class) = program.lookup(&name) {
            jar.set_class(class)?;
        }
    }
    Ok(summary)
}
