//! Loading instrumented classes
//!
//! [`InstrumentingClassLoader`] is the boundary between the rewriter and whatever executes the
//! classes. It finds class bytes through a [`ParentLoader`], rewrites every class that isn't
//! excluded, and remembers the result so that each name is rewritten at most once per loader
//! (modulo concurrent first loads, which may both rewrite but agree on what ends up cached).

use crate::instrument;
use crate::jvm::class_file::ClassFile;
use crate::rewrite::ClassRewriter;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use walkdir::WalkDir;

/// A loaded class
///
/// Cloning is cheap and every clone refers to the same bytes.
#[derive(Clone, Debug)]
pub struct ClassHandle(Arc<LoadedClass>);

#[derive(Debug)]
pub struct LoadedClass {
    /// Dotted name (`com.example.Widget`)
    pub name: String,
    pub bytes: Vec<u8>,

    /// Did the bytes go through the rewriter?
    pub instrumented: bool,
}

impl ClassHandle {
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0.bytes
    }

    pub fn is_instrumented(&self) -> bool {
        self.0.instrumented
    }

    /// Are both handles the very same loaded class?
    pub fn same_class(&self, other: &ClassHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Why a class couldn't be loaded
#[derive(Debug)]
pub enum ClassNotFoundCause {
    /// No class file with that name
    NotFound,
    Io(io::Error),
    Transform(instrument::Error),

    /// The class file declares a different class than the one asked for
    NameMismatch { found: String },
}

#[derive(Debug)]
pub struct ClassNotFound {
    pub name: String,
    pub cause: ClassNotFoundCause,
}

impl fmt::Display for ClassNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class {} not found: ", self.name)?;
        match &self.cause {
            ClassNotFoundCause::NotFound => f.write_str("no class file"),
            ClassNotFoundCause::Io(err) => write!(f, "{}", err),
            ClassNotFoundCause::Transform(err) => write!(f, "{}", err),
            ClassNotFoundCause::NameMismatch { found } => {
                write!(f, "class file declares {}", found)
            }
        }
    }
}

impl std::error::Error for ClassNotFound {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            ClassNotFoundCause::Io(err) => Some(err),
            ClassNotFoundCause::Transform(err) => Some(err),
            ClassNotFoundCause::NotFound | ClassNotFoundCause::NameMismatch { .. } => None,
        }
    }
}

/// Source of class files that haven't been instrumented
pub trait ParentLoader: Send + Sync {
    /// Raw bytes of the class with this dotted name, or `None` if there is no such class
    fn find_class_bytes(&self, name: &str) -> io::Result<Option<Vec<u8>>>;
}

/// Directories of class files, searched in order
#[derive(Clone, Debug, Default)]
pub struct ClassPath {
    directories: Vec<PathBuf>,
}

impl ClassPath {
    pub fn new<P: Into<PathBuf>>(directories: impl IntoIterator<Item = P>) -> ClassPath {
        ClassPath {
            directories: directories.into_iter().map(Into::into).collect(),
        }
    }

    /// Dotted names of all the classes on the path, sorted (earlier directories shadow later
    /// ones)
    pub fn class_names(&self) -> io::Result<Vec<String>> {
        let mut names = vec![];
        for directory in &self.directories {
            for entry in WalkDir::new(directory).sort_by_file_name() {
                let entry = entry.map_err(io::Error::from)?;
                if let Some(name) = class_name_of(directory, entry.path()) {
                    names.push(name);
                }
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Dotted class name of a `.class` file under `root`
fn class_name_of(root: &Path, path: &Path) -> Option<String> {
    if path.extension()? != "class" {
        return None;
    }
    let relative = path.strip_prefix(root).ok()?.with_extension("");
    let parts: Option<Vec<&str>> = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect();
    Some(parts?.join("."))
}

impl ParentLoader for ClassPath {
    fn find_class_bytes(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        let mut relative = PathBuf::new();
        for part in name.split('.') {
            relative.push(part);
        }
        relative.set_extension("class");
        for directory in &self.directories {
            match std::fs::read(directory.join(&relative)) {
                Ok(bytes) => return Ok(Some(bytes)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }
}

/// Decides (by dotted name) which classes are loaded without instrumentation
pub type ExclusionPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Class loader that instruments what it loads
///
/// The cache belongs to the loader: two loaders never share rewritten classes.
pub struct InstrumentingClassLoader {
    rewriter: ClassRewriter,
    parent: Box<dyn ParentLoader>,
    exclude: ExclusionPredicate,
    cache: RwLock<HashMap<String, ClassHandle>>,
}

impl InstrumentingClassLoader {
    /// Loader excluding the prefixes in the rewriter's settings
    pub fn new(rewriter: ClassRewriter, parent: impl ParentLoader + 'static) -> Self {
        let settings = rewriter.settings().clone();
        let exclude: ExclusionPredicate = Arc::new(move |name: &str| settings.is_excluded(name));
        InstrumentingClassLoader::with_exclusions(rewriter, parent, exclude)
    }

    pub fn with_exclusions(
        rewriter: ClassRewriter,
        parent: impl ParentLoader + 'static,
        exclude: ExclusionPredicate,
    ) -> Self {
        InstrumentingClassLoader {
            rewriter,
            parent: Box::new(parent),
            exclude,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Load a class, given in dotted (`a.b.C`) or internal (`a/b/C`) form
    ///
    /// Excluded classes come straight from the parent loader. Everything else is rewritten on
    /// first load and served from the cache afterwards.
    pub fn load(&self, name: &str) -> Result<ClassHandle, ClassNotFound> {
        let name = name.replace('/', ".");
        let not_found = |cause| ClassNotFound {
            name: name.clone(),
            cause,
        };

        if (self.exclude)(&name) {
            log::debug!("{} is excluded from instrumentation", name);
            let bytes = self.find_bytes(&name).map_err(not_found)?;
            return Ok(ClassHandle(Arc::new(LoadedClass {
                name,
                bytes,
                instrumented: false,
            })));
        }

        if let Some(handle) = self.cached(&name) {
            return Ok(handle);
        }

        let bytes = self.find_bytes(&name).map_err(not_found)?;
        let rewritten = self
            .rewriter
            .rewrite(&bytes)
            .map_err(|err| not_found(ClassNotFoundCause::Transform(err)))?;
        let defined = define(&name, &rewritten).map_err(not_found)?;
        log::debug!("defined instrumented {}", defined);

        let handle = ClassHandle(Arc::new(LoadedClass {
            name: name.clone(),
            bytes: rewritten,
            instrumented: true,
        }));
        let mut cache = match self.cache.write() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(cache.entry(name).or_insert(handle).clone())
    }

    /// Dotted names of the classes instrumented so far
    pub fn loaded_classes(&self) -> Vec<String> {
        let cache = match self.cache.read() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut names: Vec<String> = cache.keys().cloned().collect();
        names.sort();
        names
    }

    fn cached(&self, name: &str) -> Option<ClassHandle> {
        let cache = match self.cache.read() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache.get(name).cloned()
    }

    fn find_bytes(&self, name: &str) -> Result<Vec<u8>, ClassNotFoundCause> {
        match self.parent.find_class_bytes(name) {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(ClassNotFoundCause::NotFound),
            Err(err) => Err(ClassNotFoundCause::Io(err)),
        }
    }
}

/// Check that rewritten bytes really define the class `name`
fn define(name: &str, bytes: &[u8]) -> Result<String, ClassNotFoundCause> {
    let declared = ClassFile::parse(bytes)
        .and_then(|class| class.this_class_name())
        .map_err(|err| ClassNotFoundCause::Transform(err.into()))?
        .replace('/', ".");
    if declared == name {
        Ok(declared)
    } else {
        Err(ClassNotFoundCause::NameMismatch { found: declared })
    }
}
