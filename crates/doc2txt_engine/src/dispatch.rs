//! Capability-gated format dispatch.
//!
//! The registry is built once at startup from the fixed [`FORMAT_TABLE`]
//! and a [`CapabilityProbe`]. Formats whose capability is unavailable are
//! left out, so their files fall through to verbatim copy.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use doc2txt_core::{normalize_extension, ExtractionWarning};
use engine_logging::{engine_debug, engine_info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::epub::ArchiveHandler;
use crate::external::ExternalToolHandler;
use crate::ConvertError;

/// Text pulled out of one source file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Extraction {
    pub text: String,
    pub warnings: Vec<ExtractionWarning>,
}

pub trait FormatHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, path: &Path) -> Result<Extraction, ConvertError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FormatTag {
    Epub,
    Docx,
    Pdf,
    Mobi,
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatTag::Epub => write!(f, "epub"),
            FormatTag::Docx => write!(f, "docx"),
            FormatTag::Pdf => write!(f, "pdf"),
            FormatTag::Mobi => write!(f, "mobi"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Built-in XHTML/HTML extraction. Always compiled in.
    Markup,
    Office,
    Pdf,
    ExternalTool,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Markup => write!(f, "markup extraction"),
            Capability::Office => write!(f, "office document extraction"),
            Capability::Pdf => write!(f, "PDF extraction"),
            Capability::ExternalTool => write!(f, "external e-book converter"),
        }
    }
}

/// One row of the dispatch table.
#[derive(Debug, Clone, Copy)]
pub struct FormatSpec {
    pub tag: FormatTag,
    pub extensions: &'static [&'static str],
    pub capability: Capability,
}

pub const FORMAT_TABLE: &[FormatSpec] = &[
    FormatSpec {
        tag: FormatTag::Epub,
        extensions: &["epub"],
        capability: Capability::Markup,
    },
    FormatSpec {
        tag: FormatTag::Docx,
        extensions: &["docx"],
        capability: Capability::Office,
    },
    FormatSpec {
        tag: FormatTag::Pdf,
        extensions: &["pdf"],
        capability: Capability::Pdf,
    },
    FormatSpec {
        tag: FormatTag::Mobi,
        extensions: &["mobi", "azw3"],
        capability: Capability::ExternalTool,
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerSettings {
    /// Program name or path of the external e-book converter.
    pub external_tool: PathBuf,
    pub tool_timeout: Duration,
    /// Parent of the external tool's work directories. The system temp
    /// directory when unset.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            external_tool: PathBuf::from("ebook-convert"),
            tool_timeout: Duration::from_secs(300),
            scratch_dir: None,
        }
    }
}

pub trait CapabilityProbe {
    fn available(&self, capability: Capability) -> bool;
}

/// Answers from compiled-in features and the `PATH`.
#[derive(Debug, Clone)]
pub struct EnvironmentProbe {
    external_tool: PathBuf,
}

impl EnvironmentProbe {
    pub fn new(settings: &HandlerSettings) -> Self {
        Self {
            external_tool: settings.external_tool.clone(),
        }
    }
}

impl CapabilityProbe for EnvironmentProbe {
    fn available(&self, capability: Capability) -> bool {
        match capability {
            Capability::Markup => true,
            Capability::Office => cfg!(feature = "office"),
            Capability::Pdf => cfg!(feature = "pdf"),
            Capability::ExternalTool => which::which(&self.external_tool).is_ok(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("baseline capability unavailable: {0}")]
    MissingBaseline(Capability),
}

/// Extension -> handler lookup built once per process.
#[derive(Clone)]
pub struct Registry {
    handlers: BTreeMap<String, (FormatTag, Arc<dyn FormatHandler>)>,
    unavailable: Vec<(FormatTag, Capability)>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("extensions", &self.handlers.keys().collect::<Vec<_>>())
            .field("unavailable", &self.unavailable)
            .finish()
    }
}

impl Registry {
    pub fn build(
        probe: &dyn CapabilityProbe,
        settings: &HandlerSettings,
    ) -> Result<Self, RegistryError> {
        if !probe.available(Capability::Markup) {
            return Err(RegistryError::MissingBaseline(Capability::Markup));
        }
        let mut registry = Registry::empty();
        for spec in FORMAT_TABLE {
            if !probe.available(spec.capability) {
                engine_info!(
                    "{} files will be copied as-is: {} is unavailable",
                    spec.tag,
                    spec.capability
                );
                registry.unavailable.push((spec.tag, spec.capability));
                continue;
            }
            match handler_for(spec.tag, settings) {
                Some(handler) => {
                    for ext in spec.extensions {
                        registry.insert(ext, spec.tag, handler.clone());
                    }
                }
                None => registry.unavailable.push((spec.tag, spec.capability)),
            }
        }
        engine_debug!("{registry:?}");
        Ok(registry)
    }

    pub fn empty() -> Self {
        Self {
            handlers: BTreeMap::new(),
            unavailable: Vec::new(),
        }
    }

    /// Registers `handler` for `extension`, replacing any previous entry.
    pub fn insert(&mut self, extension: &str, tag: FormatTag, handler: Arc<dyn FormatHandler>) {
        self.handlers
            .insert(normalize_extension(extension), (tag, handler));
    }

    pub fn lookup(&self, extension: &str) -> Option<(FormatTag, &dyn FormatHandler)> {
        self.handlers
            .get(&normalize_extension(extension))
            .map(|(tag, handler)| (*tag, handler.as_ref()))
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Formats left out because their capability was missing.
    pub fn unavailable(&self) -> &[(FormatTag, Capability)] {
        &self.unavailable
    }
}

fn handler_for(tag: FormatTag, settings: &HandlerSettings) -> Option<Arc<dyn FormatHandler>> {
    match tag {
        FormatTag::Epub => Some(Arc::new(ArchiveHandler::default())),
        #[cfg(feature = "office")]
        FormatTag::Docx => Some(Arc::new(crate::office::OfficeHandler)),
        #[cfg(feature = "pdf")]
        FormatTag::Pdf => Some(Arc::new(crate::pdf::PdfHandler)),
        FormatTag::Mobi => Some(Arc::new(
            ExternalToolHandler::new(settings.external_tool.clone(), settings.tool_timeout)
                .with_scratch_dir(settings.scratch_dir.clone()),
        )),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}
