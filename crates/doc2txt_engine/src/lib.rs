//! doc2txt engine: format handlers, task runner and the worker-process harness.
mod decode;
mod dispatch;
mod epub;
mod error;
mod external;
mod extract;
mod harness;
mod manifest;
#[cfg(feature = "office")]
mod office;
#[cfg(feature = "pdf")]
mod pdf;
mod persist;
mod protocol;
mod runner;
mod worker;

pub use decode::{decode_markup, DecodeError, DecodedMarkup};
pub use dispatch::{
    Capability, CapabilityProbe, EnvironmentProbe, Extraction, FormatHandler, FormatSpec,
    FormatTag, HandlerSettings, Registry, RegistryError, FORMAT_TABLE,
};
pub use epub::{convert_container, ArchiveHandler};
pub use error::ConvertError;
pub use external::{run_converter, ExternalToolHandler};
pub use extract::{join_parts, Extractor, MarkupTextExtractor, PartText, REMOVED_ELEMENTS};
pub use harness::{
    ChannelProgressSink, Harness, HarnessConfig, HarnessEvent, ProgressSink, WorkerCommand,
};
pub use manifest::{
    parse_descriptor, reading_order, resolve_part_path, ContainerArchive, ContentPart,
    ManifestEntry, PackageDescriptor, ReadingOrder, ResolvedPackage, CONTAINER_PATH,
};
#[cfg(feature = "office")]
pub use office::{docx_text, OfficeHandler};
#[cfg(feature = "pdf")]
pub use pdf::PdfHandler;
pub use persist::{
    ensure_output_dir, mirrored_path, prepare_output_root, text_relative_path, AtomicFileWriter,
    PersistError, TEXT_EXTENSION,
};
pub use protocol::{
    read_message, write_message, ProtocolError, WorkerReply, WorkerRequest, WorkerSettings,
    WORKER_FLAG,
};
pub use runner::TaskRunner;
pub use worker::{install_panic_hook, serve};
