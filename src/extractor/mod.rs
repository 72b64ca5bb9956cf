pub mod archive;
pub mod envelope;
pub mod pipeline;
pub mod report;

pub use archive::{detect_archive_kind, ArchiveKind, ArchiveSummary, Compression, Extractor, LibraryExtractor};
pub use envelope::{
    create_decryptor, is_envelope_encrypted, CommandDecryptor, DecryptBackend, Decryptor, OpensslDecryptor,
    DEFAULT_PASSPHRASE, ENVELOPE_MAGIC,
};
pub use pipeline::{mirror_output_dir, ModuleExtractor, ModuleReport, ModuleStatus};
pub use report::{CaseReport, CaseStatus, ConfigSnapshot, ReportWriter, RunReport, RunSummary, SuiteReport};
