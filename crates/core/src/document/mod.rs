//! Business documents: the recorders whose postings feed the register.

pub mod capability;
pub mod types;

pub use capability::{PostingContext, Postable, Validatable, VersionLocked};
pub use types::{
    Counterparty, Document, DocumentDraft, DocumentKind, DocumentLine, DocumentStatus,
};
