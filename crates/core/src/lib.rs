//! # FormFlash Core
//!
//! Staging area for files attached to a form that has not been submitted yet.
//!
//! This crate contains the data model and the mutation protocol:
//! - [`Ledger`]: which staged file is current and which is the pristine, pre-crop original
//! - [`FormFlash`]: the per-form façade (admit, crop, legacy view, identity, save/load)
//! - [`NamespaceResolver`]: where a session's temporary directory lives
//!
//! Bytes are handled by `flash_files`; HTTP handling, session cookies and user accounts belong
//! to the caller.

pub mod config;
pub mod constants;
pub mod error;
pub mod flash;
mod index;
pub mod ledger;
pub mod locator;
pub mod record;
pub mod user;

pub use error::{FlashError, FlashResult};
pub use flash::FormFlash;
pub use flash_types::{Basename, NonEmptyText};
pub use flash_uuid::SessionId;
pub use ledger::{original_key, FieldBucket, Ledger, LegacyFiles};
pub use locator::{NamespaceResolver, TmpNamespace};
pub use record::{CropDescriptor, IncomingUpload, LegacyUpload, UploadRecord};
pub use user::{FlashUser, User};
