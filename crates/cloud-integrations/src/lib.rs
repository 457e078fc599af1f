//! Cloud storage upload and whiteboard extraction clients
//!
//! Both integrations are optional: a client is only built when its
//! credentials are present, and callers treat every failure as
//! non-fatal.

pub mod dropbox;
pub mod env_file;
pub mod errors;
pub mod mural;
pub mod token;

pub use dropbox::{DropboxAccount, DropboxClient, DropboxConfig, UploadedFile};
pub use env_file::update_env_file;
pub use errors::IntegrationError;
pub use mural::{extract_to_files, MuralClient, MuralConfig, MuralExtraction, MuralReport, MuralStatus};
pub use token::TokenResponse;
