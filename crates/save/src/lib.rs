//! Versioned save files: self-describing records, a migration chain,
//! SHA-256 checksums, and write-to-temp-then-rename persistence.

pub mod format;
pub mod io;
pub mod migrate;

pub use format::{SaveFile, SAVE_FORMAT_VERSION};
pub use io::{load_from_path, save_to_path, SaveError};
