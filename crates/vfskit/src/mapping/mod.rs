//! Mapping documents for [`crate::RedirectingFileSystem`].
//!
//! A mapping document declares virtual paths and the external files they
//! redirect to. See [`parser`] for the accepted keys.
//!
//! ```yaml
//! version: 0
//! case-sensitive: false
//! roots:
//!   - type: directory
//!     name: /virtual/include
//!     contents:
//!       - type: file
//!         name: config.h
//!         external-contents: /build/generated/config.h
//! ```

pub mod entry;
pub mod node;
pub mod parser;
pub mod writer;

use std::fmt;

pub use entry::{Entry, NameKind};
pub use node::Node;
pub use parser::{MappingOptions, MappingParser, ParsedMapping};
pub use writer::MappingWriter;

/// One problem found in a mapping document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Logical position of the offending node, e.g. `roots[0].contents[1].name`.
    /// Empty for the document itself.
    pub location: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.location.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.location, self.message)
        }
    }
}
