//! Proposal safety gate: sanitizer, protection list, filename/syntax/import
//! validation and the file-size policy.  Everything here runs between the
//! coder's raw output and the applier.

mod imports;
mod protect;
mod sanitize;
mod size;
mod validate;

pub use imports::validate_relative_imports;
pub use protect::ProtectList;
pub use sanitize::{SanitizeReport, sanitize};
pub use size::{SizePolicy, check_file_size, context_hints_for, validate_update_sizes};
pub use validate::{
    ValidationError, check_python_syntax, normalize_ws, validate_code, validate_filename,
};
