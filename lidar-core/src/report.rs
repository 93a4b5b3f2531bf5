//! User-facing failure messages bound to the operation that raised them.
use std::fmt::Display;

pub const SAVE_SELECTION: &str = "Save Selection...";
pub const LOAD_PRIMITIVES: &str = "Load Primitives...";
pub const SAVE_PRIMITIVES: &str = "Save Primitives...";
pub const EXTRACT_PRIMITIVE: &str = "Extract Primitive...";
pub const INTERSECT_PRIMITIVES: &str = "Intersect Primitives...";

/// Prefix `detail` with the name of the operation, e.g. `"Load Primitives...: bad header"`.
pub fn user_error(operation: &str, detail: impl Display) -> String {
    format!("{operation}: {detail}")
}
