// Tributary common library - main library exports

pub mod hash;
pub mod messages;
pub mod types;
pub mod validation;

// Flattened re-exports
pub use self::hash::Hash;
pub use self::types::*;
pub use self::validation::{ValidationError, ValidationResult};
