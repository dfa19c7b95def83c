//! sealnote-store: the append-only, ciphertext-only notes log
//!
//! [`NotesLog`] is the storage contract. [`MemoryLog`] keeps everything in
//! process; [`ObjectLog`] persists to any OpenDAL backend built by
//! [`build_operator`].

pub mod error;
pub mod health;
pub mod log;
pub mod memory;
pub mod object;
pub mod operator;

pub use error::{ShapeError, StoreError, StoreResult};
pub use health::check_health;
pub use log::{validate_append, validate_wrapped_key, NotesLog};
pub use memory::MemoryLog;
pub use object::ObjectLog;
pub use operator::{build_operator, S3Credentials};
