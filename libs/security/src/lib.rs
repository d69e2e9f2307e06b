pub mod cipher;
pub mod file_ref;
pub mod state;
pub mod verify;

pub use cipher::{CipherError, TokenCipher};
pub use file_ref::{FileRefError, FileReference};
pub use state::{OAuthState, StateTokenError};
pub use verify::{VerifyFailure, constant_time_eq, verify_secret};
