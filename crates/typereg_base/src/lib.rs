/* 📖 # Why have typereg_base as a core library?
typereg_base provides the error type, tracing setup and the platform abstraction layer
used by the engine and the binary. Everything that touches the outside world (files,
outbound HTTP, the listening socket) lives behind the PAL so the engine can be tested
against MockPal.
*/

pub mod error;
pub mod pal;
pub mod tracing;

// Re-export commonly used types for convenience
pub use error::{ResultExt, TypeRegError, TypeRegResult};
pub use pal::{FilePath, HttpFetchResponse, MockPal, Pal, PalHandle, RealPal};
