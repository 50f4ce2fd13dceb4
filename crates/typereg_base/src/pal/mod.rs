/* 📖 # What is the Platform Abstraction Layer?

The PAL is a trait-based abstraction over files, outbound HTTP and the HTTP server.
RealPal talks to the real world (std::fs, reqwest, tiny_http); MockPal keeps
everything in memory so the cache, the refresh flow and every route can be tested
without sockets.
*/

mod file_path;
pub mod http;
pub mod mock;
pub mod real_pal;
mod traits;

pub use file_path::FilePath;
pub use http::HttpFetchResponse;
pub use mock::MockPal;
pub use real_pal::RealPal;
pub use traits::{Pal, PalHandle};
