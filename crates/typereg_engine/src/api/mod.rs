/* 📖 # Why an API module in typereg_engine?

The api module turns the format cache into HTTP endpoints. ApiService implements the
HttpService trait from typereg_base, so the same service runs behind RealPal in
production and behind MockPal in tests.
*/

mod service;

pub use service::{ApiService, ServiceInfo};
