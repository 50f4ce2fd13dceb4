/* 📖 # Why is the CLI minimal and hardcoded?

There are no command line arguments. Everything is configured through
`conf/settings.toml`, `conf/.secrets.toml` and `TYPEREG_*` environment variables,
resolved relative to the current directory.

1. Load settings
2. Initialize logging as configured
3. Fetch the format document and start serving
4. Serve until the process is stopped

Exit codes:
- 1: Error (invalid settings, logging setup failed, format document unavailable, port in use)
*/

use std::collections::HashMap;
use std::env;
use std::process;
use std::thread;
use std::time::Duration;

use typereg_base::tracing::{error, info, init_tracing};
use typereg_base::{PalHandle, RealPal};
use typereg_engine::{load_settings, start_service};

fn main() {
    let current_dir = env::current_dir().unwrap_or_else(|e| {
        eprintln!("Error: Failed to get current directory: {}", e);
        process::exit(1);
    });
    let pal = PalHandle::new(RealPal::new(current_dir));
    let environment: HashMap<String, String> = env::vars().collect();

    let settings = match load_settings(&*pal, &environment) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: Failed to load settings: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = init_tracing(&settings.log) {
        eprintln!("Error: Failed to initialize logging: {}", e);
        process::exit(1);
    }
    info!(?settings, "settings loaded");

    let running = match start_service(pal, &settings, env!("CARGO_PKG_VERSION")) {
        Ok(running) => running,
        Err(e) => {
            error!(error = ?e, "service failed to start");
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    while !running.handle.is_shutdown() {
        thread::sleep(Duration::from_secs(1));
    }
}
