use clap::Parser;

use smaa_harness::logging;
use smaa_harness::settings::{HarnessConfig, LaunchOptions};
use smaa_harness::shell;

fn main() -> anyhow::Result<()> {
    logging::init_tracing(logging::debug_requested());

    let options = LaunchOptions::parse();
    let config = match HarnessConfig::load() {
        Ok(config) => config,
        Err(e) => {
            e.log();
            std::process::exit(e.exit_code());
        }
    };

    let code = if options.is_batch() {
        shell::headless::run(config, options)?
    } else {
        shell::window::run(config, options)?
    };
    std::process::exit(code);
}
