/// Entry point of the Creo Collector.
///
/// Configuration is read from environment variables (see [`creo_collector::config`]);
/// `RUST_LOG` controls log verbosity.
///
/// # Examples
///
/// ```bash
/// RUST_LOG=debug DOCKER_ONLY=true cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    creo_collector::run().await
}
