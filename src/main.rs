use broadside::ServerBuilder;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("broadside=debug".parse()?),
        )
        .init();

    let mut server = ServerBuilder::new().bind()?;
    server.run()?;

    Ok(())
}
