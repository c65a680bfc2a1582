use crate::{config::Config, tracing_config};

pub async fn run(config: Config) -> Result<(), eyre::Report> {
    tracing_config::configure(tracing_config::TracingConfig::from_config(&config))?;

    let server = crate::create_server(config).await?;
    let result = server.run().await;

    tracing_config::teardown();

    result?;
    Ok(())
}
