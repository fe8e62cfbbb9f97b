use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use visionflow::{config, InferenceClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = config::get_configuration().expect("failed to load config");
    let log_level = settings.log_level.as_str();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().json().with_level(true))
        .init();

    let image_path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: visionflow <image path or url>"))?;

    let client = InferenceClient::new(settings.client.client_config()?);
    let result = client.predict(&image_path, None).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
