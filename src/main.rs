use plog::{run_app, AppConfig, AppContext};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            log::error!("Invalid configuration: {:#}", error);
            std::process::exit(1);
        }
    };
    let address = config.bind_address;
    let ctx = match AppContext::init(config).await {
        Ok(ctx) => ctx,
        Err(error) => {
            log::error!("Could not open the store: {:#}", error);
            std::process::exit(1);
        }
    };
    match run_app(ctx, address).await {
        Ok(_) => (),
        Err(error) => log::error!("Error: {:#}", error),
    }
}
