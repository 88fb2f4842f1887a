use color_eyre::eyre::Result;
use lottery_client::config::{
    self,
    CliCommand,
};

mod client;
mod ui;

fn print_usage_and_exit() -> ! {
    println!("{}", config::usage());
    std::process::exit(0);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let app_config = match config::parse_cli_args(std::env::args().skip(1))? {
        CliCommand::Help => print_usage_and_exit(),
        CliCommand::Run(app_config) => app_config,
    };
    let _log_guard = client::init_tracing(&app_config.log_dir)?;
    tracing::info!("starting lottery client");
    client::run_app(app_config).await
}
