use anyhow::Result;
use tracing::{info, subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::FmtSubscriber;

pub fn init_tracing(level: LevelFilter) -> Result<()> {
    if level == LevelFilter::OFF {
        return Ok(());
    }

    let is_terminal = std::io::IsTerminal::is_terminal(&std::io::stderr());
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(format!("vtl={level},http=warn"))
        .with_writer(std::io::stderr)
        .with_ansi(is_terminal)
        .finish();

    subscriber::set_global_default(subscriber)?;
    info!("Initialized tracing with level: {}", level);

    Ok(())
}
