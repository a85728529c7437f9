use heartpoll_core::Bot;

use super::{open, CmdResult};

pub fn run() -> CmdResult {
    let (config, db) = open()?;
    let bot = Bot::new(&config, db)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(bot.run_until(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    }))?;
    Ok(())
}
