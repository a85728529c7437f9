//! Long-polling bot runner: inbound chat updates on one task, the rollover
//! scheduler on another.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::announce::dispatch;
use crate::error::BroadcastError;
use crate::events::Inbound;
use crate::integrations::telegram::{subject_keyboard, vote_keyboard, Update};
use crate::integrations::TelegramClient;
use crate::pipeline::Pipeline;
use crate::scheduler::Scheduler;
use crate::storage::{Config, VoteStore};
use crate::vote::IntakeOutcome;

/// Pause after a failed `getUpdates` before polling again.
const POLL_BACKOFF: Duration = Duration::from_secs(5);

pub struct Bot {
    client: Arc<TelegramClient>,
    pipeline: Pipeline,
    scheduler: Scheduler,
    channel_id: i64,
    poll_timeout_secs: u64,
    tick: Duration,
}

impl Bot {
    /// Build every component from `config`.
    ///
    /// # Errors
    /// A missing bot token is fatal, as is any invalid config value.
    pub fn new(config: &Config, store: Arc<dyn VoteStore>) -> crate::Result<Self> {
        let token = config.require_token()?;
        let client = Arc::new(TelegramClient::new(&config.bot.api_base, token)?);
        let pipeline = Pipeline::new(store, config)?;
        let scheduler = pipeline.scheduler(config, client.clone(), config.bot.channel_id)?;
        Ok(Self {
            client,
            pipeline,
            scheduler,
            channel_id: config.bot.channel_id,
            poll_timeout_secs: config.bot.poll_timeout_secs,
            tick: Duration::from_secs(config.schedule.tick_secs),
        })
    }

    /// Run until `shutdown` resolves.
    pub async fn run_until<S>(self, shutdown: S) -> crate::Result<()>
    where
        S: Future<Output = ()>,
    {
        let Bot {
            client,
            pipeline,
            scheduler,
            channel_id,
            poll_timeout_secs,
            tick,
        } = self;

        match pipeline.startup_sweep(Utc::now()) {
            Ok(announcements) => {
                dispatch(client.clone(), channel_id, announcements);
            }
            Err(e) => tracing::error!("startup threshold sweep failed: {e}"),
        }

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let scheduler_task = tokio::spawn(scheduler.run_until(tick, async {
            let _ = stop_rx.await;
        }));

        let handler = Handler {
            client: client.clone(),
            pipeline,
            channel_id,
        };
        let mut offset = 0i64;
        tokio::pin!(shutdown);
        tracing::info!(channel_id, "bot polling for updates");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                res = client.get_updates(offset, poll_timeout_secs) => match res {
                    Ok(updates) => {
                        for update in updates {
                            offset = offset.max(update.update_id + 1);
                            if let Err(e) = handler.handle(&update).await {
                                tracing::warn!(update_id = update.update_id, "failed to answer update: {e}");
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!("getUpdates failed: {e}");
                        tokio::time::sleep(POLL_BACKOFF).await;
                    }
                }
            }
        }

        tracing::info!("shutting down");
        let _ = stop_tx.send(());
        if let Err(e) = scheduler_task.await {
            tracing::error!("scheduler task ended abnormally: {e}");
        }
        Ok(())
    }
}

/// Reacts to one decoded update.
struct Handler {
    client: Arc<TelegramClient>,
    pipeline: Pipeline,
    channel_id: i64,
}

impl Handler {
    async fn handle(&self, update: &Update) -> Result<(), BroadcastError> {
        let subjects = self.pipeline.intake().subjects();
        match Inbound::from_update(update, subjects) {
            Inbound::Start { chat_id } => {
                self.client
                    .send_message(chat_id, "Who do you want to vote for?", Some(subject_keyboard(subjects)))
                    .await?;
            }
            Inbound::SubjectChosen { chat_id, subject } => {
                let prompt = format!("How do you feel about {subject} today?");
                self.client
                    .send_message(chat_id, &prompt, Some(vote_keyboard(&subject)))
                    .await?;
            }
            Inbound::Vote {
                callback_id,
                chat_id,
                message_id,
                event,
            } => {
                let (reply, accepted) = match self.pipeline.intake().submit(&event) {
                    Ok(IntakeOutcome::Accepted { vote, announcements }) => {
                        dispatch(self.client.clone(), self.channel_id, announcements);
                        ("Vote counted".to_string(), Some(vote))
                    }
                    Ok(IntakeOutcome::Rejected { remaining_secs }) => (
                        format!("Wait {remaining_secs} seconds before voting again"),
                        None,
                    ),
                    Ok(IntakeOutcome::Ignored { .. }) => ("Unknown vote".to_string(), None),
                    Err(e) => {
                        tracing::error!(voter = %event.voter_id, "vote could not be stored: {e}");
                        ("Vote not recorded, please try again later".to_string(), None)
                    }
                };
                self.client
                    .answer_callback_query(&callback_id, &reply, false)
                    .await?;
                if let (Some(vote), Some(chat_id)) = (accepted, chat_id) {
                    if let Some(message_id) = message_id {
                        self.client.clear_inline_keyboard(chat_id, message_id).await?;
                    }
                    let confirmation = format!(
                        "You voted for <b>{}</b> → {}",
                        vote.subject,
                        vote.polarity.emoji()
                    );
                    self.client.send_message(chat_id, &confirmation, None).await?;
                }
            }
            Inbound::UnknownCallback { callback_id } => {
                tracing::warn!(%callback_id, "ignoring unknown callback");
                self.client.answer_callback_query(&callback_id, "", false).await?;
            }
            Inbound::Ignored => {
                tracing::debug!(update_id = update.update_id, "ignoring update");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use mockito::Matcher;
    use serde_json::json;

    const OK_TRUE: &str = r#"{"ok":true,"result":true}"#;
    const OK_MESSAGE: &str = r#"{"ok":true,"result":{"message_id":1,"chat":{"id":9},"date":0}}"#;

    fn handler(api_base: &str, db: Arc<Database>) -> Handler {
        let mut config = Config::default();
        config.bot.api_base = api_base.to_string();
        config.bot.token = "T".into();
        Handler {
            client: Arc::new(TelegramClient::new(api_base, "T").unwrap()),
            pipeline: Pipeline::new(db, &config).unwrap(),
            channel_id: -100,
        }
    }

    fn vote_update(update_id: i64, voter: i64, data: &str) -> Update {
        serde_json::from_value(json!({
            "update_id": update_id,
            "callback_query": {
                "id": format!("cb{update_id}"),
                "from": {"id": voter},
                "message": {"message_id": 50, "chat": {"id": 9}, "date": 0},
                "data": data
            }
        }))
        .unwrap()
    }

    #[test]
    fn missing_token_is_fatal() {
        let db = Arc::new(Database::open_memory().unwrap());
        assert!(Bot::new(&Config::default(), db).is_err());
    }

    #[tokio::test]
    async fn accepted_vote_is_acknowledged_and_keyboard_cleared() {
        let mut server = mockito::Server::new_async().await;
        let answer = server
            .mock("POST", "/botT/answerCallbackQuery")
            .match_body(Matcher::PartialJson(json!({"text": "Vote counted"})))
            .with_body(OK_TRUE)
            .create_async()
            .await;
        let clear = server
            .mock("POST", "/botT/editMessageReplyMarkup")
            .match_body(Matcher::PartialJson(json!({"chat_id": 9, "message_id": 50})))
            .with_body(OK_TRUE)
            .create_async()
            .await;
        let confirm = server
            .mock("POST", "/botT/sendMessage")
            .match_body(Matcher::PartialJson(json!({
                "chat_id": 9,
                "text": "You voted for <b>Alen</b> → ❤️"
            })))
            .with_body(OK_MESSAGE)
            .create_async()
            .await;

        let db = Arc::new(Database::open_memory().unwrap());
        let handler = handler(&server.url(), db.clone());
        handler
            .handle(&vote_update(1, 7, "vote_Alen_positive"))
            .await
            .unwrap();

        answer.assert_async().await;
        clear.assert_async().await;
        confirm.assert_async().await;
        assert_eq!(db.vote_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn second_vote_inside_cooldown_gets_wait_reply() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("POST", Matcher::Any)
            .with_body(OK_TRUE)
            .create_async()
            .await;
        let confirm = server
            .mock("POST", "/botT/sendMessage")
            .with_body(OK_MESSAGE)
            .expect(1)
            .create_async()
            .await;
        let wait = server
            .mock("POST", "/botT/answerCallbackQuery")
            .match_body(Matcher::Regex("Wait \\d+ seconds before voting again".into()))
            .with_body(OK_TRUE)
            .create_async()
            .await;

        let db = Arc::new(Database::open_memory().unwrap());
        let handler = handler(&server.url(), db.clone());
        handler.handle(&vote_update(1, 7, "vote_Alen_positive")).await.unwrap();
        handler.handle(&vote_update(2, 7, "vote_Katya_negative")).await.unwrap();

        wait.assert_async().await;
        confirm.assert_async().await;
        assert_eq!(db.vote_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn start_replies_with_subject_keyboard() {
        let mut server = mockito::Server::new_async().await;
        let send = server
            .mock("POST", "/botT/sendMessage")
            .match_body(Matcher::PartialJson(json!({
                "chat_id": 9,
                "reply_markup": {"keyboard": [[{"text": "Alen"}], [{"text": "Katya"}], [{"text": "Kuzya"}]]}
            })))
            .with_body(OK_MESSAGE)
            .create_async()
            .await;

        let db = Arc::new(Database::open_memory().unwrap());
        let handler = handler(&server.url(), db);
        let update: Update = serde_json::from_value(json!({
            "update_id": 3,
            "message": {"message_id": 4, "chat": {"id": 9}, "text": "/start", "date": 0}
        }))
        .unwrap();
        handler.handle(&update).await.unwrap();
        send.assert_async().await;
    }
}
