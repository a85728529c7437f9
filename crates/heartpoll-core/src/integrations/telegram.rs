//! Telegram Bot API adapter: long polling for inbound votes and posting
//! announcements to the broadcast channel.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::BroadcastError;
use crate::events::{Inbound, VoteEvent};
use crate::integrations::traits::{BroadcastFuture, Broadcaster};
use crate::vote::{Polarity, SubjectSet, VoterId};

const CALLBACK_PREFIX: &str = "vote_";

/// Bot API limit on inline-button callback data.
pub const MAX_CALLBACK_DATA_BYTES: usize = 64;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub date: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

/// Callback data carried by a vote button.
pub fn vote_callback_data(subject: &str, polarity: Polarity) -> String {
    format!("{CALLBACK_PREFIX}{subject}_{}", polarity.as_str())
}

/// Split `vote_<subject>_<polarity>` into its raw tokens.
pub fn parse_vote_callback(data: &str) -> Option<(&str, &str)> {
    data.strip_prefix(CALLBACK_PREFIX)?.rsplit_once('_')
}

/// Reply keyboard with one button per subject.
pub fn subject_keyboard(subjects: &SubjectSet) -> Value {
    let rows: Vec<Value> = subjects
        .iter()
        .map(|s| json!([{ "text": s.name() }]))
        .collect();
    json!({ "keyboard": rows, "resize_keyboard": true })
}

/// Inline keyboard with the two vote buttons for `subject`.
pub fn vote_keyboard(subject: &str) -> Value {
    json!({
        "inline_keyboard": [[
            {
                "text": format!("{} Yes", Polarity::Positive.emoji()),
                "callback_data": vote_callback_data(subject, Polarity::Positive),
            },
            {
                "text": format!("{} No", Polarity::Negative.emoji()),
                "callback_data": vote_callback_data(subject, Polarity::Negative),
            }
        ]]
    })
}

impl Inbound {
    /// Decode a raw update. Vote callbacks are decoded without validating the
    /// subject or polarity; intake does that.
    pub fn from_update(update: &Update, subjects: &SubjectSet) -> Inbound {
        if let Some(cb) = &update.callback_query {
            let Some((subject, polarity)) = cb.data.as_deref().and_then(parse_vote_callback)
            else {
                return Inbound::UnknownCallback {
                    callback_id: cb.id.clone(),
                };
            };
            return Inbound::Vote {
                callback_id: cb.id.clone(),
                chat_id: cb.message.as_ref().map(|m| m.chat.id),
                message_id: cb.message.as_ref().map(|m| m.message_id),
                event: VoteEvent {
                    voter_id: VoterId(cb.from.id),
                    subject: subject.to_string(),
                    polarity: polarity.to_string(),
                    received_at: chrono::Utc::now(),
                },
            };
        }

        let Some(msg) = &update.message else {
            return Inbound::Ignored;
        };
        let Some(text) = msg.text.as_deref().map(str::trim) else {
            return Inbound::Ignored;
        };
        if text == "/start" || text.starts_with("/start ") || text.starts_with("/start@") {
            return Inbound::Start {
                chat_id: msg.chat.id,
            };
        }
        match subjects.resolve(text) {
            Some(subject) => Inbound::SubjectChosen {
                chat_id: msg.chat.id,
                subject: subject.name().to_string(),
            },
            None => Inbound::Ignored,
        }
    }
}

/// Thin Bot API client.
pub struct TelegramClient {
    client: Client,
    endpoint: String,
}

impl TelegramClient {
    /// `api_base` is usually `https://api.telegram.org`.
    pub fn new(api_base: &str, token: &str) -> Result<Self, BroadcastError> {
        if token.is_empty() {
            return Err(BroadcastError::NotConfigured);
        }
        let client = Client::builder().timeout(Duration::from_secs(90)).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T, BroadcastError> {
        let resp = self
            .client
            .post(format!("{}/{}", self.endpoint, method))
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        let parsed: ApiResponse<T> = resp.json().await.map_err(|e| {
            if status.is_success() {
                BroadcastError::Http(e)
            } else {
                BroadcastError::Api {
                    method: method.to_string(),
                    description: format!("HTTP {status}"),
                }
            }
        })?;

        match (parsed.ok, parsed.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(BroadcastError::Api {
                method: method.to_string(),
                description: parsed
                    .description
                    .unwrap_or_else(|| format!("HTTP {status}")),
            }),
        }
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<Value>,
    ) -> Result<Message, BroadcastError> {
        let mut body = json!({ "chat_id": chat_id, "text": text, "parse_mode": "HTML" });
        if let Some(markup) = reply_markup {
            body["reply_markup"] = markup;
        }
        self.call("sendMessage", &body).await
    }

    pub async fn send_photo_message(
        &self,
        chat_id: i64,
        photo: &str,
        caption: &str,
    ) -> Result<Message, BroadcastError> {
        let body = json!({
            "chat_id": chat_id,
            "photo": photo,
            "caption": caption,
            "parse_mode": "HTML",
        });
        self.call("sendPhoto", &body).await
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, BroadcastError> {
        let body = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        self.call("getUpdates", &body).await
    }

    pub async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: &str,
        show_alert: bool,
    ) -> Result<(), BroadcastError> {
        let body = json!({
            "callback_query_id": callback_id,
            "text": text,
            "show_alert": show_alert,
        });
        self.call::<bool>("answerCallbackQuery", &body).await.map(|_| ())
    }

    /// Remove the inline vote buttons from a message once used.
    pub async fn clear_inline_keyboard(&self, chat_id: i64, message_id: i64) -> Result<(), BroadcastError> {
        let body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "reply_markup": { "inline_keyboard": [] },
        });
        self.call::<Value>("editMessageReplyMarkup", &body).await.map(|_| ())
    }
}

impl Broadcaster for TelegramClient {
    fn name(&self) -> &str {
        "telegram"
    }

    fn send_text<'a>(&'a self, channel_id: i64, text: &'a str) -> BroadcastFuture<'a> {
        Box::pin(async move { self.send_message(channel_id, text, None).await.map(|_| ()) })
    }

    fn send_photo<'a>(
        &'a self,
        channel_id: i64,
        asset: &'a str,
        caption: &'a str,
    ) -> BroadcastFuture<'a> {
        Box::pin(async move {
            self.send_photo_message(channel_id, asset, caption)
                .await
                .map(|_| ())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn subjects() -> SubjectSet {
        SubjectSet::new(["Alen", "Katya", "Kuzya"]).unwrap()
    }

    fn update(json: Value) -> Update {
        serde_json::from_value(json).unwrap()
    }

    const OK_MESSAGE: &str =
        r#"{"ok":true,"result":{"message_id":9,"chat":{"id":-100},"date":0}}"#;

    #[test]
    fn callback_data_roundtrip() {
        let data = vote_callback_data("Katya", Polarity::Negative);
        assert_eq!(data, "vote_Katya_negative");
        assert_eq!(parse_vote_callback(&data), Some(("Katya", "negative")));
        assert_eq!(parse_vote_callback("vote_Alen_❤️"), Some(("Alen", "❤️")));
        assert_eq!(parse_vote_callback("other"), None);
    }

    #[test]
    fn decodes_start_and_subject_messages() {
        let start = update(json!({
            "update_id": 1,
            "message": {"message_id": 1, "chat": {"id": 5}, "text": "/start", "date": 0}
        }));
        assert_eq!(Inbound::from_update(&start, &subjects()), Inbound::Start { chat_id: 5 });

        let chosen = update(json!({
            "update_id": 2,
            "message": {"message_id": 2, "chat": {"id": 5}, "text": "Kuzya", "date": 0}
        }));
        assert_eq!(
            Inbound::from_update(&chosen, &subjects()),
            Inbound::SubjectChosen {
                chat_id: 5,
                subject: "Kuzya".into()
            }
        );

        let other = update(json!({
            "update_id": 3,
            "message": {"message_id": 3, "chat": {"id": 5}, "text": "hello", "date": 0}
        }));
        assert_eq!(Inbound::from_update(&other, &subjects()), Inbound::Ignored);
    }

    #[test]
    fn decodes_vote_callback_without_validating() {
        let cb = update(json!({
            "update_id": 4,
            "callback_query": {
                "id": "cb1",
                "from": {"id": 77},
                "message": {"message_id": 12, "chat": {"id": 5}, "date": 0},
                "data": "vote_Zzz_positive"
            }
        }));
        let Inbound::Vote {
            callback_id,
            chat_id,
            message_id,
            event,
        } = Inbound::from_update(&cb, &subjects())
        else {
            panic!("expected vote");
        };
        assert_eq!(callback_id, "cb1");
        assert_eq!(chat_id, Some(5));
        assert_eq!(message_id, Some(12));
        assert_eq!(event.voter_id, VoterId(77));
        assert_eq!(event.subject, "Zzz");
        assert_eq!(event.polarity, "positive");
    }

    #[test]
    fn non_vote_callback_is_unknown() {
        let cb = update(json!({
            "update_id": 5,
            "callback_query": {"id": "cb2", "from": {"id": 1}, "data": "noop"}
        }));
        assert_eq!(
            Inbound::from_update(&cb, &subjects()),
            Inbound::UnknownCallback {
                callback_id: "cb2".into()
            }
        );
    }

    #[test]
    fn vote_keyboard_carries_both_polarities() {
        let kb = vote_keyboard("Alen");
        let buttons = kb["inline_keyboard"][0].as_array().unwrap();
        assert_eq!(buttons.len(), 2);
        assert_eq!(buttons[0]["callback_data"], "vote_Alen_positive");
        assert_eq!(buttons[1]["callback_data"], "vote_Alen_negative");
        assert_eq!(subject_keyboard(&subjects())["keyboard"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn empty_token_is_not_configured() {
        assert!(matches!(
            TelegramClient::new("https://api.telegram.org", ""),
            Err(BroadcastError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn send_text_posts_html_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTOKEN/sendMessage")
            .match_body(Matcher::PartialJson(json!({
                "chat_id": -100,
                "text": "hello",
                "parse_mode": "HTML"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(OK_MESSAGE)
            .create_async()
            .await;

        let client = TelegramClient::new(&server.url(), "TOKEN").unwrap();
        client.send_text(-100, "hello").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn api_error_surfaces_description() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/botTOKEN/sendPhoto")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":false,"error_code":400,"description":"Bad Request: wrong file"}"#)
            .create_async()
            .await;

        let client = TelegramClient::new(&server.url(), "TOKEN").unwrap();
        let err = client.send_photo(-100, "nope", "cap").await.unwrap_err();
        match err {
            BroadcastError::Api {
                method,
                description,
            } => {
                assert_eq!(method, "sendPhoto");
                assert!(description.contains("wrong file"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn get_updates_decodes_batch() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/botTOKEN/getUpdates")
            .match_body(Matcher::PartialJson(json!({"offset": 10})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"ok":true,"result":[
                    {"update_id":10,"message":{"message_id":1,"chat":{"id":3},"text":"/start","date":0}},
                    {"update_id":11,"callback_query":{"id":"c","from":{"id":4},"data":"vote_Alen_negative"}}
                ]}"#,
            )
            .create_async()
            .await;

        let client = TelegramClient::new(&server.url(), "TOKEN").unwrap();
        let updates = client.get_updates(10, 0).await.unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1].update_id, 11);
        assert!(updates[1].callback_query.is_some());
    }
}
