//! Typed Requests
//!
//! Optional layer over the dynamic message API. A request type names its
//! discriminant and its response type once, and both sides get serde
//! encoding for free:
//!
//! ```ignore
//! #[derive(Serialize, Deserialize)]
//! struct GetUser { id: u64 }
//!
//! impl Request for GetUser {
//!     const TYPE: &'static str = "getUser";
//!     type Response = User;
//! }
//!
//! let user = messenger.request(&GetUser { id: 7 }, SendOptions::new()).await?;
//! ```
//!
//! Typed requests go through `send_message`, so caching and error envelopes
//! behave as for hand-built messages. A decoded request holds fresh nested
//! values, so its nested fields are matched against earlier requests by
//! content rather than by reference.

use crate::channel::SenderContext;
use crate::error::{BridgeError, Result};
use crate::message::{Message, TYPE_FIELD};
use crate::messenger::{Messenger, SendOptions};
use crate::resolver::ResolverMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;

/// A message type with a known discriminant and response shape
pub trait Request: Serialize + DeserializeOwned + Send + 'static {
    /// Discriminant placed in the `type` field
    const TYPE: &'static str;

    type Response: Serialize + DeserializeOwned + Send + 'static;
}

/// Encode a typed request as a bridge message.
///
/// Requests must serialize to a JSON object (or to nothing, for unit
/// structs). Any `type` field the request carries is overwritten.
pub fn encode_request<R: Request>(request: &R) -> Result<Message> {
    match serde_json::to_value(request)? {
        Value::Object(mut object) => {
            object.insert(TYPE_FIELD.to_string(), Value::from(R::TYPE));
            Message::from_value(Value::Object(object))
        }
        Value::Null => Ok(Message::new(R::TYPE)),
        other => Err(BridgeError::invalid_message(format!(
            "request {} must serialize to an object, got {}",
            R::TYPE,
            other
        ))),
    }
}

/// Decode an inbound message as `R`.
///
/// A message carrying nothing but its discriminant also decodes as a unit
/// request.
pub fn decode_request<R: Request>(message: Value) -> serde_json::Result<R> {
    let bare = message.as_object().is_some_and(|object| object.len() == 1);
    match serde_json::from_value(message) {
        Ok(request) => Ok(request),
        Err(_) if bare => serde_json::from_value(Value::Null),
        Err(err) => Err(err),
    }
}

impl Messenger {
    /// Send a typed request and decode its response
    pub async fn request<R: Request>(
        &self,
        request: &R,
        options: SendOptions,
    ) -> Result<R::Response> {
        let message = self.share_nested(encode_request(request)?);
        let response = self.send_message(&message, options).await?;
        Ok(serde_json::from_value(response)?)
    }
}

impl ResolverMap {
    /// Register a handler that receives the decoded request.
    ///
    /// A message that does not decode as `R` is answered with an error
    /// envelope describing the serde failure.
    pub fn on_typed<R, F, Fut>(self, handler: F) -> Self
    where
        R: Request,
        F: Fn(R, SenderContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R::Response>> + Send + 'static,
    {
        self.on(R::TYPE, move |message: Value, sender: SenderContext| {
            let pending = decode_request::<R>(message).map(|request| handler(request, sender));
            async move {
                let response = pending?.await?;
                Ok::<_, anyhow::Error>(serde_json::to_value(response)?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::messenger::MessengerOptions;
    use crate::resolver::InboundDispatcher;
    use crate::test_utils::ScriptedChannel;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Greet {
        name: String,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Greeting {
        text: String,
    }

    impl Request for Greet {
        const TYPE: &'static str = "greet";
        type Response = Greeting;
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Ping;

    impl Request for Ping {
        const TYPE: &'static str = "ping";
        type Response = Value;
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Query {
        ids: Vec<u64>,
    }

    impl Request for Query {
        const TYPE: &'static str = "query";
        type Response = Value;
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Bare(u32);

    impl Request for Bare {
        const TYPE: &'static str = "bare";
        type Response = Value;
    }

    #[test]
    fn test_encode_request() {
        let message = encode_request(&Greet {
            name: "Ada".to_string(),
        })
        .unwrap();
        assert_eq!(message.to_value(), json!({"type": "greet", "name": "Ada"}));

        assert_eq!(encode_request(&Ping).unwrap().to_value(), json!({"type": "ping"}));

        let err = encode_request(&Bare(3)).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidMessage { .. }));
    }

    #[tokio::test]
    async fn test_typed_round_trip() {
        let resolvers = ResolverMap::new().on_typed(|request: Greet, _sender| async move {
            Ok(Greeting {
                text: format!("hello {}", request.name),
            })
        });
        let dispatcher = Arc::new(InboundDispatcher::new(resolvers));

        let channel = ScriptedChannel::new(|_message, _route| Ok(Value::Null));
        channel.add_listener(dispatcher);

        let reply = channel
            .deliver(json!({"type": "greet", "name": "Ada"}), SenderContext::default())
            .await;
        assert_eq!(reply, Some(json!({"text": "hello Ada"})));
    }

    #[tokio::test]
    async fn test_unit_request_decodes_from_bare_message() {
        let resolvers =
            ResolverMap::new().on_typed(|_request: Ping, _sender| async move { Ok(json!("pong")) });
        let dispatcher = InboundDispatcher::new(resolvers);

        let reply = dispatcher
            .dispatch(json!({"type": "ping"}), SenderContext::default())
            .into_reply()
            .unwrap()
            .await;
        assert_eq!(reply, json!("pong"));
        assert!(decode_request::<Greet>(json!({"type": "greet"})).is_err());
    }

    #[tokio::test]
    async fn test_undecodable_request_replies_with_envelope() {
        let resolvers = ResolverMap::new().on_typed(|_request: Greet, _sender| async move {
            Ok(Greeting {
                text: String::new(),
            })
        });
        let dispatcher = InboundDispatcher::new(resolvers);

        let reply = dispatcher
            .dispatch(json!({"type": "greet", "name": 5}), SenderContext::default())
            .into_reply()
            .unwrap()
            .await;
        assert_eq!(reply["type"], "error");
        assert!(reply["message"].as_str().unwrap().contains("invalid type"));
    }

    #[tokio::test]
    async fn test_request_decodes_response() {
        let channel = Arc::new(ScriptedChannel::new(|message, _route| {
            let name = message["name"].as_str().unwrap_or_default();
            Ok(json!({"text": format!("hi {}", name)}))
        }));
        let messenger = Messenger::new(channel, MessengerOptions::default());

        let greeting = messenger
            .request(
                &Greet {
                    name: "Lin".to_string(),
                },
                SendOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            greeting,
            Greeting {
                text: "hi Lin".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_typed_requests_hit_cache() {
        let channel = Arc::new(ScriptedChannel::echo_reply("Response"));
        let messenger = Messenger::new(
            channel.clone(),
            MessengerOptions::default().with_stale_time(std::time::Duration::from_secs(60)),
        );

        for _ in 0..3 {
            messenger
                .request(&Query { ids: vec![1] }, SendOptions::new())
                .await
                .unwrap();
        }
        messenger
            .request(&Query { ids: vec![2] }, SendOptions::new())
            .await
            .unwrap();

        let stats = messenger.stats();
        assert_eq!(channel.call_count(), 2);
        assert_eq!(stats.cache_hits, 2);
        assert_eq!(stats.cache_misses, 2);
        assert_eq!(stats.interned_messages, 2);
    }

    #[tokio::test]
    async fn test_request_surfaces_decode_failure() {
        let channel = Arc::new(ScriptedChannel::new(|_message, _route| Ok(json!(17))));
        let messenger = Messenger::new(channel, MessengerOptions::default());

        let err = messenger
            .request(
                &Greet {
                    name: "Lin".to_string(),
                },
                SendOptions::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Serialization(_)));
    }
}
