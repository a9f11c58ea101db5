use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::models::domain::{Filter, Profile};

/// Frame sent by a participant over the signaling socket
///
/// Frames are JSON objects tagged by `event`. The names used by the first
/// web client (`find-stranger`, `ice-candidate`, ...) are still accepted.
///
/// ```json
/// { "event": "find", "profile": { "gender": "male", "country": "US" }, "filter": { "country": "all" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    #[serde(alias = "user-ready")]
    Ready { profile: Profile },

    #[serde(alias = "find-stranger")]
    Find {
        #[serde(default)]
        profile: Profile,
        #[serde(default)]
        filter: Option<Filter>,
    },

    #[serde(alias = "next-stranger")]
    Next,

    #[serde(alias = "stop-chatting")]
    Stop,

    #[serde(alias = "offer")]
    NegotiationOffer { payload: Value },

    #[serde(alias = "answer")]
    NegotiationAnswer { payload: Value },

    #[serde(alias = "ice-candidate")]
    NetworkCandidate { payload: Value },

    #[serde(alias = "message")]
    ChatMessage { text: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_with_and_without_filter() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"event":"find","profile":{"gender":"male","country":"US"},"filter":{"gender":"female","country":"all"}}"#,
        )
        .unwrap();

        match event {
            ClientEvent::Find { profile, filter } => {
                assert_eq!(profile.gender.as_deref(), Some("male"));
                assert_eq!(filter.unwrap().gender.as_deref(), Some("female"));
            }
            other => panic!("unexpected event {:?}", other),
        }

        let event: ClientEvent =
            serde_json::from_str(r#"{"event":"find","profile":{"country":"FR"}}"#).unwrap();
        assert!(matches!(event, ClientEvent::Find { filter: None, .. }));
    }

    #[test]
    fn test_legacy_event_names() {
        let next: ClientEvent = serde_json::from_str(r#"{"event":"next-stranger"}"#).unwrap();
        assert_eq!(next, ClientEvent::Next);

        let stop: ClientEvent = serde_json::from_str(r#"{"event":"stop-chatting"}"#).unwrap();
        assert_eq!(stop, ClientEvent::Stop);

        let candidate: ClientEvent =
            serde_json::from_str(r#"{"event":"ice-candidate","payload":{"candidate":"a=1"}}"#)
                .unwrap();
        assert!(matches!(candidate, ClientEvent::NetworkCandidate { .. }));

        let chat: ClientEvent =
            serde_json::from_str(r#"{"event":"message","text":"hi"}"#).unwrap();
        assert_eq!(chat, ClientEvent::ChatMessage { text: "hi".to_string() });
    }

    #[test]
    fn test_unknown_event_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"event":"subscribe"}"#).is_err());
        assert!(serde_json::from_str::<ClientEvent>(r#"{"profile":{}}"#).is_err());
    }
}
