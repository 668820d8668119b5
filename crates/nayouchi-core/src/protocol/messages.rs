//! Typed request, reply and push payloads
//!
//! Every address on the backend's message surface has an explicit record here.
//! Field names follow the backend's JSON keys (`usr`, `grp`, ...).

use core::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{NayouchiError, Result};
use crate::types::{GroupId, Name, ParticipantId};

// ----------------------------------------------------------------------------
// Addresses
// ----------------------------------------------------------------------------

/// Backend address of a point-to-point message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    List,
    Enter,
    Create,
    Resign,
    ProposeName,
    RemoveName,
    AddMember,
    SetUserName,
    Upgrade,
    Signup,
}

impl Address {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Address::List => "list",
            Address::Enter => "enter",
            Address::Create => "create",
            Address::Resign => "resign",
            Address::ProposeName => "proposeName",
            Address::RemoveName => "removeName",
            Address::AddMember => "addMember",
            Address::SetUserName => "setUserName",
            Address::Upgrade => "upgrade",
            Address::Signup => "signup",
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------------------------------------------------------
// Topics
// ----------------------------------------------------------------------------

/// Name of a push topic scoped to one group
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    const GROUP_PREFIX: &'static str = "grp-";

    pub fn new<T: Into<String>>(name: T) -> Self {
        Self(name.into())
    }

    /// Topic on which the backend signals changes of `group`
    pub fn for_group(group: &GroupId) -> Self {
        Self(format!("{}{}", Self::GROUP_PREFIX, group))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ----------------------------------------------------------------------------
// Request Payloads
// ----------------------------------------------------------------------------

/// `list`: groups the participant belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRequest {
    #[serde(rename = "usr")]
    pub participant: ParticipantId,
}

/// `enter` and `resign`: one participant and one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRequest {
    #[serde(rename = "usr")]
    pub participant: ParticipantId,
    #[serde(rename = "grp")]
    pub group: GroupId,
}

/// `create`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub name: String,
    #[serde(rename = "usr")]
    pub participant: ParticipantId,
}

/// `proposeName` and `removeName`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NominationRequest {
    #[serde(rename = "grp")]
    pub group: GroupId,
    #[serde(rename = "usr")]
    pub participant: ParticipantId,
    pub name: Name,
}

/// `addMember`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMemberRequest {
    #[serde(rename = "usr")]
    pub participant: ParticipantId,
    #[serde(rename = "grp")]
    pub group: GroupId,
    pub email: String,
}

/// `setUserName`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetUserNameRequest {
    #[serde(rename = "usr")]
    pub participant: ParticipantId,
    #[serde(rename = "grp")]
    pub group: GroupId,
    pub name: String,
}

/// `upgrade`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeRequest {
    #[serde(rename = "usr")]
    pub participant: ParticipantId,
    #[serde(rename = "grp")]
    pub group: GroupId,
    pub member: String,
}

/// `signup`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupRequest {
    pub email: String,
}

/// Any message the client sends to the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    List(ListRequest),
    Enter(GroupRequest),
    Create(CreateRequest),
    Resign(GroupRequest),
    ProposeName(NominationRequest),
    RemoveName(NominationRequest),
    AddMember(AddMemberRequest),
    SetUserName(SetUserNameRequest),
    Upgrade(UpgradeRequest),
    Signup(SignupRequest),
}

impl Request {
    pub fn address(&self) -> Address {
        match self {
            Request::List(_) => Address::List,
            Request::Enter(_) => Address::Enter,
            Request::Create(_) => Address::Create,
            Request::Resign(_) => Address::Resign,
            Request::ProposeName(_) => Address::ProposeName,
            Request::RemoveName(_) => Address::RemoveName,
            Request::AddMember(_) => Address::AddMember,
            Request::SetUserName(_) => Address::SetUserName,
            Request::Upgrade(_) => Address::Upgrade,
            Request::Signup(_) => Address::Signup,
        }
    }

    /// JSON body as sent on the wire
    pub fn to_body(&self) -> Result<Value> {
        let body = match self {
            Request::List(r) => serde_json::to_value(r)?,
            Request::Enter(r) | Request::Resign(r) => serde_json::to_value(r)?,
            Request::Create(r) => serde_json::to_value(r)?,
            Request::ProposeName(r) | Request::RemoveName(r) => serde_json::to_value(r)?,
            Request::AddMember(r) => serde_json::to_value(r)?,
            Request::SetUserName(r) => serde_json::to_value(r)?,
            Request::Upgrade(r) => serde_json::to_value(r)?,
            Request::Signup(r) => serde_json::to_value(r)?,
        };
        Ok(body)
    }
}

// ----------------------------------------------------------------------------
// Reply Payloads
// ----------------------------------------------------------------------------

/// Reply to `create`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateReply {
    #[serde(rename = "grp")]
    pub group: GroupId,
}

/// Whether the group survived a resignation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResignOutcome {
    Updated,
    Removed,
}

/// Reply to `resign`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResignReply {
    pub group: ResignOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckResult {
    Success,
    Error,
}

/// Generic acknowledgement (`signup`, `addMember`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub result: AckResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    /// Turn an error acknowledgement into a backend rejection
    pub fn into_result(self, address: Address) -> Result<()> {
        match self.result {
            AckResult::Success => Ok(()),
            AckResult::Error => Err(NayouchiError::rejected(
                address.as_str(),
                -1,
                self.error.unwrap_or_else(|| "unspecified error".to_string()),
            )),
        }
    }
}

// ----------------------------------------------------------------------------
// Decoding
// ----------------------------------------------------------------------------

/// Decode a reply body, accepting documents that arrive JSON-encoded in a string
pub fn decode_reply<T: DeserializeOwned>(address: Address, body: Value) -> Result<T> {
    let body = unwrap_encoded(body);
    serde_json::from_value(body)
        .map_err(|e| NayouchiError::unexpected_reply(address.as_str(), e.to_string()))
}

/// Interpret a reply as an acknowledgement
///
/// Bodies that are not shaped like an [`Ack`] count as success; only an
/// explicit `{"result":"error"}` is a rejection.
pub fn decode_ack(address: Address, body: Value) -> Result<()> {
    match serde_json::from_value::<Ack>(unwrap_encoded(body)) {
        Ok(ack) => ack.into_result(address),
        Err(_) => Ok(()),
    }
}

fn unwrap_encoded(body: Value) -> Value {
    match body {
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(inner @ (Value::Object(_) | Value::Array(_))) => inner,
            _ => Value::String(text),
        },
        other => other,
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_bodies_use_backend_keys() {
        let request = Request::ProposeName(NominationRequest {
            group: GroupId::new("g1"),
            participant: ParticipantId::new("u1"),
            name: Name::new("Smith"),
        });
        assert_eq!(request.address(), Address::ProposeName);
        assert_eq!(
            request.to_body().unwrap(),
            json!({ "grp": "g1", "usr": "u1", "name": "Smith" })
        );

        let create = Request::Create(CreateRequest {
            name: "Trip".into(),
            participant: ParticipantId::new("u1"),
        });
        assert_eq!(create.to_body().unwrap(), json!({ "name": "Trip", "usr": "u1" }));
    }

    #[test]
    fn test_group_topic_name() {
        let topic = Topic::for_group(&GroupId::new("g1"));
        assert_eq!(topic, Topic::new("grp-g1"));
        assert_eq!(topic.to_string(), "grp-g1");
        assert_eq!(Address::SetUserName.to_string(), "setUserName");
    }

    #[test]
    fn test_decode_reply_accepts_string_encoded_documents() {
        let encoded = Value::String(r#"{"group":"removed"}"#.to_string());
        let reply: ResignReply = decode_reply(Address::Resign, encoded).unwrap();
        assert_eq!(reply.group, ResignOutcome::Removed);

        let create: CreateReply =
            decode_reply(Address::Create, json!({ "update": "now", "grp": "g9" })).unwrap();
        assert_eq!(create.group, GroupId::new("g9"));
    }

    #[test]
    fn test_decode_reply_reports_shape_mismatch() {
        let err = decode_reply::<CreateReply>(Address::Create, json!([1, 2])).unwrap_err();
        assert!(matches!(err, NayouchiError::Backend(_)));
    }

    #[test]
    fn test_decode_ack() {
        assert!(decode_ack(Address::Signup, json!({ "result": "success" })).is_ok());
        assert!(decode_ack(Address::SetUserName, Value::Null).is_ok());

        let rejected = decode_ack(
            Address::Signup,
            Value::String(r#"{"result":"error","error":"smtp down"}"#.into()),
        )
        .unwrap_err();
        assert!(rejected.to_string().contains("smtp down"));
    }
}
