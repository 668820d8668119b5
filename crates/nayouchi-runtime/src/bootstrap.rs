//! Account bootstrap
//!
//! `signup` runs before any participant exists: the backend mails an
//! invitation link carrying the new participant id.

use std::time::Duration;

use nayouchi_core::{
    protocol::{decode_ack, Request, SignupRequest},
    NayouchiResult, SessionError,
};
use tracing::info;

use crate::channel::Channel;

/// Request an invitation link for `email`
pub async fn signup(
    channel: &dyn Channel,
    email: &str,
    timeout: Option<Duration>,
) -> NayouchiResult<()> {
    let email = email.trim();
    if email.is_empty() {
        return Err(SessionError::EmptyName { operation: "signup" }.into());
    }

    let request = Request::Signup(SignupRequest {
        email: email.to_string(),
    });
    let address = request.address();
    let reply = channel.request(address, request.to_body()?)?.wait(timeout).await?;
    decode_ack(address, reply)?;

    info!("Signup requested for {}", email);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{MemoryChannel, MemoryReply};
    use nayouchi_core::{Address, NayouchiError};
    use serde_json::json;

    #[tokio::test]
    async fn test_signup_success_and_rejection() {
        let channel = MemoryChannel::open_with(|address, body| {
            assert_eq!(address, Address::Signup);
            if body["email"] == "ok@example.org" {
                MemoryReply::Value(json!({ "result": "success" }))
            } else {
                MemoryReply::Value(json!({ "result": "error", "error": "mail failed" }))
            }
        });

        signup(&channel, " ok@example.org ", None).await.unwrap();

        let err = signup(&channel, "bad@example.org", None).await.unwrap_err();
        assert!(matches!(err, NayouchiError::Backend(_)));

        let err = signup(&channel, "   ", None).await.unwrap_err();
        assert!(err.is_precondition());
        assert_eq!(channel.addresses().len(), 2);
    }
}
