//! Slack Web API directory provider.
//!
//! Membership of a channel is read with `conversations.members` (cursor paginated) and each
//! member is resolved to an email with `users.info`. Bots, deleted accounts and users without
//! a visible email are skipped.

use async_trait::async_trait;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;

use super::{DirectoryError, DirectoryProvider};

const DEFAULT_API_BASE: &str = "https://slack.com/api";
const PAGE_SIZE: &str = "200";

/// Directory backed by a Slack workspace.
#[derive(Clone)]
pub struct SlackDirectory {
    client: reqwest::Client,
    token: String,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    body: Option<T>,
}

#[derive(Debug, Deserialize)]
struct MembersPage {
    #[serde(default)]
    members: Vec<String>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    user: SlackUser,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    id: String,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    profile: SlackProfile,
}

#[derive(Debug, Default, Deserialize)]
struct SlackProfile {
    #[serde(default)]
    email: Option<String>,
}

impl SlackDirectory {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Point the client at a different Web API root (proxies, test servers).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, &str)],
    ) -> Result<T, DirectoryError> {
        let url = format!("{}/{}", self.api_base, method);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable(format!("{} failed: {}", method, e)))?;

        let status = resp.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(DirectoryError::Unavailable(format!(
                "{} returned {}",
                method, status
            )));
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(DirectoryError::Unauthorized(format!(
                "{} returned {}",
                method, status
            )));
        }

        let envelope: Envelope<T> = resp.json().await.map_err(|e| {
            DirectoryError::InvalidResponse(format!("{} response parse failed: {}", method, e))
        })?;

        if !envelope.ok {
            return Err(map_api_error(envelope.error.as_deref().unwrap_or("unknown_error")));
        }
        envelope
            .body
            .ok_or_else(|| DirectoryError::InvalidResponse(format!("{} returned no body", method)))
    }

    async fn member_ids(&self, channel: &str) -> Result<Vec<String>, DirectoryError> {
        let mut ids = Vec::new();
        let mut cursor = String::new();
        loop {
            let mut query = vec![("channel", channel), ("limit", PAGE_SIZE)];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.as_str()));
            }
            let page: MembersPage = self.call("conversations.members", &query).await?;
            ids.extend(page.members);

            cursor = page
                .response_metadata
                .map(|m| m.next_cursor)
                .unwrap_or_default();
            if cursor.is_empty() {
                return Ok(ids);
            }
        }
    }
}

fn map_api_error(code: &str) -> DirectoryError {
    match code {
        "channel_not_found" => DirectoryError::ChannelNotFound(code.to_string()),
        "not_authed" | "invalid_auth" | "account_inactive" | "token_revoked" | "missing_scope" => {
            DirectoryError::Unauthorized(code.to_string())
        }
        "ratelimited" | "fatal_error" | "internal_error" | "service_unavailable" => {
            DirectoryError::Unavailable(code.to_string())
        }
        other => DirectoryError::InvalidResponse(other.to_string()),
    }
}

/// Email of a human, active account.
fn member_email(user: &SlackUser) -> Option<&str> {
    if user.deleted || user.is_bot {
        return None;
    }
    user.profile.email.as_deref().filter(|e| !e.trim().is_empty())
}

#[async_trait]
impl DirectoryProvider for SlackDirectory {
    async fn fetch_members(&self, channel: &str) -> Result<HashSet<String>, DirectoryError> {
        let ids = self.member_ids(channel).await?;
        debug!("Slack channel {} lists {} members", channel, ids.len());

        let mut emails = HashSet::with_capacity(ids.len());
        for id in ids {
            let info: UserInfo = self.call("users.info", &[("user", id.as_str())]).await?;
            match member_email(&info.user) {
                Some(email) => {
                    emails.insert(email.to_string());
                }
                None => debug!("Skipping Slack member {} (bot, deleted or no email)", info.user.id),
            }
        }
        if emails.is_empty() {
            warn!("Slack channel {} resolved to no member emails", channel);
        }
        Ok(emails)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(json: &str) -> SlackUser {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_member_email_skips_bots_and_deleted() {
        assert_eq!(
            member_email(&user(r#"{"id":"U1","profile":{"email":"a@x.io"}}"#)),
            Some("a@x.io")
        );
        assert_eq!(
            member_email(&user(r#"{"id":"U2","is_bot":true,"profile":{"email":"b@x.io"}}"#)),
            None
        );
        assert_eq!(
            member_email(&user(r#"{"id":"U3","deleted":true,"profile":{"email":"c@x.io"}}"#)),
            None
        );
        assert_eq!(member_email(&user(r#"{"id":"U4"}"#)), None);
    }

    #[test]
    fn test_members_page_parses_cursor() {
        let envelope: Envelope<MembersPage> = serde_json::from_str(
            r#"{"ok":true,"members":["U1","U2"],"response_metadata":{"next_cursor":"dXNlcjpVMDYx"}}"#,
        )
        .unwrap();
        let page = envelope.body.unwrap();
        assert_eq!(page.members, vec!["U1", "U2"]);
        assert_eq!(page.response_metadata.unwrap().next_cursor, "dXNlcjpVMDYx");
    }

    #[test]
    fn test_api_error_mapping() {
        assert!(matches!(
            map_api_error("channel_not_found"),
            DirectoryError::ChannelNotFound(_)
        ));
        assert!(matches!(
            map_api_error("invalid_auth"),
            DirectoryError::Unauthorized(_)
        ));
        assert!(map_api_error("ratelimited").is_transient());
    }
}
