//! Identity and repository records

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Error};
use crate::Client;

pub const RESOLVE_HANDLE: &str = "com.atproto.identity.resolveHandle";
pub const CREATE_RECORD: &str = "com.atproto.repo.createRecord";
pub const GET_RECORD: &str = "com.atproto.repo.getRecord";

pub const POST_COLLECTION: &str = "app.bsky.feed.post";

/// `at://{authority}/{collection}/{rkey}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtUri {
    pub authority: String,
    pub collection: String,
    pub rkey: String,
}

impl FromStr for AtUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("at://")
            .ok_or_else(|| Error::InvalidUri(s.to_string()))?;
        let mut parts = rest.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(authority), Some(collection), Some(rkey), None)
                if !authority.is_empty() && !collection.is_empty() && !rkey.is_empty() =>
            {
                Ok(Self {
                    authority: authority.to_string(),
                    collection: collection.to_string(),
                    rkey: rkey.to_string(),
                })
            }
            _ => Err(Error::InvalidUri(s.to_string())),
        }
    }
}

impl fmt::Display for AtUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at://{}/{}/{}", self.authority, self.collection, self.rkey)
    }
}

/// URI and CID of a specific record version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrongRef {
    pub uri: String,
    pub cid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub root: StrongRef,
    pub parent: StrongRef,
}

/// A plain text `app.bsky.feed.post` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(rename = "$type")]
    pub record_type: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub langs: Vec<String>,
}

impl PostRecord {
    pub fn new(text: &str) -> Self {
        Self {
            record_type: POST_COLLECTION.to_string(),
            text: text.to_string(),
            created_at: Utc::now(),
            reply: None,
            langs: vec!["en".to_string()],
        }
    }

    pub fn with_reply(mut self, reply: ReplyRef) -> Self {
        self.reply = Some(reply);
        self
    }
}

/// A record as returned by `getRecord`.
#[derive(Debug, Clone, Deserialize)]
pub struct Record {
    pub uri: String,
    #[serde(default)]
    pub cid: Option<String>,
    pub value: serde_json::Value,
}

impl Record {
    /// The thread this record replies into, if it is a reply.
    pub fn reply_ref(&self) -> Option<ReplyRef> {
        self.value
            .get("reply")
            .and_then(|reply| serde_json::from_value(reply.clone()).ok())
    }
}

#[derive(Deserialize)]
struct ResolveHandleOutput {
    did: String,
}

#[derive(Serialize)]
struct CreateRecordInput<'a, R> {
    repo: &'a str,
    collection: &'a str,
    record: &'a R,
}

impl Client {
    /// Resolve a handle to a DID. A leading `@` is ignored.
    pub async fn resolve_handle(&self, handle: &str) -> Result<String, Error> {
        let handle = handle.strip_prefix('@').unwrap_or(handle);
        let output: ResolveHandleOutput = self.query(RESOLVE_HANDLE, &[("handle", handle)]).await?;
        Ok(output.did)
    }

    /// Create a record in the authenticated account's repo
    pub async fn create_record<R: Serialize>(
        &self,
        collection: &str,
        record: &R,
    ) -> Result<StrongRef, Error> {
        let did = self
            .did()
            .ok_or(Error::Auth(AuthError::MissingSession))?;
        let created: StrongRef = self
            .procedure(
                CREATE_RECORD,
                &CreateRecordInput {
                    repo: &did,
                    collection,
                    record,
                },
            )
            .await?;
        debug!("Created record {}", created.uri);
        Ok(created)
    }

    pub async fn get_record(&self, uri: &str) -> Result<Record, Error> {
        let uri: AtUri = uri.parse()?;
        self.query(
            GET_RECORD,
            &[
                ("repo", uri.authority.as_str()),
                ("collection", uri.collection.as_str()),
                ("rkey", uri.rkey.as_str()),
            ],
        )
        .await
    }

    /// Publish a plain text post
    pub async fn post_text(&self, text: &str) -> Result<StrongRef, Error> {
        self.create_record(POST_COLLECTION, &PostRecord::new(text))
            .await
    }

    /// Reply to the post at `parent_uri`, keeping the parent's thread root
    pub async fn reply_text(&self, parent_uri: &str, text: &str) -> Result<StrongRef, Error> {
        let parent = self.get_record(parent_uri).await?;
        let parent_cid = parent
            .cid
            .clone()
            .ok_or_else(|| Error::general(format!("Record {} has no CID", parent_uri)))?;
        let parent_ref = StrongRef {
            uri: parent.uri.clone(),
            cid: parent_cid,
        };
        let root = parent
            .reply_ref()
            .map(|reply| reply.root)
            .unwrap_or_else(|| parent_ref.clone());

        let record = PostRecord::new(text).with_reply(ReplyRef {
            root,
            parent: parent_ref,
        });
        self.create_record(POST_COLLECTION, &record).await
    }
}
