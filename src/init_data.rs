use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::types::UserIdentity;

type HmacSha256 = Hmac<Sha256>;

const WEB_APP_KEY: &[u8] = b"WebAppData";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InitDataError {
    #[error("init data carries no hash")]
    MissingHash,
    #[error("init data hash does not match")]
    HashMismatch,
    #[error("malformed init data field {field}: {reason}")]
    Malformed { field: &'static str, reason: String },
    #[error("hmac error: {0}")]
    Key(String),
}

/// Decoded Telegram WebApp init data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitData {
    pub user: Option<UserIdentity>,
    pub auth_date: Option<i64>,
    pub hash: Option<String>,
    /// Every field except `hash`, sorted by key.
    fields: BTreeMap<String, String>,
}

impl InitData {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// `key=value` lines sorted by key, the input the signature covers.
    pub fn data_check_string(&self) -> String {
        data_check_string(&self.fields)
    }
}

pub fn parse(raw: &str) -> Result<InitData, InitDataError> {
    let mut fields = BTreeMap::new();
    let mut hash = None;
    for (key, value) in url::form_urlencoded::parse(raw.trim().as_bytes()) {
        if key == "hash" {
            hash = Some(value.into_owned());
        } else {
            fields.insert(key.into_owned(), value.into_owned());
        }
    }

    let user = fields
        .get("user")
        .map(|json| serde_json::from_str::<UserIdentity>(json))
        .transpose()
        .map_err(|e| InitDataError::Malformed { field: "user", reason: e.to_string() })?;

    let auth_date = fields
        .get("auth_date")
        .map(|s| s.parse::<i64>())
        .transpose()
        .map_err(|e| InitDataError::Malformed { field: "auth_date", reason: e.to_string() })?;

    Ok(InitData { user, auth_date, hash, fields })
}

/// Checks the `hash` field against `bot_token` and returns the decoded data.
pub fn verify(raw: &str, bot_token: &str) -> Result<InitData, InitDataError> {
    let data = parse(raw)?;
    let hash = data.hash.as_deref().ok_or(InitDataError::MissingHash)?;
    let expected = hex::decode(hash).map_err(|e| InitDataError::Malformed {
        field: "hash",
        reason: e.to_string(),
    })?;

    let mut mac = data_mac(bot_token)?;
    mac.update(data.data_check_string().as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| InitDataError::HashMismatch)?;
    Ok(data)
}

/// Builds init data for `user` signed with `bot_token`, as the messaging
/// client would hand it to the app.
pub fn sign(user: &UserIdentity, auth_date: i64, bot_token: &str) -> Result<String, InitDataError> {
    let fields = base_fields(user, auth_date)?;
    let mut mac = data_mac(bot_token)?;
    mac.update(data_check_string(&fields).as_bytes());
    let hash = hex::encode(mac.finalize().into_bytes());

    let mut query = encode(&fields);
    query.append_pair("hash", &hash);
    Ok(query.finish())
}

/// Same shape as `sign` without the hash. Only useful against a backend that
/// skips verification.
pub fn unsigned(user: &UserIdentity, auth_date: i64) -> Result<String, InitDataError> {
    Ok(encode(&base_fields(user, auth_date)?).finish())
}

fn base_fields(user: &UserIdentity, auth_date: i64) -> Result<BTreeMap<String, String>, InitDataError> {
    let user_json = serde_json::to_string(user)
        .map_err(|e| InitDataError::Malformed { field: "user", reason: e.to_string() })?;
    let mut fields = BTreeMap::new();
    fields.insert("auth_date".to_string(), auth_date.to_string());
    fields.insert("user".to_string(), user_json);
    Ok(fields)
}

fn encode(fields: &BTreeMap<String, String>) -> url::form_urlencoded::Serializer<'static, String> {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in fields {
        query.append_pair(key, value);
    }
    query
}

fn data_check_string(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// HMAC keyed with HMAC_SHA256("WebAppData", bot_token).
fn data_mac(bot_token: &str) -> Result<HmacSha256, InitDataError> {
    let mut secret = HmacSha256::new_from_slice(WEB_APP_KEY)
        .map_err(|e| InitDataError::Key(e.to_string()))?;
    secret.update(bot_token.as_bytes());
    let secret_key = secret.finalize().into_bytes();
    HmacSha256::new_from_slice(&secret_key).map_err(|e| InitDataError::Key(e.to_string()))
}
