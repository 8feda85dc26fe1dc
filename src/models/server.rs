// src/models/server.rs
use serde::{Deserialize, Serialize};

/// Snapshot of the game server as seen by the last applied poll.
///
/// Optional fields are omitted when absent, so an unreachable server
/// serializes as `{"isOnline":false}` and nothing else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(rename = "isOnline")]
    pub is_online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub players: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxplayers: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gamemode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worldtime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passworded: Option<bool>,
}

impl ServerInfo {
    pub fn offline() -> Self {
        Self::default()
    }
}

/// Fields returned by a successful query exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResponse {
    pub hostname: String,
    pub players: u16,
    pub maxplayers: u16,
    pub gamemode: String,
    pub language: String,
    pub mapname: Option<String>,
    pub worldtime: Option<String>,
    pub passworded: bool,
}

impl From<QueryResponse> for ServerInfo {
    fn from(resp: QueryResponse) -> Self {
        Self {
            is_online: true,
            players: Some(resp.players),
            maxplayers: Some(resp.maxplayers),
            hostname: Some(resp.hostname),
            gamemode: Some(resp.gamemode),
            mapname: resp.mapname,
            worldtime: resp.worldtime,
            passworded: Some(resp.passworded),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderState {
    Loading,
    Online,
    Offline,
}

impl RenderState {
    pub fn indicator(&self) -> &'static str {
        match self {
            Self::Loading => "LOADING",
            Self::Online => "ONLINE",
            Self::Offline => "OFFLINE",
        }
    }
}

/// What the status widget renders.
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub state: RenderState,
    pub indicator: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<ServerInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub players_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<chrono::DateTime<chrono::Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_serializes_to_bare_flag() {
        let json = serde_json::to_value(ServerInfo::offline()).unwrap();
        assert_eq!(json, serde_json::json!({ "isOnline": false }));
    }

    #[test]
    fn query_response_marks_online() {
        let info: ServerInfo = QueryResponse {
            hostname: "KindreD".into(),
            players: 42,
            maxplayers: 100,
            ..Default::default()
        }
        .into();
        assert!(info.is_online);
        assert_eq!(info.players, Some(42));
        assert_eq!(info.maxplayers, Some(100));
        assert_eq!(info.hostname.as_deref(), Some("KindreD"));
    }
}
