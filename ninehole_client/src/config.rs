// Startup configuration for a client session.
//
// Everything the engine needs to reach the authority is resolved once, before
// the channel is opened, into a `ClientConfig`:
// - `api_base`:    scheme/host/port the four commands are POSTed to.
// - `channel_url`: the notification channel. Derived from the server URL
//                  (`http` → `ws`, path `/ws`) unless given explicitly.
// - `join_link`:   a lobby to auto-join once connected, taken from a share
//                  link (`http://host/join/<id>`) or a bare id.
// - `identity`:    a participant id to present instead of letting the
//                  authority issue a fresh one.
//
// Sources, highest precedence first: command-line flags, the
// `NINEHOLE_SERVER` environment variable, `DEFAULT_SERVER`. Flags are parsed
// by hand over `std::env::args()`; there are few enough that a CLI framework
// would be heavier than the parsing it replaces.

use percent_encoding::percent_decode_str;
use url::Url;

use ninehole_protocol::LobbyId;

use crate::error::ConfigError;

pub const DEFAULT_SERVER: &str = "http://localhost:8080";

/// Environment variable naming the server when `--server` is not given.
pub const SERVER_ENV: &str = "NINEHOLE_SERVER";

const CHANNEL_PATH: &str = "/ws";
const JOIN_SEGMENT: &str = "join";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base: Url,
    pub channel_url: Url,
    pub join_link: Option<LobbyId>,
    pub identity: Option<String>,
}

impl ClientConfig {
    /// Configuration for an authority serving both commands and the channel
    /// at `server` (an `http://` URL).
    pub fn for_server(server: &str) -> Result<Self, ConfigError> {
        let api_base = parse_url(server)?;
        if api_base.scheme() != "http" {
            return Err(ConfigError::UnsupportedScheme(api_base.scheme().to_string()));
        }

        let mut channel_url = api_base.clone();
        channel_url
            .set_scheme("ws")
            .map_err(|()| ConfigError::UnsupportedScheme(api_base.scheme().to_string()))?;
        channel_url.set_path(CHANNEL_PATH);
        channel_url.set_query(None);

        Ok(Self {
            api_base,
            channel_url,
            join_link: None,
            identity: None,
        })
    }

    pub fn with_channel_url(mut self, channel_url: &str) -> Result<Self, ConfigError> {
        self.channel_url = parse_url(channel_url)?;
        Ok(self)
    }

    pub fn with_join_link(mut self, link: &str) -> Result<Self, ConfigError> {
        self.join_link = Some(parse_join_link(link)?);
        Ok(self)
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Resolve from the process arguments and environment.
    pub fn from_env_and_args() -> Result<Self, ConfigError> {
        Self::from_args(std::env::args().skip(1), std::env::var(SERVER_ENV).ok())
    }

    /// Resolve from explicit arguments (program name already stripped) and
    /// an optional server taken from the environment.
    pub fn from_args<I>(args: I, env_server: Option<String>) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut server = None;
        let mut channel_url = None;
        let mut join_link = None;
        let mut identity = None;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let slot = match arg.as_str() {
                "--server" => &mut server,
                "--channel-url" => &mut channel_url,
                "--join" => &mut join_link,
                "--identity" => &mut identity,
                _ => return Err(ConfigError::UnknownArgument(arg)),
            };
            let flag = flag_name(&arg);
            *slot = Some(args.next().ok_or(ConfigError::MissingValue(flag))?);
        }

        let server = server
            .or(env_server)
            .unwrap_or_else(|| DEFAULT_SERVER.to_string());
        let mut config = Self::for_server(&server)?;
        if let Some(channel_url) = channel_url {
            config = config.with_channel_url(&channel_url)?;
        }
        if let Some(link) = join_link {
            config = config.with_join_link(&link)?;
        }
        if let Some(identity) = identity {
            config = config.with_identity(identity);
        }
        Ok(config)
    }

    /// Link a second player can open to join `lobby_id` directly.
    pub fn share_link(&self, lobby_id: &LobbyId) -> Url {
        let mut link = self.api_base.clone();
        link.set_query(None);
        link.set_path("");
        if let Ok(mut segments) = link.path_segments_mut() {
            segments.clear().push(JOIN_SEGMENT).push(lobby_id.as_str());
        }
        link
    }
}

/// Accepts `http(s)://host/join/<id>` or a bare lobby id.
pub fn parse_join_link(raw: &str) -> Result<LobbyId, ConfigError> {
    let invalid = || ConfigError::InvalidJoinLink(raw.to_string());
    let trimmed = raw.trim();

    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        let url = parse_url(trimmed)?;
        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        return match segments.as_slice() {
            [.., JOIN_SEGMENT, id] => {
                let decoded = percent_decode_str(id).decode_utf8().map_err(|_| invalid())?;
                LobbyId::new(decoded).ok_or_else(invalid)
            }
            _ => Err(invalid()),
        };
    }

    if trimmed.contains('/') || trimmed.contains(char::is_whitespace) {
        return Err(invalid());
    }
    LobbyId::new(trimmed).ok_or_else(invalid)
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

fn flag_name(arg: &str) -> &'static str {
    match arg {
        "--server" => "--server",
        "--channel-url" => "--channel-url",
        "--join" => "--join",
        _ => "--identity",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn derives_channel_url_from_server() {
        let config = ClientConfig::for_server("http://example.com:9000").unwrap();
        assert_eq!(config.api_base.as_str(), "http://example.com:9000/");
        assert_eq!(config.channel_url.as_str(), "ws://example.com:9000/ws");
        assert_eq!(config.join_link, None);
    }

    #[test]
    fn rejects_non_http_server() {
        assert_eq!(
            ClientConfig::for_server("https://example.com"),
            Err(ConfigError::UnsupportedScheme("https".into()))
        );
        assert!(matches!(
            ClientConfig::for_server("not a url"),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn default_server_when_nothing_given() {
        let config = ClientConfig::from_args(Vec::new(), None).unwrap();
        assert_eq!(config.channel_url.as_str(), "ws://localhost:8080/ws");
    }

    #[test]
    fn flag_beats_environment() {
        let from_env = ClientConfig::from_args(Vec::new(), Some("http://env:1".into())).unwrap();
        assert_eq!(from_env.api_base.as_str(), "http://env:1/");

        let from_flag = ClientConfig::from_args(
            args(&["--server", "http://flag:2"]),
            Some("http://env:1".into()),
        )
        .unwrap();
        assert_eq!(from_flag.api_base.as_str(), "http://flag:2/");
    }

    #[test]
    fn parses_all_flags() {
        let config = ClientConfig::from_args(
            args(&[
                "--server",
                "http://127.0.0.1:3000",
                "--channel-url",
                "ws://127.0.0.1:3001/socket",
                "--join",
                "http://127.0.0.1:3000/join/abc123",
                "--identity",
                "player-7",
            ]),
            None,
        )
        .unwrap();
        assert_eq!(config.channel_url.as_str(), "ws://127.0.0.1:3001/socket");
        assert_eq!(config.join_link, LobbyId::new("abc123"));
        assert_eq!(config.identity.as_deref(), Some("player-7"));
    }

    #[test]
    fn flag_errors() {
        assert_eq!(
            ClientConfig::from_args(args(&["--join"]), None),
            Err(ConfigError::MissingValue("--join"))
        );
        assert_eq!(
            ClientConfig::from_args(args(&["--verbose"]), None),
            Err(ConfigError::UnknownArgument("--verbose".into()))
        );
    }

    #[test]
    fn join_link_forms() {
        assert_eq!(parse_join_link("abc123").unwrap().as_str(), "abc123");
        assert_eq!(
            parse_join_link("http://localhost:5173/join/abc123").unwrap().as_str(),
            "abc123"
        );
        assert_eq!(
            parse_join_link("https://game.example/join/abc123/").unwrap().as_str(),
            "abc123"
        );
        assert!(parse_join_link("http://localhost:5173/lobby/abc123").is_err());
        assert!(parse_join_link("http://localhost:5173/join/").is_err());
        assert!(parse_join_link("abc 123").is_err());
        assert!(parse_join_link("").is_err());
    }

    #[test]
    fn share_link_round_trips_through_parser() {
        let config = ClientConfig::for_server("http://localhost:8080").unwrap();
        let lobby_id = LobbyId::new("a b").unwrap();
        let link = config.share_link(&lobby_id);
        assert_eq!(link.as_str(), "http://localhost:8080/join/a%20b");
        assert_eq!(parse_join_link(link.as_str()).unwrap(), lobby_id);
    }
}
