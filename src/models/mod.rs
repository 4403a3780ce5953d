use {
    crate::errors::Error,
    derive_more::Display,
    enum_primitive_derive::Primitive,
    serde::{Deserialize, Serialize},
    std::{
        fmt,
        net::SocketAddr,
        str::FromStr,
    },
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StringAddr {
    pub host: String,
    pub port: u16,
}

/// Address of a server as the user gave it: either already resolved or still a host name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Host {
    A(SocketAddr),
    S(StringAddr),
}

impl From<SocketAddr> for Host {
    fn from(addr: SocketAddr) -> Self {
        Host::A(addr)
    }
}

impl<S> From<(S, u16)> for Host
where
    S: ToString,
{
    fn from((host, port): (S, u16)) -> Self {
        Host::S(StringAddr {
            host: host.to_string(),
            port,
        })
    }
}

impl FromStr for Host {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::MissingAddress);
        }

        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(Host::A(addr));
        }

        let (host, port) = s.rsplit_once(':').ok_or_else(|| Error::Resolve {
            host: s.to_string(),
            reason: "missing port".into(),
        })?;
        let port = port.parse::<u16>().map_err(|e| Error::Resolve {
            host: s.to_string(),
            reason: format!("invalid port: {}", e),
        })?;
        if host.is_empty() {
            return Err(Error::MissingAddress);
        }

        Ok((host, port).into())
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Host::A(addr) => write!(f, "{}", addr),
            Host::S(s) => write!(f, "{}:{}", s.host, s.port),
        }
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Primitive, Serialize, Deserialize)]
pub enum ServerType {
    #[display(fmt = "Dedicated")]
    Dedicated = 0x64,
    #[display(fmt = "Non Dedicated")]
    NonDedicated = 0x6C,
    #[display(fmt = "Proxy")]
    Proxy = 0x70,
}

/// Operating system the server runs on. `'m'` and `'o'` both mean Mac.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Environment {
    #[display(fmt = "Linux")]
    Linux,
    #[display(fmt = "Windows")]
    Windows,
    #[display(fmt = "Mac")]
    Mac,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Primitive, Serialize, Deserialize)]
pub enum Visibility {
    #[display(fmt = "Public")]
    Public = 0,
    #[display(fmt = "Private")]
    Private = 1,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Primitive, Serialize, Deserialize)]
pub enum Vac {
    #[display(fmt = "Unsecured")]
    Unsecured = 0,
    #[display(fmt = "Secured")]
    Secured = 1,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTv {
    pub port: u16,
    pub name: String,
}

/// Reply to `A2S_INFO`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InfoResponse {
    pub protocol: u8,
    pub name: String,
    pub map: String,
    pub folder: String,
    pub game: String,
    /// Steam application id. Replaced by the low 24 bits of `game_id` when the server sends one.
    pub app_id: u32,
    pub players: u8,
    pub max_players: u8,
    pub bots: u8,
    pub server_type: ServerType,
    pub environment: Environment,
    pub visibility: Visibility,
    pub vac: Vac,
    pub version: String,

    // Extra data, gated by the EDF byte
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub steam_id: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_tv: Option<SourceTv>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_id: Option<u64>,
}

impl fmt::Display for InfoResponse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {}/{} ({} bots) {}",
            self.name, self.map, self.players, self.max_players, self.bots, self.vac
        )
    }
}

#[derive(Clone, Debug, Default, Display, PartialEq, Serialize, Deserialize)]
#[display(fmt = "{} {} {:.0}s", name, score, duration)]
pub struct Player {
    pub name: String,
    pub score: i32,
    /// Seconds the player has been connected.
    pub duration: f32,
}

/// Reply to `A2S_PLAYER`, players in the order the server sent them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayersInfoResponse {
    pub players: Vec<Player>,
}

/// Numbers from the `stats` console command.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub cpu: i64,
    pub net_in: f64,
    pub net_out: f64,
    pub uptime: i64,
    pub maps: i64,
    pub fps: f64,
    pub players: i64,
    pub svms: f64,
    pub plus_minus_ms: f64,
    pub tick: f64,
}
