//! Source engine connectionless query protocol (`A2S_INFO`, `A2S_PLAYER`).

use crate::{
    errors::{Error, Result},
    models::{
        Environment, InfoResponse, Player, PlayersInfoResponse, ServerType, SourceTv, Vac,
        Visibility,
    },
    util::{self, Reader},
};

use bytes::{Bytes, BytesMut};
use num_traits::FromPrimitive;

pub const INFO_REQUEST: u8 = b'T';
pub const INFO_RESPONSE: u8 = b'I';
pub const PLAYERS_REQUEST: u8 = b'U';
pub const PLAYERS_CHALLENGE_RESPONSE: u8 = b'A';
pub const PLAYERS_RESPONSE: u8 = b'D';

const INFO_PAYLOAD: &str = "Source Engine Query";

const EDF_PORT: u8 = 0x80;
const EDF_STEAM_ID: u8 = 0x10;
const EDF_SOURCE_TV: u8 = 0x40;
const EDF_KEYWORDS: u8 = 0x20;
const EDF_GAME_ID: u8 = 0x01;

/// Token the server hands out before it agrees to send the player list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Challenge(pub i32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Request {
    Info,
    Players { challenge: Challenge },
}

impl Request {
    pub fn write_bytes(&self, out: &mut BytesMut) {
        util::write_request_prefix(out);
        match self {
            Request::Info => {
                util::write_u8(out, INFO_REQUEST);
                util::write_cstring(out, INFO_PAYLOAD);
            }
            Request::Players { challenge } => {
                util::write_u8(out, PLAYERS_REQUEST);
                util::write_i32(out, challenge.0);
            }
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::new();
        self.write_bytes(&mut out);
        out.freeze()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    Info(InfoResponse),
    PlayersChallenge(Challenge),
    Players(PlayersInfoResponse),
}

impl Response {
    /// Parses a response whose connectionless prefix has already been stripped.
    /// `expected` is the header the caller is waiting for; an unknown header is reported
    /// against it.
    pub fn from_bytes(data: &[u8], expected: u8) -> Result<Self> {
        let mut r = Reader::new(data);
        match r.read_u8()? {
            INFO_RESPONSE => Ok(Response::Info(parse_info(&mut r)?)),
            PLAYERS_CHALLENGE_RESPONSE => Ok(Response::PlayersChallenge(Challenge(r.read_i32()?))),
            PLAYERS_RESPONSE => Ok(Response::Players(parse_players(&mut r)?)),
            found => Err(Error::BadHeader { expected, found }),
        }
    }

    pub fn header(&self) -> u8 {
        match self {
            Response::Info(_) => INFO_RESPONSE,
            Response::PlayersChallenge(_) => PLAYERS_CHALLENGE_RESPONSE,
            Response::Players(_) => PLAYERS_RESPONSE,
        }
    }
}

fn decode_enum<T: FromPrimitive>(field: &'static str, value: u8) -> Result<T> {
    T::from_u8(value).ok_or(Error::BadEnumValue { field, value })
}

fn decode_environment(value: u8) -> Result<Environment> {
    match value {
        b'l' => Ok(Environment::Linux),
        b'w' => Ok(Environment::Windows),
        b'm' | b'o' => Ok(Environment::Mac),
        _ => Err(Error::BadEnumValue {
            field: "environment",
            value,
        }),
    }
}

fn parse_info(r: &mut Reader) -> Result<InfoResponse> {
    let mut info = InfoResponse {
        protocol: r.read_u8()?,
        name: r.read_cstring()?,
        map: r.read_cstring()?,
        folder: r.read_cstring()?,
        game: r.read_cstring()?,
        app_id: u32::from(r.read_u16()?),
        players: r.read_u8()?,
        max_players: r.read_u8()?,
        bots: r.read_u8()?,
        server_type: decode_enum("server type", r.read_u8()?)?,
        environment: decode_environment(r.read_u8()?)?,
        visibility: decode_enum("visibility", r.read_u8()?)?,
        vac: decode_enum("vac", r.read_u8()?)?,
        version: r.read_cstring()?,
        port: None,
        steam_id: None,
        source_tv: None,
        keywords: None,
        game_id: None,
    };

    if r.is_empty() {
        return Ok(info);
    }

    let edf = r.read_u8()?;
    if edf & EDF_PORT != 0 {
        info.port = Some(r.read_u16()?);
    }
    if edf & EDF_STEAM_ID != 0 {
        info.steam_id = Some(r.read_u64()?);
    }
    if edf & EDF_SOURCE_TV != 0 {
        info.source_tv = Some(SourceTv {
            port: r.read_u16()?,
            name: r.read_cstring()?,
        });
    }
    if edf & EDF_KEYWORDS != 0 {
        info.keywords = Some(r.read_cstring()?);
    }
    if edf & EDF_GAME_ID != 0 {
        let game_id = r.read_u64()?;
        info.game_id = Some(game_id);
        info.app_id = (game_id & 0xFF_FFFF) as u32;
    }

    Ok(info)
}

fn parse_players(r: &mut Reader) -> Result<PlayersInfoResponse> {
    let count = r.read_u8()?;
    let mut players = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        // chunk index, meaningless to us
        r.read_u8()?;
        players.push(Player {
            name: r.read_cstring()?,
            score: r.read_i32()?,
            duration: r.read_f32()?,
        });
    }

    Ok(PlayersInfoResponse { players })
}

/// Parses a reply to [`Request::Info`].
pub fn parse_info_response(data: &[u8]) -> Result<InfoResponse> {
    match Response::from_bytes(data, INFO_RESPONSE)? {
        Response::Info(info) => Ok(info),
        other => Err(Error::BadHeader {
            expected: INFO_RESPONSE,
            found: other.header(),
        }),
    }
}

/// Parses the final reply of the player list exchange.
pub fn parse_players_response(data: &[u8]) -> Result<PlayersInfoResponse> {
    match Response::from_bytes(data, PLAYERS_RESPONSE)? {
        Response::Players(players) => Ok(players),
        other => Err(Error::BadHeader {
            expected: PLAYERS_RESPONSE,
            found: other.header(),
        }),
    }
}
