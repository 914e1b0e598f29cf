//! Binary wire protocol for client-server communication
//!
//! Every packet starts with a one byte opcode and an eight byte sender
//! timestamp (milliseconds since the Unix epoch), followed by the
//! opcode-specific body. All numeric fields are big-endian and fixed width.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Opcode byte + timestamp
pub const HEADER_LEN: usize = 1 + 8;

/// Team affiliation of players and flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeamColor {
    Red,
    Blue,
}

impl TeamColor {
    pub fn opponent(self) -> Self {
        match self {
            Self::Red => Self::Blue,
            Self::Blue => Self::Red,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Self::Red => 0,
            Self::Blue => 1,
        }
    }

    #[cfg(test)]
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Red),
            1 => Some(Self::Blue),
            _ => None,
        }
    }
}

/// How a game ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndState {
    RedWins,
    BlueWins,
    /// Every human player left
    Abandoned,
}

impl EndState {
    pub fn win_for(team: TeamColor) -> Self {
        match team {
            TeamColor::Red => Self::RedWins,
            TeamColor::Blue => Self::BlueWins,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Self::RedWins => 0,
            Self::BlueWins => 1,
            Self::Abandoned => 2,
        }
    }

    #[cfg(test)]
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::RedWins),
            1 => Some(Self::BlueWins),
            2 => Some(Self::Abandoned),
            _ => None,
        }
    }
}

/// Kind of entity announced with ADDMOB
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MobKind {
    Snowman,
    Flag,
}

impl MobKind {
    fn to_byte(self) -> u8 {
        match self {
            Self::Snowman => 0,
            Self::Flag => 1,
        }
    }

    #[cfg(test)]
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Snowman),
            1 => Some(Self::Flag),
            _ => None,
        }
    }
}

/// Packet opcodes. Values below 16 travel client to server, the rest
/// server to client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Ready = 0,
    MoveMe = 1,
    Attack = 2,
    GetFlag = 3,
    StopMe = 4,
    Score = 5,

    NewGame = 16,
    StartGame = 17,
    EndGame = 18,
    AddMob = 19,
    RemoveMob = 20,
    MoveMob = 21,
    StopMob = 22,
    Attacked = 23,
    AttachObj = 24,
    Respawn = 25,
}

impl Opcode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        let opcode = match byte {
            0 => Self::Ready,
            1 => Self::MoveMe,
            2 => Self::Attack,
            3 => Self::GetFlag,
            4 => Self::StopMe,
            5 => Self::Score,
            16 => Self::NewGame,
            17 => Self::StartGame,
            18 => Self::EndGame,
            19 => Self::AddMob,
            20 => Self::RemoveMob,
            21 => Self::MoveMob,
            22 => Self::StopMob,
            23 => Self::Attacked,
            24 => Self::AttachObj,
            25 => Self::Respawn,
            _ => return None,
        };
        Some(opcode)
    }

    /// Size of the body following the header
    pub fn body_len(self) -> usize {
        match self {
            Self::Ready | Self::StartGame => 0,
            Self::MoveMe => 16,
            Self::Attack | Self::GetFlag => 12,
            Self::StopMe | Self::Score => 8,
            Self::NewGame => 5,
            Self::EndGame => 1,
            Self::AddMob => 14,
            Self::RemoveMob => 4,
            Self::MoveMob => 20,
            Self::StopMob | Self::Attacked | Self::Respawn => 12,
            Self::AttachObj => 8,
        }
    }

    pub fn is_client_to_server(self) -> bool {
        (self as u8) < 16
    }
}

/// Wire protocol errors. A packet producing one of these is dropped.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ProtocolError {
    #[error("Empty packet")]
    Empty,

    #[error("Unknown opcode {0}")]
    UnknownOpcode(u8),

    #[error("Opcode {0:?} is not valid in this direction")]
    UnexpectedOpcode(Opcode),

    #[error("Packet {opcode:?} truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        opcode: Opcode,
        expected: usize,
        actual: usize,
    },

    #[error("Packet {opcode:?} has {extra} trailing bytes")]
    TrailingBytes { opcode: Opcode, extra: usize },

    #[error("Packet {0:?} carries a non-finite coordinate")]
    NonFinite(Opcode),

    #[cfg(test)]
    #[error("Packet {opcode:?} has invalid {field} value {value}")]
    InvalidField {
        opcode: Opcode,
        field: &'static str,
        value: u8,
    },
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMsg {
    /// Client has loaded the map and is ready to play
    Ready,
    /// Start moving from (x, y) toward (end_x, end_y)
    MoveMe { x: f32, y: f32, end_x: f32, end_y: f32 },
    /// Throw a snowball at `target_id` from (x, y)
    Attack { target_id: i32, x: f32, y: f32 },
    /// Pick up `flag_id` while standing at (x, y)
    GetFlag { flag_id: i32, x: f32, y: f32 },
    /// Client reached its destination at (x, y)
    StopMe { x: f32, y: f32 },
    /// Carry the held flag into the home base at (x, y)
    Score { x: f32, y: f32 },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMsg {
    /// Tells a client which id and team it plays in a freshly created game
    NewGame { player_id: i32, team: TeamColor },
    StartGame,
    EndGame { end_state: EndState },
    AddMob {
        id: i32,
        kind: MobKind,
        team: TeamColor,
        x: f32,
        y: f32,
    },
    RemoveMob { id: i32 },
    MoveMob {
        id: i32,
        x: f32,
        y: f32,
        dest_x: f32,
        dest_y: f32,
    },
    StopMob { id: i32, x: f32, y: f32 },
    Attacked {
        attacker_id: i32,
        target_id: i32,
        damage: i32,
    },
    AttachObj { holder_id: i32, object_id: i32 },
    Respawn { id: i32, x: f32, y: f32 },
}

impl ClientMsg {
    #[cfg(test)]
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Ready => Opcode::Ready,
            Self::MoveMe { .. } => Opcode::MoveMe,
            Self::Attack { .. } => Opcode::Attack,
            Self::GetFlag { .. } => Opcode::GetFlag,
            Self::StopMe { .. } => Opcode::StopMe,
            Self::Score { .. } => Opcode::Score,
        }
    }

    #[cfg(test)]
    pub fn encode(&self, timestamp: u64) -> Bytes {
        let opcode = self.opcode();
        let mut buf = BytesMut::with_capacity(HEADER_LEN + opcode.body_len());
        put_header(&mut buf, opcode, timestamp);

        match *self {
            Self::Ready => {}
            Self::MoveMe { x, y, end_x, end_y } => {
                buf.put_f32(x);
                buf.put_f32(y);
                buf.put_f32(end_x);
                buf.put_f32(end_y);
            }
            Self::Attack { target_id, x, y } => {
                buf.put_i32(target_id);
                buf.put_f32(x);
                buf.put_f32(y);
            }
            Self::GetFlag { flag_id, x, y } => {
                buf.put_i32(flag_id);
                buf.put_f32(x);
                buf.put_f32(y);
            }
            Self::StopMe { x, y } | Self::Score { x, y } => {
                buf.put_f32(x);
                buf.put_f32(y);
            }
        }

        buf.freeze()
    }

    /// Decode a client packet, returning the sender timestamp and message
    pub fn decode(data: &[u8]) -> Result<(u64, Self), ProtocolError> {
        let (opcode, timestamp, mut body) = split_header(data)?;
        if !opcode.is_client_to_server() {
            return Err(ProtocolError::UnexpectedOpcode(opcode));
        }

        let msg = match opcode {
            Opcode::Ready => Self::Ready,
            Opcode::MoveMe => Self::MoveMe {
                x: get_coord(&mut body, opcode)?,
                y: get_coord(&mut body, opcode)?,
                end_x: get_coord(&mut body, opcode)?,
                end_y: get_coord(&mut body, opcode)?,
            },
            Opcode::Attack => Self::Attack {
                target_id: body.get_i32(),
                x: get_coord(&mut body, opcode)?,
                y: get_coord(&mut body, opcode)?,
            },
            Opcode::GetFlag => Self::GetFlag {
                flag_id: body.get_i32(),
                x: get_coord(&mut body, opcode)?,
                y: get_coord(&mut body, opcode)?,
            },
            Opcode::StopMe => Self::StopMe {
                x: get_coord(&mut body, opcode)?,
                y: get_coord(&mut body, opcode)?,
            },
            Opcode::Score => Self::Score {
                x: get_coord(&mut body, opcode)?,
                y: get_coord(&mut body, opcode)?,
            },
            _ => return Err(ProtocolError::UnexpectedOpcode(opcode)),
        };

        Ok((timestamp, msg))
    }
}

impl ServerMsg {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::NewGame { .. } => Opcode::NewGame,
            Self::StartGame => Opcode::StartGame,
            Self::EndGame { .. } => Opcode::EndGame,
            Self::AddMob { .. } => Opcode::AddMob,
            Self::RemoveMob { .. } => Opcode::RemoveMob,
            Self::MoveMob { .. } => Opcode::MoveMob,
            Self::StopMob { .. } => Opcode::StopMob,
            Self::Attacked { .. } => Opcode::Attacked,
            Self::AttachObj { .. } => Opcode::AttachObj,
            Self::Respawn { .. } => Opcode::Respawn,
        }
    }

    pub fn encode(&self, timestamp: u64) -> Bytes {
        let opcode = self.opcode();
        let mut buf = BytesMut::with_capacity(HEADER_LEN + opcode.body_len());
        put_header(&mut buf, opcode, timestamp);

        match *self {
            Self::NewGame { player_id, team } => {
                buf.put_i32(player_id);
                buf.put_u8(team.to_byte());
            }
            Self::StartGame => {}
            Self::EndGame { end_state } => buf.put_u8(end_state.to_byte()),
            Self::AddMob { id, kind, team, x, y } => {
                buf.put_i32(id);
                buf.put_u8(kind.to_byte());
                buf.put_u8(team.to_byte());
                buf.put_f32(x);
                buf.put_f32(y);
            }
            Self::RemoveMob { id } => buf.put_i32(id),
            Self::MoveMob {
                id,
                x,
                y,
                dest_x,
                dest_y,
            } => {
                buf.put_i32(id);
                buf.put_f32(x);
                buf.put_f32(y);
                buf.put_f32(dest_x);
                buf.put_f32(dest_y);
            }
            Self::StopMob { id, x, y } | Self::Respawn { id, x, y } => {
                buf.put_i32(id);
                buf.put_f32(x);
                buf.put_f32(y);
            }
            Self::Attacked {
                attacker_id,
                target_id,
                damage,
            } => {
                buf.put_i32(attacker_id);
                buf.put_i32(target_id);
                buf.put_i32(damage);
            }
            Self::AttachObj {
                holder_id,
                object_id,
            } => {
                buf.put_i32(holder_id);
                buf.put_i32(object_id);
            }
        }

        buf.freeze()
    }

    /// Decode a server packet, as a client would
    #[cfg(test)]
    pub fn decode(data: &[u8]) -> Result<(u64, Self), ProtocolError> {
        let (opcode, timestamp, mut body) = split_header(data)?;

        let msg = match opcode {
            Opcode::NewGame => Self::NewGame {
                player_id: body.get_i32(),
                team: get_team(&mut body, opcode)?,
            },
            Opcode::StartGame => Self::StartGame,
            Opcode::EndGame => {
                let value = body.get_u8();
                let end_state = EndState::from_byte(value).ok_or(ProtocolError::InvalidField {
                    opcode,
                    field: "end_state",
                    value,
                })?;
                Self::EndGame { end_state }
            }
            Opcode::AddMob => {
                let id = body.get_i32();
                let value = body.get_u8();
                let kind = MobKind::from_byte(value).ok_or(ProtocolError::InvalidField {
                    opcode,
                    field: "kind",
                    value,
                })?;
                Self::AddMob {
                    id,
                    kind,
                    team: get_team(&mut body, opcode)?,
                    x: get_coord(&mut body, opcode)?,
                    y: get_coord(&mut body, opcode)?,
                }
            }
            Opcode::RemoveMob => Self::RemoveMob { id: body.get_i32() },
            Opcode::MoveMob => Self::MoveMob {
                id: body.get_i32(),
                x: get_coord(&mut body, opcode)?,
                y: get_coord(&mut body, opcode)?,
                dest_x: get_coord(&mut body, opcode)?,
                dest_y: get_coord(&mut body, opcode)?,
            },
            Opcode::StopMob => Self::StopMob {
                id: body.get_i32(),
                x: get_coord(&mut body, opcode)?,
                y: get_coord(&mut body, opcode)?,
            },
            Opcode::Attacked => Self::Attacked {
                attacker_id: body.get_i32(),
                target_id: body.get_i32(),
                damage: body.get_i32(),
            },
            Opcode::AttachObj => Self::AttachObj {
                holder_id: body.get_i32(),
                object_id: body.get_i32(),
            },
            Opcode::Respawn => Self::Respawn {
                id: body.get_i32(),
                x: get_coord(&mut body, opcode)?,
                y: get_coord(&mut body, opcode)?,
            },
            _ => return Err(ProtocolError::UnexpectedOpcode(opcode)),
        };

        Ok((timestamp, msg))
    }
}

fn put_header(buf: &mut BytesMut, opcode: Opcode, timestamp: u64) {
    buf.put_u8(opcode as u8);
    buf.put_u64(timestamp);
}

/// Validate the opcode and the exact packet length, returning the body
fn split_header(mut data: &[u8]) -> Result<(Opcode, u64, &[u8]), ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::Empty);
    }

    let byte = data.get_u8();
    let opcode = Opcode::from_byte(byte).ok_or(ProtocolError::UnknownOpcode(byte))?;

    let expected = 8 + opcode.body_len();
    let actual = data.remaining();
    if actual < expected {
        return Err(ProtocolError::Truncated {
            opcode,
            expected: HEADER_LEN + opcode.body_len(),
            actual: actual + 1,
        });
    }
    if actual > expected {
        return Err(ProtocolError::TrailingBytes {
            opcode,
            extra: actual - expected,
        });
    }

    let timestamp = data.get_u64();
    Ok((opcode, timestamp, data))
}

fn get_coord(body: &mut &[u8], opcode: Opcode) -> Result<f32, ProtocolError> {
    let value = body.get_f32();
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ProtocolError::NonFinite(opcode))
    }
}

#[cfg(test)]
fn get_team(body: &mut &[u8], opcode: Opcode) -> Result<TeamColor, ProtocolError> {
    let value = body.get_u8();
    TeamColor::from_byte(value).ok_or(ProtocolError::InvalidField {
        opcode,
        field: "team",
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_me_round_trip_is_exact() {
        let msg = ClientMsg::MoveMe {
            x: 5.35,
            y: 9.65,
            end_x: 20.0,
            end_y: -15.125,
        };
        let bytes = msg.encode(1_234_567_890_123);

        assert_eq!(bytes.len(), HEADER_LEN + 16);
        assert_eq!(bytes[0], Opcode::MoveMe as u8);

        let (timestamp, decoded) = ClientMsg::decode(&bytes).unwrap();
        assert_eq!(timestamp, 1_234_567_890_123);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn fields_are_big_endian() {
        let bytes = ServerMsg::Attacked {
            attacker_id: 1,
            target_id: 2,
            damage: 10,
        }
        .encode(0x0102_0304_0506_0708);

        assert_eq!(&bytes[1..9], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&bytes[9..13], &[0, 0, 0, 1]);
        assert_eq!(&bytes[17..21], &[0, 0, 0, 10]);
    }

    #[test]
    fn decodes_attack_and_get_flag() {
        let attack = ClientMsg::Attack {
            target_id: -3,
            x: 1.5,
            y: 2.5,
        };
        let (_, decoded) = ClientMsg::decode(&attack.encode(7)).unwrap();
        assert_eq!(decoded, attack);

        let get_flag = ClientMsg::GetFlag {
            flag_id: 2,
            x: 0.0,
            y: 0.0,
        };
        let (_, decoded) = ClientMsg::decode(&get_flag.encode(7)).unwrap();
        assert_eq!(decoded, get_flag);
    }

    #[test]
    fn rejects_unknown_opcode() {
        let mut data = vec![99u8];
        data.extend_from_slice(&0u64.to_be_bytes());
        assert_eq!(
            ClientMsg::decode(&data),
            Err(ProtocolError::UnknownOpcode(99))
        );
        assert_eq!(ClientMsg::decode(&[]), Err(ProtocolError::Empty));
    }

    #[test]
    fn rejects_server_opcode_from_client() {
        let bytes = ServerMsg::StartGame.encode(0);
        assert_eq!(
            ClientMsg::decode(&bytes),
            Err(ProtocolError::UnexpectedOpcode(Opcode::StartGame))
        );
    }

    #[test]
    fn rejects_truncated_and_padded_packets() {
        let bytes = ClientMsg::StopMe { x: 1.0, y: 2.0 }.encode(0);

        let short = &bytes[..bytes.len() - 1];
        assert!(matches!(
            ClientMsg::decode(short),
            Err(ProtocolError::Truncated {
                opcode: Opcode::StopMe,
                ..
            })
        ));

        let mut long = bytes.to_vec();
        long.push(0);
        assert_eq!(
            ClientMsg::decode(&long),
            Err(ProtocolError::TrailingBytes {
                opcode: Opcode::StopMe,
                extra: 1
            })
        );
    }

    #[test]
    fn rejects_non_finite_coordinates() {
        let bytes = ClientMsg::MoveMe {
            x: f32::NAN,
            y: 0.0,
            end_x: 1.0,
            end_y: 1.0,
        }
        .encode(0);
        assert_eq!(
            ClientMsg::decode(&bytes),
            Err(ProtocolError::NonFinite(Opcode::MoveMe))
        );
    }

    #[test]
    fn decodes_server_roster_packets() {
        let add = ServerMsg::AddMob {
            id: -1,
            kind: MobKind::Snowman,
            team: TeamColor::Blue,
            x: 3.0,
            y: 4.0,
        };
        let (_, decoded) = ServerMsg::decode(&add.encode(1)).unwrap();
        assert_eq!(decoded, add);

        let mut bad_team = ServerMsg::NewGame {
            player_id: 1,
            team: TeamColor::Red,
        }
        .encode(0)
        .to_vec();
        let last = bad_team.len() - 1;
        bad_team[last] = 9;
        assert!(matches!(
            ServerMsg::decode(&bad_team),
            Err(ProtocolError::InvalidField { field: "team", .. })
        ));
    }
}
