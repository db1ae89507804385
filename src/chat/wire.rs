//! JSON conventions shared by the live and fallback channels.
//!
//! Ids and monetary amounts are 64-bit integers in storage but travel as
//! strings on the wire, on both channels, so browser clients never lose
//! precision. Timestamps stay numeric (unix milliseconds).

use serde::{Deserialize, Serialize};

use crate::chat::store::StoredMessage;

pub mod string_id {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(v: &i64, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(v)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse()
            .map_err(|_| D::Error::custom("expected an integer string"))
    }
}

pub mod string_id_opt {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(v: &Option<i64>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(v) => s.collect_str(v),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        raw.map(|s| {
            s.parse()
                .map_err(|_| D::Error::custom("expected an integer string"))
        })
        .transpose()
    }
}

pub mod string_id_vec {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(v: &[i64], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(v.iter().map(i64::to_string))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<i64>, D::Error> {
        let raw = Vec::<String>::deserialize(d)?;
        raw.into_iter()
            .map(|s| {
                s.parse()
                    .map_err(|_| D::Error::custom("expected an integer string"))
            })
            .collect()
    }
}

/// A persisted message as seen by clients. The correlation id is the
/// client-minted identity that survives from optimistic send through
/// acknowledgment; `id` is the server-assigned identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    #[serde(with = "string_id")]
    pub id: i64,
    #[serde(with = "string_id")]
    pub room_id: i64,
    pub correlation_id: String,
    #[serde(with = "string_id")]
    pub sender_id: i64,
    #[serde(default, with = "string_id_opt")]
    pub receiver_id: Option<i64>,
    #[serde(default, with = "string_id_opt")]
    pub purchase_id: Option<i64>,
    pub content: String,
    pub is_read: bool,
    pub created_at: i64,
}

impl From<StoredMessage> for MessageDto {
    fn from(m: StoredMessage) -> Self {
        Self {
            id: m.id,
            room_id: m.room_id,
            correlation_id: m.correlation_id,
            sender_id: m.sender_id,
            receiver_id: m.receiver_id,
            purchase_id: m.purchase_id,
            content: m.content,
            is_read: m.is_read,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDto {
    #[serde(with = "string_id")]
    pub user_id: i64,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDto {
    #[serde(with = "string_id")]
    pub id: i64,
    pub name: String,
    #[serde(default, with = "string_id_opt")]
    pub purchase_id: Option<i64>,
}

impl From<&crate::rooms::Room> for RoomDto {
    fn from(room: &crate::rooms::Room) -> Self {
        Self {
            id: room.id,
            name: room.name.clone(),
            purchase_id: room.purchase_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileDto {
    #[serde(with = "string_id")]
    pub id: i64,
    pub display_name: String,
}
