//! Inbound webhook message model and its XML/JSON decoder.

use std::fmt;

use serde::de::{self, DeserializeOwned, Deserializer, Visitor};
use serde::Deserialize;

use crate::constants::XML_CONTENT_TYPE_MARKER;
use crate::error::CodecError;

/// Wire format of a webhook body, chosen by the request's content-type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFormat {
    Xml,
    Json,
}

impl ContentFormat {
    /// `text/xml` selects XML; anything else, including a missing header,
    /// selects JSON.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(ct) if ct.contains(XML_CONTENT_TYPE_MARKER) => ContentFormat::Xml,
            _ => ContentFormat::Json,
        }
    }

    /// Content-type of a reply in this format.
    pub fn mime(&self) -> &'static str {
        match self {
            ContentFormat::Xml => "application/xml",
            ContentFormat::Json => "application/json",
        }
    }
}

/// Discriminator carried in the `MsgType` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    Image,
    Voice,
    Video,
    ShortVideo,
    Location,
    Link,
    Event,
}

impl MessageKind {
    pub const ALL: [MessageKind; 8] = [
        MessageKind::Text,
        MessageKind::Image,
        MessageKind::Voice,
        MessageKind::Video,
        MessageKind::ShortVideo,
        MessageKind::Location,
        MessageKind::Link,
        MessageKind::Event,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Voice => "voice",
            MessageKind::Video => "video",
            MessageKind::ShortVideo => "shortvideo",
            MessageKind::Location => "location",
            MessageKind::Link => "link",
            MessageKind::Event => "event",
        }
    }

    pub fn from_wire(msg_type: &str) -> Option<Self> {
        MessageKind::ALL.into_iter().find(|k| k.as_str() == msg_type)
    }
}

/// Fields every inbound message carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    /// The tenant account the message was sent to.
    pub to_user: String,
    /// The end user who sent it; replies go back here.
    pub from_user: String,
    pub create_time: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextMessage {
    pub header: MessageHeader,
    pub content: String,
    pub msg_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageMessage {
    pub header: MessageHeader,
    pub pic_url: String,
    pub media_id: String,
    pub msg_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoiceMessage {
    pub header: MessageHeader,
    pub media_id: String,
    pub format: String,
    pub media_id_16k: String,
    pub msg_id: i64,
}

/// Shared by `video` and `shortvideo`.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMessage {
    pub header: MessageHeader,
    pub media_id: String,
    pub thumb_media_id: String,
    pub msg_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationMessage {
    pub header: MessageHeader,
    pub latitude: String,
    pub longitude: String,
    pub scale: String,
    pub label: String,
    pub msg_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkMessage {
    pub header: MessageHeader,
    pub title: String,
    pub description: String,
    pub url: String,
    pub msg_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventMessage {
    pub header: MessageHeader,
    /// e.g. `subscribe`, `unsubscribe`, `CLICK`, `SCAN`.
    pub event: String,
    pub event_key: String,
    pub ticket: String,
}

/// A decoded webhook message. Lives for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Text(TextMessage),
    Image(ImageMessage),
    Voice(VoiceMessage),
    Video(VideoMessage),
    ShortVideo(VideoMessage),
    Location(LocationMessage),
    Link(LinkMessage),
    Event(EventMessage),
}

impl InboundMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            InboundMessage::Text(_) => MessageKind::Text,
            InboundMessage::Image(_) => MessageKind::Image,
            InboundMessage::Voice(_) => MessageKind::Voice,
            InboundMessage::Video(_) => MessageKind::Video,
            InboundMessage::ShortVideo(_) => MessageKind::ShortVideo,
            InboundMessage::Location(_) => MessageKind::Location,
            InboundMessage::Link(_) => MessageKind::Link,
            InboundMessage::Event(_) => MessageKind::Event,
        }
    }

    pub fn header(&self) -> &MessageHeader {
        match self {
            InboundMessage::Text(m) => &m.header,
            InboundMessage::Image(m) => &m.header,
            InboundMessage::Voice(m) => &m.header,
            InboundMessage::Video(m) | InboundMessage::ShortVideo(m) => &m.header,
            InboundMessage::Location(m) => &m.header,
            InboundMessage::Link(m) => &m.header,
            InboundMessage::Event(m) => &m.header,
        }
    }

    pub fn from_user(&self) -> &str {
        &self.header().from_user
    }

    pub fn to_user(&self) -> &str {
        &self.header().to_user
    }
}

/// Body of an encrypted webhook call.
#[derive(Debug, Clone, Deserialize)]
pub struct EncryptedEnvelope {
    #[serde(rename = "ToUserName", default)]
    pub to_user: String,
    #[serde(rename = "Encrypt")]
    pub encrypt: String,
}

/// Union of every field any message kind may carry. Absent fields default.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMessage {
    #[serde(rename = "ToUserName")]
    to_user: String,
    #[serde(rename = "FromUserName")]
    from_user: String,
    #[serde(rename = "CreateTime")]
    create_time: i64,
    #[serde(rename = "MsgType")]
    msg_type: String,
    #[serde(rename = "MsgId")]
    msg_id: i64,
    #[serde(rename = "Content")]
    content: String,
    #[serde(rename = "PicUrl")]
    pic_url: String,
    #[serde(rename = "MediaId")]
    media_id: String,
    #[serde(rename = "Format")]
    format: String,
    #[serde(rename = "MediaId16K")]
    media_id_16k: String,
    #[serde(rename = "ThumbMediaId")]
    thumb_media_id: String,
    #[serde(rename = "Location_X", deserialize_with = "lenient_string")]
    location_x: String,
    #[serde(rename = "Location_Y", deserialize_with = "lenient_string")]
    location_y: String,
    #[serde(rename = "Scale", deserialize_with = "lenient_string")]
    scale: String,
    #[serde(rename = "Label")]
    label: String,
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Description")]
    description: String,
    #[serde(rename = "Url")]
    url: String,
    #[serde(rename = "Event")]
    event: String,
    #[serde(rename = "EventKey")]
    event_key: String,
    #[serde(rename = "Ticket")]
    ticket: String,
}

impl RawMessage {
    fn into_message(self) -> Option<InboundMessage> {
        let kind = MessageKind::from_wire(&self.msg_type)?;
        let header = MessageHeader {
            to_user: self.to_user,
            from_user: self.from_user,
            create_time: self.create_time,
        };

        let message = match kind {
            MessageKind::Text => InboundMessage::Text(TextMessage {
                header,
                content: self.content,
                msg_id: self.msg_id,
            }),
            MessageKind::Image => InboundMessage::Image(ImageMessage {
                header,
                pic_url: self.pic_url,
                media_id: self.media_id,
                msg_id: self.msg_id,
            }),
            MessageKind::Voice => InboundMessage::Voice(VoiceMessage {
                header,
                media_id: self.media_id,
                format: self.format,
                media_id_16k: self.media_id_16k,
                msg_id: self.msg_id,
            }),
            MessageKind::Video | MessageKind::ShortVideo => {
                let video = VideoMessage {
                    header,
                    media_id: self.media_id,
                    thumb_media_id: self.thumb_media_id,
                    msg_id: self.msg_id,
                };
                if kind == MessageKind::Video {
                    InboundMessage::Video(video)
                } else {
                    InboundMessage::ShortVideo(video)
                }
            }
            MessageKind::Location => InboundMessage::Location(LocationMessage {
                header,
                latitude: self.location_x,
                longitude: self.location_y,
                scale: self.scale,
                label: self.label,
                msg_id: self.msg_id,
            }),
            MessageKind::Link => InboundMessage::Link(LinkMessage {
                header,
                title: self.title,
                description: self.description,
                url: self.url,
                msg_id: self.msg_id,
            }),
            MessageKind::Event => InboundMessage::Event(EventMessage {
                header,
                event: self.event,
                event_key: self.event_key,
                ticket: self.ticket,
            }),
        };
        Some(message)
    }
}

/// Decode a plaintext webhook body.
///
/// Returns `Ok(None)` for a `MsgType` this gateway does not know; the caller
/// acknowledges such messages without replying.
pub fn decode_message(
    body: &[u8],
    format: ContentFormat,
) -> Result<Option<InboundMessage>, CodecError> {
    let raw: RawMessage = parse(body, format)?;
    Ok(raw.into_message())
}

/// Decode the `{ToUserName, Encrypt}` wrapper of an encrypted webhook body.
pub fn decode_envelope(body: &[u8], format: ContentFormat) -> Result<EncryptedEnvelope, CodecError> {
    parse(body, format)
}

fn parse<T: DeserializeOwned>(body: &[u8], format: ContentFormat) -> Result<T, CodecError> {
    match format {
        ContentFormat::Xml => {
            let text = std::str::from_utf8(body)?;
            quick_xml::de::from_str(text).map_err(|e| CodecError::XmlDecode(e.to_string()))
        }
        ContentFormat::Json => Ok(serde_json::from_slice(body)?),
    }
}

// Coordinates arrive as XML text but may be JSON numbers.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct LenientString;

    impl<'de> Visitor<'de> for LenientString {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string or a number")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_unit<E: de::Error>(self) -> Result<String, E> {
            Ok(String::new())
        }

        // quick-xml presents an element's text as a `$text` map entry.
        fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> Result<String, A::Error> {
            let mut text = String::new();
            while let Some(key) = map.next_key::<String>()? {
                if key == "$text" || key == "$value" {
                    text = map.next_value::<String>()?;
                } else {
                    map.next_value::<de::IgnoredAny>()?;
                }
            }
            Ok(text)
        }
    }

    deserializer.deserialize_any(LenientString)
}
