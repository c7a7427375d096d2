//! Outbound reply model.
//!
//! A [`ReplyMessage`] is stored once (tagged by `msg_type`) and can be
//! rendered two ways: as a passive reply body returned inline on the webhook
//! response, or as the JSON body of an active-push API call. The two shapes
//! use different field names and nesting.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::CodecError;
use crate::protocol::ContentFormat;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Article {
    pub title: String,
    pub description: String,
    pub pic_url: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "msg_type", rename_all = "lowercase")]
pub enum ReplyMessage {
    Text {
        #[serde(default)]
        content: String,
    },
    Image {
        #[serde(default)]
        media_id: String,
    },
    Voice {
        #[serde(default)]
        media_id: String,
    },
    Video {
        #[serde(default)]
        media_id: String,
        #[serde(default)]
        title: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        thumb_media_id: String,
    },
    Music {
        #[serde(default)]
        title: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        music_url: String,
        #[serde(default)]
        hq_music_url: String,
        #[serde(default)]
        thumb_media_id: String,
    },
    News {
        #[serde(default)]
        articles: Vec<Article>,
    },
    /// Platform-hosted article bundle referenced by media id.
    #[serde(rename = "mpnews")]
    LegacyNews {
        #[serde(default)]
        media_id: String,
    },
    /// Published article referenced by article id.
    #[serde(rename = "mpnewsarticle")]
    LegacyNewsArticle {
        #[serde(default)]
        article_id: String,
    },
    #[serde(rename = "wxcard")]
    Card {
        #[serde(default)]
        card_id: String,
    },
    #[serde(rename = "miniprogrampage")]
    MiniAppPage {
        #[serde(default)]
        title: String,
        #[serde(default)]
        appid: String,
        #[serde(default)]
        pagepath: String,
        #[serde(default)]
        thumb_media_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyKind {
    Text,
    Image,
    Voice,
    Video,
    Music,
    News,
    LegacyNews,
    LegacyNewsArticle,
    Card,
    MiniAppPage,
}

impl ReplyKind {
    pub const ALL: [ReplyKind; 10] = [
        ReplyKind::Text,
        ReplyKind::Image,
        ReplyKind::Voice,
        ReplyKind::Video,
        ReplyKind::Music,
        ReplyKind::News,
        ReplyKind::LegacyNews,
        ReplyKind::LegacyNewsArticle,
        ReplyKind::Card,
        ReplyKind::MiniAppPage,
    ];

    /// Wire value of `msgtype` / `MsgType`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyKind::Text => "text",
            ReplyKind::Image => "image",
            ReplyKind::Voice => "voice",
            ReplyKind::Video => "video",
            ReplyKind::Music => "music",
            ReplyKind::News => "news",
            ReplyKind::LegacyNews => "mpnews",
            ReplyKind::LegacyNewsArticle => "mpnewsarticle",
            ReplyKind::Card => "wxcard",
            ReplyKind::MiniAppPage => "miniprogrampage",
        }
    }

    /// Whether the platform accepts this kind as an inline webhook reply.
    pub fn is_passive_capable(&self) -> bool {
        match self {
            ReplyKind::Text
            | ReplyKind::Image
            | ReplyKind::Voice
            | ReplyKind::Video
            | ReplyKind::Music
            | ReplyKind::News => true,
            ReplyKind::LegacyNews
            | ReplyKind::LegacyNewsArticle
            | ReplyKind::Card
            | ReplyKind::MiniAppPage => false,
        }
    }
}

impl ReplyMessage {
    pub fn kind(&self) -> ReplyKind {
        match self {
            ReplyMessage::Text { .. } => ReplyKind::Text,
            ReplyMessage::Image { .. } => ReplyKind::Image,
            ReplyMessage::Voice { .. } => ReplyKind::Voice,
            ReplyMessage::Video { .. } => ReplyKind::Video,
            ReplyMessage::Music { .. } => ReplyKind::Music,
            ReplyMessage::News { .. } => ReplyKind::News,
            ReplyMessage::LegacyNews { .. } => ReplyKind::LegacyNews,
            ReplyMessage::LegacyNewsArticle { .. } => ReplyKind::LegacyNewsArticle,
            ReplyMessage::Card { .. } => ReplyKind::Card,
            ReplyMessage::MiniAppPage { .. } => ReplyKind::MiniAppPage,
        }
    }

    /// Body of an active-push call, without the recipient (`touser`).
    pub fn push_body(&self) -> Value {
        let kind = self.kind().as_str();
        let inner = match self {
            ReplyMessage::Text { content } => json!({ "content": content }),
            ReplyMessage::Image { media_id } | ReplyMessage::Voice { media_id } => {
                json!({ "media_id": media_id })
            }
            ReplyMessage::Video {
                media_id,
                title,
                description,
                thumb_media_id,
            } => json!({
                "media_id": media_id,
                "thumb_media_id": thumb_media_id,
                "title": title,
                "description": description,
            }),
            ReplyMessage::Music {
                title,
                description,
                music_url,
                hq_music_url,
                thumb_media_id,
            } => json!({
                "title": title,
                "description": description,
                "musicurl": music_url,
                "hqmusicurl": hq_music_url,
                "thumb_media_id": thumb_media_id,
            }),
            ReplyMessage::News { articles } => {
                let articles: Vec<Value> = articles
                    .iter()
                    .map(|a| {
                        json!({
                            "title": a.title,
                            "description": a.description,
                            "picurl": a.pic_url,
                            "url": a.url,
                        })
                    })
                    .collect();
                json!({ "articles": articles })
            }
            ReplyMessage::LegacyNews { media_id } => json!({ "media_id": media_id }),
            ReplyMessage::LegacyNewsArticle { article_id } => json!({ "article_id": article_id }),
            ReplyMessage::Card { card_id } => json!({ "card_id": card_id }),
            ReplyMessage::MiniAppPage {
                title,
                appid,
                pagepath,
                thumb_media_id,
            } => json!({
                "title": title,
                "appid": appid,
                "pagepath": pagepath,
                "thumb_media_id": thumb_media_id,
            }),
        };

        let mut body = serde_json::Map::new();
        body.insert("msgtype".into(), Value::String(kind.to_string()));
        body.insert(kind.to_string(), inner);
        Value::Object(body)
    }

    /// Render as an inline webhook reply. Returns `Ok(None)` for kinds the
    /// passive channel does not carry.
    ///
    /// `to_user` is the end user (the inbound sender) and `from_user` the
    /// tenant account (the inbound recipient).
    pub fn encode_passive(
        &self,
        to_user: &str,
        from_user: &str,
        create_time: i64,
        format: ContentFormat,
    ) -> Result<Option<String>, CodecError> {
        let kind = self.kind();
        let mut reply = PassiveReply {
            to_user,
            from_user,
            create_time,
            msg_type: kind.as_str(),
            content: None,
            image: None,
            voice: None,
            video: None,
            music: None,
            article_count: None,
            articles: None,
        };

        match self {
            ReplyMessage::Text { content } => reply.content = Some(content),
            ReplyMessage::Image { media_id } => reply.image = Some(MediaRef { media_id }),
            ReplyMessage::Voice { media_id } => reply.voice = Some(MediaRef { media_id }),
            ReplyMessage::Video {
                media_id,
                title,
                description,
                ..
            } => {
                reply.video = Some(VideoRef {
                    media_id,
                    title,
                    description,
                })
            }
            ReplyMessage::Music {
                title,
                description,
                music_url,
                hq_music_url,
                thumb_media_id,
            } => {
                reply.music = Some(MusicRef {
                    title,
                    description,
                    thumb_media_id,
                    music_url,
                    hq_music_url,
                })
            }
            ReplyMessage::News { articles } => {
                reply.article_count = Some(articles.len());
                reply.articles = Some(ArticleList {
                    item: articles
                        .iter()
                        .map(|a| PassiveArticle {
                            title: &a.title,
                            description: &a.description,
                            pic_url: &a.pic_url,
                            url: &a.url,
                        })
                        .collect(),
                });
            }
            ReplyMessage::LegacyNews { .. }
            | ReplyMessage::LegacyNewsArticle { .. }
            | ReplyMessage::Card { .. }
            | ReplyMessage::MiniAppPage { .. } => return Ok(None),
        }

        let body = match format {
            ContentFormat::Xml => quick_xml::se::to_string_with_root("xml", &reply)
                .map_err(|e| CodecError::XmlEncode(e.to_string()))?,
            ContentFormat::Json => serde_json::to_string(&reply)?,
        };
        Ok(Some(body))
    }
}

/// Stored reply configuration for one rule (or one menu button).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyPayload {
    #[serde(default)]
    pub reply_all: bool,
    #[serde(default)]
    pub msg_list: Vec<ReplyMessage>,
}

impl ReplyPayload {
    /// All messages in stored order when `reply_all`, otherwise exactly one
    /// chosen uniformly at random.
    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<ReplyMessage> {
        if self.msg_list.is_empty() {
            return Vec::new();
        }
        if self.reply_all {
            return self.msg_list.clone();
        }
        let idx = rng.gen_range(0..self.msg_list.len());
        vec![self.msg_list[idx].clone()]
    }
}

#[derive(Serialize)]
struct PassiveReply<'a> {
    #[serde(rename = "ToUserName")]
    to_user: &'a str,
    #[serde(rename = "FromUserName")]
    from_user: &'a str,
    #[serde(rename = "CreateTime")]
    create_time: i64,
    #[serde(rename = "MsgType")]
    msg_type: &'static str,
    #[serde(rename = "Content", skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(rename = "Image", skip_serializing_if = "Option::is_none")]
    image: Option<MediaRef<'a>>,
    #[serde(rename = "Voice", skip_serializing_if = "Option::is_none")]
    voice: Option<MediaRef<'a>>,
    #[serde(rename = "Video", skip_serializing_if = "Option::is_none")]
    video: Option<VideoRef<'a>>,
    #[serde(rename = "Music", skip_serializing_if = "Option::is_none")]
    music: Option<MusicRef<'a>>,
    #[serde(rename = "ArticleCount", skip_serializing_if = "Option::is_none")]
    article_count: Option<usize>,
    #[serde(rename = "Articles", skip_serializing_if = "Option::is_none")]
    articles: Option<ArticleList<'a>>,
}

#[derive(Serialize)]
struct MediaRef<'a> {
    #[serde(rename = "MediaId")]
    media_id: &'a str,
}

#[derive(Serialize)]
struct VideoRef<'a> {
    #[serde(rename = "MediaId")]
    media_id: &'a str,
    #[serde(rename = "Title")]
    title: &'a str,
    #[serde(rename = "Description")]
    description: &'a str,
}

#[derive(Serialize)]
struct MusicRef<'a> {
    #[serde(rename = "Title")]
    title: &'a str,
    #[serde(rename = "Description")]
    description: &'a str,
    #[serde(rename = "ThumbMediaId")]
    thumb_media_id: &'a str,
    #[serde(rename = "MusicUrl")]
    music_url: &'a str,
    #[serde(rename = "HQMusicUrl")]
    hq_music_url: &'a str,
}

#[derive(Serialize)]
struct ArticleList<'a> {
    item: Vec<PassiveArticle<'a>>,
}

#[derive(Serialize)]
struct PassiveArticle<'a> {
    #[serde(rename = "Title")]
    title: &'a str,
    #[serde(rename = "Description")]
    description: &'a str,
    #[serde(rename = "PicUrl")]
    pic_url: &'a str,
    #[serde(rename = "Url")]
    url: &'a str,
}
