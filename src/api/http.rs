//! HTTP implementation of the collaborator endpoints.
//!
//! Carries the caller-supplied `user_session` cookie on every request. The
//! XML endpoints (entry-point status, heartbeat) are parsed structurally; the
//! HTML pages (community, user profile) are scraped leniently, since scraping
//! accuracy is explicitly not a correctness concern.

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event;
use regex::Regex;
use reqwest::header;

use crate::domain::{
    Community, Heartbeat, HeartbeatErrorCode, HeartbeatStatus, Live, LiveContext, LiveUser,
    MessageServer, RoomPosition,
};

use super::{AbuseReport, ApiError, LiveApi};

const GET_PLAYER_STATUS_URL: &str = "http://watch.live.nicovideo.jp/api/getplayerstatus";
const GET_POST_KEY_URL: &str = "http://live.nicovideo.jp/api/getpostkey";
const HEARTBEAT_URL: &str = "http://live.nicovideo.jp/api/heartbeat";
const NG_SCORING_URL: &str = "http://watch.live.nicovideo.jp/api/ngscoring";
const COMMUNITY_URL: &str = "http://com.nicovideo.jp/community/";
const USER_URL: &str = "http://www.nicovideo.jp/user/";

// the service rejects unknown clients, so present a browser user agent
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_10_1) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/39.0.2171.71 Safari/537.36";

/// Collaborator endpoints over plain HTTP with a session cookie.
pub struct HttpLiveApi {
    client: reqwest::Client,
    user_session: String,
}

impl HttpLiveApi {
    /// Build a client for the given `user_session` cookie value.
    pub fn new(user_session: impl Into<String>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            user_session: user_session.into(),
        })
    }

    fn cookie_value(&self) -> String {
        format!("user_session={}", self.user_session)
    }

    async fn cookied_get(&self, url: &str, params: &[(&str, String)]) -> Result<String, ApiError> {
        let response = self
            .client
            .get(url)
            .query(params)
            .header(header::COOKIE, self.cookie_value())
            .send()
            .await?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl LiveApi for HttpLiveApi {
    async fn resolve_live(&self, live_id: &str) -> Result<LiveContext, ApiError> {
        let body = self
            .cookied_get(GET_PLAYER_STATUS_URL, &[("v", live_id.to_string())])
            .await?;
        parse_player_status(&body)
    }

    async fn resolve_community(&self, community_id: &str) -> Result<Community, ApiError> {
        let url = format!("{}{}", COMMUNITY_URL, community_id);
        let body = self.cookied_get(&url, &[]).await?;
        Ok(scrape_community(community_id, &body))
    }

    async fn fetch_post_key(&self, thread_id: u64, block: u64) -> Result<String, ApiError> {
        let body = self
            .cookied_get(
                GET_POST_KEY_URL,
                &[
                    ("thread", thread_id.to_string()),
                    ("block_no", block.to_string()),
                ],
            )
            .await?;
        parse_post_key(&body)
    }

    async fn fetch_heartbeat(&self, live_id: &str) -> Result<Heartbeat, ApiError> {
        let body = self
            .cookied_get(HEARTBEAT_URL, &[("v", live_id.to_string())])
            .await?;
        parse_heartbeat(&body)
    }

    async fn resolve_username(&self, user_id: &str) -> Result<Option<String>, ApiError> {
        let url = format!("{}{}", USER_URL, user_id);
        let body = self.cookied_get(&url, &[]).await?;
        Ok(scrape_username(&body))
    }

    async fn report_abuse(&self, report: &AbuseReport) -> Result<(), ApiError> {
        let comment_no = report.comment_no.to_string();
        let thread_id = report.thread_id.to_string();
        let form = [
            ("vid", report.live_id.as_str()),
            ("lang", "ja-jp"),
            ("type", "ID"),
            ("locale", "GLOBAL"),
            ("value", report.user_id.as_str()),
            ("player", "v4"),
            ("uid", report.user_id.as_str()),
            ("tpos", report.tpos.as_str()),
            ("comment", comment_no.as_str()),
            ("thread", thread_id.as_str()),
            ("comment_locale", "ja-jp"),
        ];
        self.client
            .post(NG_SCORING_URL)
            .header(header::COOKIE, self.cookie_value())
            .form(&form)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Flattened view of a small XML response document: root attributes plus the
/// text content of each element path under the root.
#[derive(Debug, Default)]
struct XmlDigest {
    root_attrs: HashMap<String, String>,
    texts: HashMap<String, String>,
}

impl XmlDigest {
    fn status(&self) -> Option<&str> {
        self.root_attrs.get("status").map(String::as_str)
    }

    fn text(&self, path: &str) -> Option<&str> {
        self.texts.get(path).map(String::as_str).filter(|t| !t.is_empty())
    }

    fn int(&self, path: &str) -> Option<i64> {
        self.text(path).and_then(|t| t.trim().parse().ok())
    }
}

fn collect_document(xml: &str) -> Result<XmlDigest, ApiError> {
    let mut reader = Reader::from_str(xml);
    let mut digest = XmlDigest::default();
    let mut stack: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
                if stack.is_empty() {
                    for attribute in element.attributes().flatten() {
                        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
                        if let Ok(value) = attribute.unescape_value() {
                            digest.root_attrs.insert(key, value.into_owned());
                        }
                    }
                }
                stack.push(name);
            }
            Ok(Event::Text(text)) => {
                if stack.len() > 1
                    && let Ok(value) = text.unescape()
                {
                    let path = stack[1..].join("/");
                    digest.texts.entry(path).or_default().push_str(&value);
                }
            }
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(ApiError::Malformed(e.to_string())),
        }
    }

    Ok(digest)
}

/// Parse the entry-point status document into the live descriptor, the
/// watching user and the assigned message server.
pub(crate) fn parse_player_status(xml: &str) -> Result<LiveContext, ApiError> {
    let digest = collect_document(xml)?;

    if digest.status() == Some("fail") {
        let code = digest.text("error/code").unwrap_or("unknown").to_string();
        return Err(ApiError::Service { code });
    }

    let live = Live {
        live_id: digest
            .text("stream/id")
            .ok_or(ApiError::MissingField("stream/id"))?
            .to_string(),
        title: digest.text("stream/title").map(str::to_string),
        community_id: digest.text("stream/default_community").map(str::to_string),
        base_time: digest
            .int("stream/base_time")
            .ok_or(ApiError::MissingField("stream/base_time"))?,
        open_time: digest.int("stream/open_time"),
        start_time: digest.int("stream/start_time"),
    };

    let room_label = digest
        .text("user/room_label")
        .ok_or(ApiError::MissingField("user/room_label"))?
        .to_string();
    let user = LiveUser {
        user_id: digest
            .text("user/user_id")
            .ok_or(ApiError::MissingField("user/user_id"))?
            .to_string(),
        nickname: digest.text("user/nickname").map(str::to_string),
        premium: digest.int("user/is_premium").unwrap_or(0),
        room_label: Some(room_label.clone()),
        seat_no: digest.int("user/room_seetno").and_then(|n| u64::try_from(n).ok()),
    };

    let room_position = room_position_from_label(&room_label).ok_or_else(|| {
        ApiError::Malformed(format!("unrecognized room label: {}", room_label))
    })?;
    let port = digest
        .int("ms/port")
        .and_then(|p| u16::try_from(p).ok())
        .ok_or(ApiError::MissingField("ms/port"))?;
    let thread_id = digest
        .int("ms/thread")
        .and_then(|t| u64::try_from(t).ok())
        .ok_or(ApiError::MissingField("ms/thread"))?;
    let assigned_server = MessageServer::new(
        room_position,
        digest
            .text("ms/addr")
            .ok_or(ApiError::MissingField("ms/addr"))?,
        port,
        thread_id,
    );

    Ok(LiveContext {
        live,
        user,
        assigned_server,
    })
}

/// Parse a heartbeat response document.
pub(crate) fn parse_heartbeat(xml: &str) -> Result<Heartbeat, ApiError> {
    let digest = collect_document(xml)?;
    let status = HeartbeatStatus::from_wire(digest.status().unwrap_or("fail"));

    let heartbeat = match status {
        HeartbeatStatus::Ok => Heartbeat {
            status,
            watch_count: digest.int("watchCount").and_then(|n| u64::try_from(n).ok()),
            comment_count: digest.int("commentCount").and_then(|n| u64::try_from(n).ok()),
            free_slot_num: digest.int("freeSlotNum").and_then(|n| u64::try_from(n).ok()),
            is_restrict: digest.int("is_restrict").map(|n| n != 0),
            ticket: digest.text("ticket").map(str::to_string),
            wait_time: digest.int("waitTime").and_then(|n| u64::try_from(n).ok()),
            error_code: None,
        },
        HeartbeatStatus::Fail => Heartbeat {
            status,
            watch_count: None,
            comment_count: None,
            free_slot_num: None,
            is_restrict: None,
            ticket: None,
            wait_time: None,
            error_code: digest.text("error/code").map(HeartbeatErrorCode::from_code),
        },
    };

    Ok(heartbeat)
}

/// Extract the posting token from a `postkey=...` response body.
pub(crate) fn parse_post_key(body: &str) -> Result<String, ApiError> {
    static POST_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new("postkey=(.+)").unwrap());
    POST_KEY
        .captures(body.trim())
        .and_then(|captures| captures.get(1))
        .map(|key| key.as_str().to_string())
        .ok_or_else(|| ApiError::Malformed("empty post key response".to_string()))
}

/// Map the server-assigned room label to a position: a community id label
/// means the arena, a stand label carries the stand letter.
pub(crate) fn room_position_from_label(label: &str) -> Option<RoomPosition> {
    static ARENA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"co\d+").unwrap());
    static STAND: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"立ち見(\w)列").unwrap());

    if ARENA.is_match(label) {
        return Some(RoomPosition::Arena);
    }

    let stand_letter = STAND
        .captures(label)?
        .get(1)?
        .as_str()
        .chars()
        .next()?;
    match stand_letter {
        'A'..='G' => RoomPosition::from_ordinal(stand_letter as usize - 'A' as usize + 1),
        _ => None,
    }
}

/// Lenient scrape of the community page for title, level and thumbnail.
pub(crate) fn scrape_community(community_id: &str, html: &str) -> Community {
    static TITLE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"id="community_name"[^>]*>([^<]+)"#).unwrap());
    static LEVEL: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"(?s)id="cbox_profile".*?<strong[^>]*>(\d+)</strong>"#).unwrap());
    static THUMBNAIL: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"(?s)id="cbox_profile".*?<img[^>]+src="([^"]+)""#).unwrap());

    Community {
        community_id: community_id.to_string(),
        title: TITLE
            .captures(html)
            .and_then(|captures| captures.get(1))
            .map(|title| title.as_str().trim().to_string()),
        level: LEVEL
            .captures(html)
            .and_then(|captures| captures.get(1))
            .and_then(|level| level.as_str().parse().ok()),
        thumbnail_url: THUMBNAIL
            .captures(html)
            .and_then(|captures| captures.get(1))
            .map(|url| url.as_str().to_string()),
    }
}

/// Lenient scrape of a user profile page for the display name.
pub(crate) fn scrape_username(html: &str) -> Option<String> {
    static NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<h2[^>]*>([^<]+)</h2>").unwrap());

    let name = NAME.captures(html)?.get(1)?.as_str();
    let cleansed = name.trim().trim_end_matches("さん").trim();
    if cleansed.is_empty() {
        None
    } else {
        Some(cleansed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYER_STATUS_OK: &str = r#"<getplayerstatus status="ok" time="1417000000">
  <stream>
    <id>lv12345</id>
    <title>weekend radio</title>
    <default_community>co54321</default_community>
    <base_time>1416999000</base_time>
    <open_time>1416999300</open_time>
    <start_time>1416999600</start_time>
  </stream>
  <user>
    <user_id>777</user_id>
    <nickname>listener</nickname>
    <is_premium>1</is_premium>
    <room_label>co54321</room_label>
    <room_seetno>12</room_seetno>
  </user>
  <ms>
    <addr>msg102.live.example.jp</addr>
    <port>2810</port>
    <thread>1345000000</thread>
  </ms>
</getplayerstatus>"#;

    #[test]
    fn test_parse_player_status_ok() {
        // テスト項目: 正常な getplayerstatus 応答から配信・ユーザ・サーバが抽出される
        // given (前提条件) / when (操作):
        let context = parse_player_status(PLAYER_STATUS_OK).unwrap();

        // then (期待する結果):
        assert_eq!(context.live.live_id, "lv12345");
        assert_eq!(context.live.title.as_deref(), Some("weekend radio"));
        assert_eq!(context.live.community_id.as_deref(), Some("co54321"));
        assert_eq!(context.live.base_time, 1_416_999_000);
        assert_eq!(context.user.user_id, "777");
        assert_eq!(context.user.premium, 1);
        assert_eq!(context.user.seat_no, Some(12));
        assert_eq!(context.assigned_server.room_position, RoomPosition::Arena);
        assert_eq!(context.assigned_server.host, "msg102.live.example.jp");
        assert_eq!(context.assigned_server.port, 2810);
        assert_eq!(context.assigned_server.thread_id, 1_345_000_000);
    }

    #[test]
    fn test_parse_player_status_fail_reports_error_code() {
        // テスト項目: status=fail の応答がエラーコード付きで失敗になる
        // given (前提条件):
        let xml = r#"<getplayerstatus status="fail">
  <error><code>comingsoon</code></error>
</getplayerstatus>"#;

        // when (操作):
        let result = parse_player_status(xml);

        // then (期待する結果):
        match result {
            Err(ApiError::Service { code }) => assert_eq!(code, "comingsoon"),
            other => panic!("expected service error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_player_status_missing_server_field() {
        // テスト項目: メッセージサーバ情報を欠く応答が失敗になる
        // given (前提条件):
        let xml = r#"<getplayerstatus status="ok">
  <stream><id>lv1</id><base_time>100</base_time></stream>
  <user><user_id>7</user_id><room_label>co1</room_label></user>
</getplayerstatus>"#;

        // when (操作):
        let result = parse_player_status(xml);

        // then (期待する結果):
        assert!(matches!(result, Err(ApiError::MissingField("ms/port"))));
    }

    #[test]
    fn test_parse_heartbeat_ok() {
        // テスト項目: 正常なハートビート応答から統計値と待機時間が抽出される
        // given (前提条件):
        let xml = r#"<heartbeat status="ok" time="1417000000">
  <watchCount>350</watchCount>
  <commentCount>1200</commentCount>
  <freeSlotNum>3</freeSlotNum>
  <is_restrict>0</is_restrict>
  <ticket>hb-ticket</ticket>
  <waitTime>45</waitTime>
</heartbeat>"#;

        // when (操作):
        let heartbeat = parse_heartbeat(xml).unwrap();

        // then (期待する結果):
        assert_eq!(heartbeat.status, HeartbeatStatus::Ok);
        assert_eq!(heartbeat.watch_count, Some(350));
        assert_eq!(heartbeat.comment_count, Some(1200));
        assert_eq!(heartbeat.free_slot_num, Some(3));
        assert_eq!(heartbeat.is_restrict, Some(false));
        assert_eq!(heartbeat.ticket.as_deref(), Some("hb-ticket"));
        assert_eq!(heartbeat.wait_time, Some(45));
        assert_eq!(heartbeat.error_code, None);
    }

    #[test]
    fn test_parse_heartbeat_fail() {
        // テスト項目: 失敗したハートビート応答からエラーコードが抽出される
        // given (前提条件):
        let xml = r#"<heartbeat status="fail">
  <error><code>NOTFOUND</code></error>
</heartbeat>"#;

        // when (操作):
        let heartbeat = parse_heartbeat(xml).unwrap();

        // then (期待する結果):
        assert_eq!(heartbeat.status, HeartbeatStatus::Fail);
        assert_eq!(heartbeat.error_code, Some(HeartbeatErrorCode::NotFound));
        assert_eq!(heartbeat.wait_time, None);
    }

    #[test]
    fn test_parse_post_key() {
        // テスト項目: postkey 応答本文からトークンが抽出される
        // given (前提条件) / when (操作) / then (期待する結果):
        assert_eq!(parse_post_key("postkey=abc.123").unwrap(), "abc.123");
        assert!(parse_post_key("postkey=").is_err());
        assert!(parse_post_key("").is_err());
    }

    #[test]
    fn test_room_position_from_label() {
        // テスト項目: 部屋ラベルが正しい位置に対応付けられる
        // given (前提条件) / when (操作) / then (期待する結果):
        assert_eq!(room_position_from_label("co12345"), Some(RoomPosition::Arena));
        assert_eq!(
            room_position_from_label("立ち見A列"),
            Some(RoomPosition::StandA)
        );
        assert_eq!(
            room_position_from_label("立ち見G列"),
            Some(RoomPosition::StandG)
        );
        assert_eq!(room_position_from_label("立ち見Z列"), None);
        assert_eq!(room_position_from_label("somewhere"), None);
    }

    #[test]
    fn test_scrape_community() {
        // テスト項目: コミュニティページからタイトル・レベル・サムネイルが抽出される
        // given (前提条件):
        let html = r#"<html><body>
  <h1 id="community_name"> night talk </h1>
  <div id="cbox_profile"><table><tr><td>
    <strong class="val">105</strong>
  </td><td><p><img src="http://img.example.jp/co54321.jpg"/></p></td></tr></table></div>
</body></html>"#;

        // when (操作):
        let community = scrape_community("co54321", html);

        // then (期待する結果):
        assert_eq!(community.community_id, "co54321");
        assert_eq!(community.title.as_deref(), Some("night talk"));
        assert_eq!(community.level, Some(105));
        assert_eq!(
            community.thumbnail_url.as_deref(),
            Some("http://img.example.jp/co54321.jpg")
        );
    }

    #[test]
    fn test_scrape_community_missing_fields_stay_none() {
        // テスト項目: 抽出できないフィールドは None のままになる
        // given (前提条件) / when (操作):
        let community = scrape_community("co1", "<html><body>renewed layout</body></html>");

        // then (期待する結果):
        assert_eq!(community.title, None);
        assert_eq!(community.level, None);
        assert_eq!(community.thumbnail_url, None);
    }

    #[test]
    fn test_scrape_username_strips_honorific() {
        // テスト項目: ユーザページの表示名から敬称が取り除かれる
        // given (前提条件) / when (操作) / then (期待する結果):
        assert_eq!(
            scrape_username("<div><h2>花子さん</h2></div>"),
            Some("花子".to_string())
        );
        assert_eq!(
            scrape_username("<h2 class=\"name\">taro</h2>"),
            Some("taro".to_string())
        );
        assert_eq!(scrape_username("<p>no headline</p>"), None);
    }
}
