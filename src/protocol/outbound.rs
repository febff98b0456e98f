//! Builders for the outbound wire directives.
//!
//! Every outbound message is a single XML element; the listener NUL-terminates
//! it before writing to the socket.

use quick_xml::escape::escape;

/// Protocol version sent with the subscription directive. Fixed by the
/// service; unchanged since 2006.
const PROTOCOL_VERSION: &str = "20061206";

/// Mail flag requesting an anonymous post
pub const ANONYMOUS_MAIL_FLAG: &str = "184";

/// Subscription directive opening a room's comment thread.
///
/// `resume_from` asks the server to replay the last N records before
/// streaming live ones (the wire encodes it negated).
pub fn subscribe(thread_id: u64, resume_from: u32) -> String {
    format!(
        "<thread thread=\"{}\" res_from=\"-{}\" version=\"{}\"/>",
        thread_id, resume_from, PROTOCOL_VERSION
    )
}

/// Outbound comment post.
#[allow(clippy::too_many_arguments)]
pub fn post_chat(
    thread_id: u64,
    ticket: &str,
    vpos: i64,
    post_key: &str,
    anonymous: bool,
    user_id: &str,
    premium: i64,
    body: &str,
) -> String {
    let mail = if anonymous { ANONYMOUS_MAIL_FLAG } else { "" };
    format!(
        "<chat thread=\"{}\" ticket=\"{}\" vpos=\"{}\" postkey=\"{}\" mail=\"{}\" user_id=\"{}\" premium=\"{}\">{}</chat>",
        thread_id,
        escape(ticket),
        vpos,
        escape(post_key),
        mail,
        escape(user_id),
        premium,
        escape(body)
    )
}

/// No-op keepalive ping
pub fn keepalive() -> String {
    "<ping>PING</ping>".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_directive_format() {
        // テスト項目: 購読ディレクティブが規定の形式で生成される
        // given (前提条件):
        let thread_id = 1_345_000_123;
        let resume_from = 200;

        // when (操作):
        let message = subscribe(thread_id, resume_from);

        // then (期待する結果):
        assert_eq!(
            message,
            "<thread thread=\"1345000123\" res_from=\"-200\" version=\"20061206\"/>"
        );
    }

    #[test]
    fn test_post_chat_format_with_anonymous_flag() {
        // テスト項目: 匿名投稿で mail 属性に 184 が設定される
        // given (前提条件):
        let message = post_chat(42, "tk-1", 12_300, "key", true, "100", 1, "hello");

        // when (操作) / then (期待する結果):
        assert_eq!(
            message,
            "<chat thread=\"42\" ticket=\"tk-1\" vpos=\"12300\" postkey=\"key\" mail=\"184\" user_id=\"100\" premium=\"1\">hello</chat>"
        );
    }

    #[test]
    fn test_post_chat_format_without_anonymous_flag() {
        // テスト項目: 非匿名投稿で mail 属性が空になる
        // given (前提条件):
        let message = post_chat(42, "tk-1", 0, "key", false, "100", 0, "hi");

        // when (操作) / then (期待する結果):
        assert!(message.contains("mail=\"\""));
    }

    #[test]
    fn test_post_chat_escapes_body_and_attributes() {
        // テスト項目: 本文と属性値の特殊文字がエスケープされる
        // given (前提条件):
        let message = post_chat(1, "a\"b", 0, "k<k", false, "u&u", 0, "1 < 2 & 3");

        // when (操作) / then (期待する結果):
        assert!(message.contains("ticket=\"a&quot;b\""));
        assert!(message.contains("postkey=\"k&lt;k\""));
        assert!(message.contains("user_id=\"u&amp;u\""));
        assert!(message.contains(">1 &lt; 2 &amp; 3</chat>"));
    }

    #[test]
    fn test_keepalive_format() {
        // テスト項目: キープアライブが ping 要素として生成される
        // given (前提条件) / when (操作) / then (期待する結果):
        assert_eq!(keepalive(), "<ping>PING</ping>");
    }
}
