//! Message formatting utilities for terminal display.

use chrono::{DateTime, FixedOffset, Utc};
use stoop_shared::time::format_clock_time;

use crate::domain::{Profile, UserId};

use super::conversation::{Bubble, BubbleKind};
use super::roster::RosterEntry;

const RULE: &str = "============================================================";

/// Message formatter for terminal display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format the connected-user list
    ///
    /// # Arguments
    ///
    /// * `entries` - Roster entries in display order
    /// * `selected` - The peer of the open conversation, marked with `*`
    ///
    /// # Returns
    ///
    /// A numbered list; the numbers are accepted by `/select`
    pub fn format_roster(entries: &[RosterEntry], selected: Option<&UserId>) -> String {
        let mut output = String::new();
        output.push_str(RULE);
        output.push_str("\nConnected users:\n");

        if entries.is_empty() {
            output.push_str("(No other users online)\n");
        } else {
            for (index, entry) in entries.iter().enumerate() {
                let marker = if selected == Some(&entry.peer.id) {
                    "*"
                } else {
                    " "
                };
                output.push_str(&format!(
                    "{}{:>3}. {}",
                    marker,
                    index + 1,
                    entry.peer.display_name
                ));
                if entry.unread > 0 {
                    output.push_str(&format!(" ({} unread)", entry.unread));
                }
                output.push('\n');
            }
        }

        output.push_str(RULE);
        output
    }

    /// Format the banner shown when a conversation opens
    pub fn format_conversation_header(display_name: &str) -> String {
        format!("\n---- Conversation with {} ----", display_name)
    }

    /// Format one message bubble
    ///
    /// Sent bubbles are indented to the right of received ones.
    ///
    /// # Arguments
    ///
    /// * `bubble` - The message to render
    /// * `peer_name` - Display name of the other participant
    /// * `offset` - Timezone the time of day is shown in
    pub fn format_bubble(bubble: &Bubble, peer_name: &str, offset: FixedOffset) -> String {
        let time = Self::format_time(bubble.sent_at, offset);
        match bubble.kind {
            BubbleKind::Sent => format!("{:>24}{} me: {}", "", time, bubble.content),
            BubbleKind::Received => format!("{} {}: {}", time, peer_name, bubble.content),
        }
    }

    fn format_time(at: Option<DateTime<Utc>>, offset: FixedOffset) -> String {
        match at {
            Some(at) => format!("[{}]", format_clock_time(at, offset)),
            None => "[--:--]".to_string(),
        }
    }

    /// Format the notice for a message from a peer whose conversation is not open
    pub fn format_unread_notice(display_name: &str, unread: u32) -> String {
        format!("* New message from {} ({} unread)", display_name, unread)
    }

    /// Format the greeting after the session is resolved
    pub fn format_welcome(profile: &Profile) -> String {
        let display_name = profile.display_name();
        if display_name == profile.username {
            format!("\nLogged in as {}.", profile.username)
        } else {
            format!("\nLogged in as {} ({}).", display_name, profile.username)
        }
    }

    pub fn format_help() -> String {
        [
            "Commands:",
            "  /users            refresh and show connected users",
            "  /select <n|name>  open the conversation with a user",
            "  /connect          reconnect to the chat server",
            "  /login            sign in again",
            "  /logout           sign out",
            "  /quit             leave the chat",
            "  /help             show this help",
            "Any other line is sent to the selected user.",
        ]
        .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use chrono::FixedOffset;

    use super::*;
    use crate::domain::Peer;

    fn entry(id: &str, name: &str, unread: u32) -> RosterEntry {
        RosterEntry {
            peer: Peer {
                id: UserId::new(id).unwrap(),
                username: name.to_string(),
                display_name: name.to_string(),
            },
            unread,
        }
    }

    #[test]
    fn test_format_roster_with_no_entries() {
        // テスト項目: ユーザーがいない場合、適切なメッセージが表示される
        // given (前提条件):
        let entries = vec![];

        // when (操作):
        let result = MessageFormatter::format_roster(&entries, None);

        // then (期待する結果):
        assert!(result.contains("Connected users:"));
        assert!(result.contains("(No other users online)"));
    }

    #[test]
    fn test_format_roster_marks_selection_and_unread() {
        // テスト項目: 選択中のユーザーに印が付き、未読数が表示される
        // given (前提条件):
        let entries = vec![entry("U2", "bob", 0), entry("U3", "carol", 2)];
        let selected = UserId::new("U2").unwrap();

        // when (操作):
        let result = MessageFormatter::format_roster(&entries, Some(&selected));

        // then (期待する結果):
        assert!(result.contains("*  1. bob\n"));
        assert!(result.contains("   2. carol (2 unread)"));
    }

    #[test]
    fn test_format_bubble_sent_and_received() {
        // テスト項目: 送信と受信のメッセージが区別して表示される
        // given (前提条件):
        let at = DateTime::from_timestamp_millis(1672498800000).unwrap();
        let jst = FixedOffset::east_opt(9 * 3600).unwrap();
        let sent = Bubble {
            kind: BubbleKind::Sent,
            content: "hi".to_string(),
            sent_at: Some(at),
        };
        let received = Bubble {
            kind: BubbleKind::Received,
            content: "hello".to_string(),
            sent_at: None,
        };

        // when (操作):
        let sent_line = MessageFormatter::format_bubble(&sent, "bob", jst);
        let received_line = MessageFormatter::format_bubble(&received, "bob", jst);

        // then (期待する結果):
        assert!(sent_line.ends_with("[00:00] me: hi"));
        assert!(sent_line.starts_with(' '));
        assert_eq!(received_line, "[--:--] bob: hello");
    }

    #[test]
    fn test_format_welcome_shows_full_name_and_username() {
        // テスト項目: 氏名がある場合、氏名とユーザー名の両方が表示される
        // given (前提条件):
        let profile = Profile {
            user_id: UserId::new("U1").unwrap(),
            username: "alice".to_string(),
            first_name: Some("Alice".to_string()),
            last_name: Some("Liddell".to_string()),
        };

        // when (操作):
        let result = MessageFormatter::format_welcome(&profile);

        // then (期待する結果):
        assert!(result.contains("Logged in as Alice Liddell (alice)."));
    }

    #[test]
    fn test_format_unread_notice() {
        // テスト項目: 未読通知に送信者名と未読数が含まれる
        // given (前提条件):
        let name = "carol";

        // when (操作):
        let result = MessageFormatter::format_unread_notice(name, 3);

        // then (期待する結果):
        assert_eq!(result, "* New message from carol (3 unread)");
    }
}
