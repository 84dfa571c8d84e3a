//! Roster of connected peers with unread counters.

use crate::api::ChatApi;
use crate::auth::SessionManager;
use crate::domain::{Peer, UserId};
use crate::error::ApiError;

use super::{MessageFormatter, Screen, relogin_after_unauthorized};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub peer: Peer,
    pub unread: u32,
}

#[derive(Debug, Default)]
pub struct RosterView {
    entries: Vec<RosterEntry>,
}

impl RosterView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    /// Replace the listing, dropping the local user.
    ///
    /// Peers that stay listed keep their unread counters.
    pub fn replace(&mut self, peers: Vec<Peer>, local: &UserId) {
        let previous = std::mem::take(&mut self.entries);
        self.entries = peers
            .into_iter()
            .filter(|peer| &peer.id != local)
            .map(|peer| {
                let unread = previous
                    .iter()
                    .find(|e| e.peer.id == peer.id)
                    .map_or(0, |e| e.unread);
                RosterEntry { peer, unread }
            })
            .collect();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, id: &UserId) -> Option<&RosterEntry> {
        self.entries.iter().find(|e| &e.peer.id == id)
    }

    pub fn contains(&self, id: &UserId) -> bool {
        self.get(id).is_some()
    }

    pub fn unread(&self, id: &UserId) -> u32 {
        self.get(id).map_or(0, |e| e.unread)
    }

    /// Find a peer by 1-based position, identifier, username or display name.
    pub fn resolve(&self, query: &str) -> Option<&Peer> {
        let query = query.trim();
        if let Ok(position) = query.parse::<usize>()
            && let Some(entry) = position.checked_sub(1).and_then(|i| self.entries.get(i))
        {
            return Some(&entry.peer);
        }
        self.entries
            .iter()
            .map(|e| &e.peer)
            .find(|p| p.id.as_str() == query)
            .or_else(|| {
                self.entries.iter().map(|e| &e.peer).find(|p| {
                    p.username.eq_ignore_ascii_case(query)
                        || p.display_name.eq_ignore_ascii_case(query)
                })
            })
    }

    /// Count one unread message; `None` if the sender is not listed.
    pub fn note_unread(&mut self, id: &UserId) -> Option<u32> {
        let entry = self.entries.iter_mut().find(|e| &e.peer.id == id)?;
        entry.unread += 1;
        Some(entry.unread)
    }

    pub fn clear_unread(&mut self, id: &UserId) {
        if let Some(entry) = self.entries.iter_mut().find(|e| &e.peer.id == id) {
            entry.unread = 0;
        }
    }

    /// Fetch the connected users and re-render the list.
    ///
    /// Needs a bearer token and a resolved identity; a 401 starts a login.
    pub async fn refresh(
        &mut self,
        api: &dyn ChatApi,
        auth: &mut SessionManager,
        screen: &mut Screen,
        selected: Option<&UserId>,
    ) -> Result<(), ApiError> {
        let Some(bearer) = auth.bearer_token().await else {
            tracing::error!("Cannot fetch users: Failed to get access token.");
            return Err(ApiError::MissingToken);
        };
        let Some(local) = auth.identity().map(|p| p.user_id.clone()) else {
            tracing::error!("Cannot fetch users: Current user not identified.");
            return Err(ApiError::MissingIdentity);
        };

        tracing::debug!("Fetching connected users...");
        match api.connected_users(&bearer).await {
            Ok(peers) => {
                self.replace(peers, &local);
                tracing::info!("Displayed connected users: {}", self.entries.len());
                screen.print(MessageFormatter::format_roster(&self.entries, selected));
                Ok(())
            }
            Err(ApiError::Unauthorized) => {
                relogin_after_unauthorized(auth, "users").await;
                Err(ApiError::Unauthorized)
            }
            Err(e) => {
                tracing::error!("Error fetching or displaying connected users: {}", e);
                screen.print("Could not load connected users.");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(id: &str, username: &str) -> Peer {
        Peer {
            id: UserId::new(id).unwrap(),
            username: username.to_string(),
            display_name: username.to_string(),
        }
    }

    fn roster() -> RosterView {
        let mut roster = RosterView::new();
        roster.replace(
            vec![peer("U1", "alice"), peer("U2", "bob"), peer("U3", "carol")],
            &UserId::new("U1").unwrap(),
        );
        roster
    }

    #[test]
    fn test_replace_filters_local_user_by_identifier() {
        // テスト項目: ローカルユーザーは ID で除外される（同名の別ユーザーは残る）
        // given (前提条件):
        let mut roster = RosterView::new();
        let local = UserId::new("U1").unwrap();

        // when (操作):
        roster.replace(vec![peer("U1", "alice"), peer("U9", "alice")], &local);

        // then (期待する結果):
        assert_eq!(roster.entries().len(), 1);
        assert_eq!(roster.entries()[0].peer.id.as_str(), "U9");
    }

    #[test]
    fn test_replace_keeps_unread_of_remaining_peers() {
        // テスト項目: 再取得後も残っているピアの未読数は保持される
        // given (前提条件):
        let mut roster = roster();
        let bob = UserId::new("U2").unwrap();
        roster.note_unread(&bob);
        roster.note_unread(&bob);

        // when (操作):
        roster.replace(vec![peer("U2", "bob")], &UserId::new("U1").unwrap());

        // then (期待する結果):
        assert_eq!(roster.unread(&bob), 2);
        assert!(!roster.contains(&UserId::new("U3").unwrap()));
    }

    #[test]
    fn test_resolve_by_position_id_and_name() {
        // テスト項目: 番号、ID、ユーザー名のいずれでもピアを特定できる
        // given (前提条件):
        let roster = roster();

        // when (操作):
        let by_position = roster.resolve("2").map(|p| p.username.clone());
        let by_id = roster.resolve("U2").map(|p| p.username.clone());
        let by_name = roster.resolve("Bob").map(|p| p.username.clone());
        let missing = roster.resolve("9");

        // then (期待する結果):
        assert_eq!(by_position.as_deref(), Some("carol"));
        assert_eq!(by_id.as_deref(), Some("bob"));
        assert_eq!(by_name.as_deref(), Some("bob"));
        assert!(missing.is_none());
    }

    #[test]
    fn test_note_unread_for_unknown_sender_is_none() {
        // テスト項目: 一覧にない送信者の未読は記録されない
        // given (前提条件):
        let mut roster = roster();

        // when (操作):
        let result = roster.note_unread(&UserId::new("U7").unwrap());

        // then (期待する結果):
        assert_eq!(result, None);
    }

    #[test]
    fn test_clear_unread() {
        // テスト項目: 未読数がゼロに戻る
        // given (前提条件):
        let mut roster = roster();
        let carol = UserId::new("U3").unwrap();
        roster.note_unread(&carol);

        // when (操作):
        roster.clear_unread(&carol);

        // then (期待する結果):
        assert_eq!(roster.unread(&carol), 0);
    }
}
