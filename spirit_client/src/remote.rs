//! Remote players.
//!
//! The relay forwards each peer's `playerdata` as it arrives. The client keeps
//! the latest two per peer and renders between them, one update behind.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use spirit_shared::{
    math::Vec2,
    net::{ConnectionId, PlayerData},
};

#[derive(Debug, Clone)]
struct RemoteEntry {
    previous: Option<PlayerData>,
    latest: PlayerData,
    received: Instant,
    /// Gap between the previous and latest update.
    interval: Duration,
}

impl RemoteEntry {
    /// Progress from `previous` to `latest`, spread over the last gap.
    fn alpha_at(&self, now: Instant) -> f32 {
        if self.interval.is_zero() {
            return 1.0;
        }
        let since = now.saturating_duration_since(self.received);
        (since.as_secs_f32() / self.interval.as_secs_f32()).clamp(0.0, 1.0)
    }

    fn position(&self, alpha: f32) -> Vec2 {
        let to = Vec2::new(self.latest.x, self.latest.y);
        match &self.previous {
            Some(prev) => Vec2::new(prev.x, prev.y).lerp(to, alpha),
            None => to,
        }
    }
}

/// Remote player table keyed by connection id.
#[derive(Debug, Default)]
pub struct RemotePlayers {
    entries: BTreeMap<ConnectionId, RemoteEntry>,
}

impl RemotePlayers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a relayed update. Updates without an id are dropped.
    pub fn upsert(&mut self, data: PlayerData) -> bool {
        self.upsert_at(data, Instant::now())
    }

    pub fn upsert_at(&mut self, data: PlayerData, at: Instant) -> bool {
        let Some(id) = data.id else {
            return false;
        };
        match self.entries.get_mut(&id) {
            Some(entry) => {
                let prev = std::mem::replace(&mut entry.latest, data);
                entry.previous = Some(prev);
                entry.interval = at.saturating_duration_since(entry.received);
                entry.received = at;
            }
            None => {
                self.entries.insert(
                    id,
                    RemoteEntry {
                        previous: None,
                        latest: data,
                        received: at,
                        interval: Duration::ZERO,
                    },
                );
            }
        }
        true
    }

    /// Forgets a peer. A reused id starts fresh.
    pub fn remove(&mut self, id: ConnectionId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn get(&self, id: ConnectionId) -> Option<&PlayerData> {
        self.entries.get(&id).map(|e| &e.latest)
    }

    /// Latest state of every peer, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &PlayerData> + '_ {
        self.entries.values().map(|e| &e.latest)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position between the previous and latest update.
    ///
    /// `alpha` is in $[0,1]$ where 0 = previous, 1 = latest.
    pub fn interp_position(&self, id: ConnectionId, alpha: f32) -> Option<Vec2> {
        self.entries.get(&id).map(|e| e.position(alpha))
    }

    /// Every peer as it should be drawn at `now`, ordered by id.
    ///
    /// Each peer moves from its previous to its latest update over the time
    /// that separated them, then holds at the latest.
    pub fn smoothed(&self, now: Instant) -> Vec<PlayerData> {
        self.entries
            .values()
            .map(|entry| {
                let pos = entry.position(entry.alpha_at(now));
                PlayerData {
                    x: pos.x,
                    y: pos.y,
                    ..entry.latest.clone()
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(id: u32, x: f32) -> PlayerData {
        PlayerData {
            id: Some(ConnectionId(id)),
            x,
            y: 40.0,
            dx: 0.0,
            is_ctrl: false,
            spirit_size: 0.7,
            side_length: 20.0,
        }
    }

    #[test]
    fn interpolates_between_last_two_updates() {
        let mut remotes = RemotePlayers::new();
        remotes.upsert(data(2, 10.0));
        assert_eq!(
            remotes.interp_position(ConnectionId(2), 0.5),
            Some(Vec2::new(10.0, 40.0))
        );

        remotes.upsert(data(2, 20.0));
        assert_eq!(
            remotes.interp_position(ConnectionId(2), 0.5),
            Some(Vec2::new(15.0, 40.0))
        );
        assert_eq!(remotes.len(), 1);
        assert_eq!(remotes.get(ConnectionId(2)).map(|d| d.x), Some(20.0));
    }

    #[test]
    fn disconnect_forgets_history() {
        let mut remotes = RemotePlayers::new();
        remotes.upsert(data(0, 1.0));
        remotes.upsert(data(0, 2.0));
        assert!(remotes.remove(ConnectionId(0)));
        assert!(!remotes.remove(ConnectionId(0)));
        assert!(remotes.is_empty());

        remotes.upsert(data(0, 9.0));
        assert_eq!(
            remotes.interp_position(ConnectionId(0), 0.0),
            Some(Vec2::new(9.0, 40.0))
        );
    }

    #[test]
    fn updates_without_id_are_dropped() {
        let mut remotes = RemotePlayers::new();
        let mut anonymous = data(0, 1.0);
        anonymous.id = None;
        assert!(!remotes.upsert(anonymous));
        assert!(remotes.is_empty());
        assert_eq!(remotes.interp_position(ConnectionId(0), 1.0), None);
    }

    #[test]
    fn smoothed_view_follows_arrival_times() {
        let mut remotes = RemotePlayers::new();
        let t0 = Instant::now();
        remotes.upsert_at(data(4, 10.0), t0);
        assert_eq!(remotes.smoothed(t0)[0].x, 10.0);

        let t1 = t0 + Duration::from_millis(100);
        remotes.upsert_at(data(4, 20.0), t1);
        let at = |ms: u64| remotes.smoothed(t1 + Duration::from_millis(ms));
        assert_eq!(at(0)[0].x, 10.0);
        assert!((at(50)[0].x - 15.0).abs() < 1e-3);
        assert_eq!(at(300)[0].x, 20.0);
        assert_eq!(at(50)[0].id, Some(ConnectionId(4)));
        assert_eq!(at(50)[0].y, 40.0);
    }

    #[test]
    fn iterates_in_id_order() {
        let mut remotes = RemotePlayers::new();
        remotes.upsert(data(3, 0.0));
        remotes.upsert(data(1, 0.0));
        let ids: Vec<_> = remotes.iter().filter_map(|d| d.id).collect();
        assert_eq!(ids, vec![ConnectionId(1), ConnectionId(3)]);
    }
}
