//! Host-authoritative flow tests
//!
//! Snapshots travel through real sessions on an in-memory hub and land in a
//! client replica: thresholds decide how remote actors are corrected, and
//! reliable events play exactly once.

use prediction::reconcile::Correction;
use prediction::{ArenaRules, ClientReplica, InputSampler, Simulation, SnapshotCodec, World};
use session::{Delivery, MemoryHub, MemoryTransport, PeerId, SessionEvent, SessionManager};
use shared::{
    DeterministicRandom, EffectEvent, EffectKind, InputFrame, MatchStart, NetConfig, SlotId,
    Snapshot, SyncMode, Vec3,
};
use std::time::Instant;

const DT: f32 = 1.0 / 60.0;

type Peer = SessionManager<MemoryTransport>;

fn pump(host: &mut Peer, client: &mut Peer, now: Instant) {
    for _ in 0..4 {
        host.update(now);
        client.update(now);
    }
}

fn authoritative_config() -> NetConfig {
    NetConfig {
        mode: SyncMode::HostAuthoritative,
        ..NetConfig::default()
    }
}

/// Host and one client in a running host-authoritative match.
struct Match {
    hub: MemoryHub,
    host: Peer,
    client: Peer,
    now: Instant,
    start: MatchStart,
    host_world: World,
    replica: ClientReplica,
    random: DeterministicRandom,
}

impl Match {
    fn new() -> Self {
        let hub = MemoryHub::new();
        let now = Instant::now();
        let mut host =
            SessionManager::host(hub.endpoint("host"), "Host", authoritative_config(), now);
        let mut client = SessionManager::join(
            hub.endpoint("guest"),
            PeerId::new("host"),
            "Guest",
            NetConfig::default(),
            now,
        );
        pump(&mut host, &mut client, now);
        let start = host.start_match_with_seed(3).unwrap();
        pump(&mut host, &mut client, now);

        let replica = ClientReplica::new(1, &start.real_slots, client.config());
        Self {
            hub,
            host_world: World::new(&start.real_slots),
            replica,
            random: DeterministicRandom::new(start.seed),
            host,
            client,
            now,
            start,
        }
    }

    /// Captures the host world, sends it, and applies whatever arrived.
    fn send_snapshot(&mut self, time_ms: u64) -> Vec<EffectEvent> {
        let snapshot = SnapshotCodec::capture(&self.host_world, time_ms);
        self.host.broadcast_snapshot(&snapshot).unwrap();
        pump(&mut self.host, &mut self.client, self.now);
        self.apply_received()
    }

    fn apply_received(&mut self) -> Vec<EffectEvent> {
        let snapshots: Vec<Box<Snapshot>> = self
            .client
            .drain_events()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::Snapshot(snapshot) => Some(snapshot),
                _ => None,
            })
            .collect();

        let mut played = Vec::new();
        for snapshot in snapshots {
            played.extend(self.replica.on_snapshot(&snapshot));
        }
        played
    }

    /// Moves the host's actor 0 by `dx` from where the replica shows it,
    /// snapshots, and ticks the replica once.
    fn correction_for(&mut self, dx: f32) -> Correction {
        let shown = self.replica.world().actor(0).unwrap().position;
        let moved = Vec3::new(shown.x + dx, shown.y, shown.z);
        self.host_world.actor_mut(0).unwrap().position = moved;
        self.send_snapshot(0);

        let corrections = self.replica.tick(
            &InputFrame::default(),
            |_| None,
            DT,
            &mut self.random,
        );
        corrections
            .into_iter()
            .find(|(slot, _)| *slot == 0)
            .map(|(_, correction)| correction)
            .unwrap()
    }
}

/// SNAPSHOT RECONCILIATION
mod reconciliation_tests {
    use super::*;

    /// The match runs without a lockstep scheduler
    #[test]
    fn authoritative_match_has_no_scheduler() {
        let m = Match::new();
        assert_eq!(m.start.mode, SyncMode::HostAuthoritative);
        assert_eq!(m.client.mode(), SyncMode::HostAuthoritative);
        assert!(m.client.scheduler().is_none());
        assert!(m.host.scheduler().is_none());
    }

    /// Sub-drift error is left alone
    #[test]
    fn tiny_error_is_ignored() {
        let mut m = Match::new();
        assert_eq!(m.correction_for(0.01), Correction::None);
    }

    /// Mid-range error blends partway
    #[test]
    fn moderate_error_blends() {
        let mut m = Match::new();
        let before = m.replica.world().actor(0).unwrap().position.x;
        match m.correction_for(0.5) {
            Correction::Blend(factor) => assert!(factor > 0.0 && factor < 1.0),
            other => panic!("Wrong correction type: {:?}", other),
        }
        let after = m.replica.world().actor(0).unwrap().position.x;
        assert!(after > before && after < before + 0.5);
    }

    /// Large error teleports to the authoritative position
    #[test]
    fn large_error_snaps() {
        let mut m = Match::new();
        let target = m.replica.world().actor(0).unwrap().position.x + 3.0;
        assert_eq!(m.correction_for(3.0), Correction::Snap);
        assert_eq!(m.replica.world().actor(0).unwrap().position.x, target);
    }

    /// Counters land on the local actor without touching its prediction
    #[test]
    fn local_counters_sync() {
        let mut m = Match::new();
        let predicted = m.replica.world().actor(1).unwrap().position;
        {
            let actor = m.host_world.actor_mut(1).unwrap();
            actor.lives = 1;
            actor.kills = 2;
            actor.position = Vec3::new(0.0, 0.0, 0.0);
        }
        m.send_snapshot(50);

        let actor = m.replica.world().actor(1).unwrap();
        assert_eq!(actor.lives, 1);
        assert_eq!(actor.kills, 2);
        assert_eq!(actor.position, predicted);
    }
}

/// RELIABLE EVENTS
mod event_tests {
    use super::*;

    /// An event repeated across two snapshots plays once
    #[test]
    fn events_play_once_across_snapshots() {
        let mut m = Match::new();
        m.host_world
            .emit(EffectKind::ChargedShockwave, 0, Vec3::ZERO);
        let first = m.send_snapshot(0);

        m.host_world.emit(EffectKind::CellSmash, 0, Vec3::ZERO);
        let second = m.send_snapshot(50);

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].kind, EffectKind::ChargedShockwave);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].kind, EffectKind::CellSmash);
    }

    /// Duplicated datagrams do not replay events
    #[test]
    fn duplicated_snapshots_play_once() {
        let mut m = Match::new();
        m.hub.set_filter(|_, _, _| Delivery::Duplicate);
        m.host_world.emit(EffectKind::Respawn, 1, Vec3::ZERO);

        let played = m.send_snapshot(0);
        assert_eq!(played.len(), 1);
        assert_eq!(m.replica.codec().ledger().len(), 1);
    }
}

/// END-TO-END PREDICTION
mod prediction_tests {
    use super::*;

    /// The client's own actor tracks the host while walking
    #[test]
    fn predicted_actor_tracks_host() {
        let mut m = Match::new();
        let mut rules = ArenaRules::new();
        let mut sampler = InputSampler::new();
        let mut timer = prediction::SnapshotTimer::new(m.client.config().snapshot_interval);
        let left = InputFrame::new(-1.0, 0.0);

        for frame in 0..30u32 {
            if let Some((seq, sample)) = sampler.sample(left, m.now) {
                m.client.send_legacy_input(seq, sample).unwrap();
            }
            pump(&mut m.host, &mut m.client, m.now);

            let inputs: [(SlotId, InputFrame); 2] = [
                (0, InputFrame::default()),
                (1, m.host.remote_input(1)),
            ];
            {
                let mut sim = m.host.random_mut().sim_scope();
                rules.advance(&mut m.host_world, &inputs, DT, &mut *sim);
            }
            if timer.tick(std::time::Duration::from_secs_f32(DT)) {
                let snapshot = SnapshotCodec::capture(&m.host_world, u64::from(frame) * 16);
                m.host.broadcast_snapshot(&snapshot).unwrap();
                pump(&mut m.host, &mut m.client, m.now);
                m.apply_received();
            }

            let remote = m.client.remote_input(0);
            m.replica
                .tick(&left, |_| Some(remote), DT, &mut m.random);
        }

        let host_actor = m.host_world.actor(1).unwrap();
        let client_actor = m.replica.world().actor(1).unwrap();
        assert!(host_actor.position.x < 6.0);
        assert!(host_actor.position.distance(&client_actor.position) < 0.05);

        let host_idle = m.host_world.actor(0).unwrap();
        let shown_idle = m.replica.world().actor(0).unwrap();
        assert!(host_idle.position.distance(&shown_idle.position) < 0.05);
    }
}
