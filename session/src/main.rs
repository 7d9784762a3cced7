use clap::{Parser, ValueEnum};
use log::{debug, error, info, warn};
use prediction::{
    lockstep_inputs, ArenaRules, ClientReplica, InputSampler, Simulation, SnapshotCodec,
    SnapshotTimer, World,
};
use session::{ConnectionState, PeerId, SessionError, SessionEvent, SessionManager, UdpTransport};
use shared::{
    Action, InputFrame, MatchStart, NetConfig, SlotId, SlotMapping, SyncMode, HOST_SLOT,
    MAX_SLOTS,
};
use std::time::Instant;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Frames between digest log lines.
const DIGEST_INTERVAL: u32 = 60;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Local address to bind the UDP socket to
    #[arg(short = 'b', long, default_value = "127.0.0.1:0")]
    bind: String,

    /// Host address to join; hosts a new match when omitted
    #[arg(short = 'j', long)]
    join: Option<String>,

    /// Display name shown in the lobby
    #[arg(short = 'n', long, default_value = "Player")]
    name: String,

    /// Sync mode for matches this peer hosts
    #[arg(short = 'm', long, value_enum, default_value_t = ModeArg::Lockstep)]
    mode: ModeArg,

    /// Frames the local lockstep schedule leads real time by
    #[arg(short = 'd', long, default_value = "2")]
    input_delay: u32,

    /// Frames to simulate before leaving
    #[arg(short = 'f', long, default_value = "600")]
    frames: u32,

    /// Loop rate (iterations per second)
    #[arg(short = 't', long, default_value = "60")]
    tick_rate: u32,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Lockstep,
    Authoritative,
}

impl Args {
    fn net_config(&self) -> NetConfig {
        NetConfig {
            mode: match self.mode {
                ModeArg::Lockstep => SyncMode::Lockstep,
                ModeArg::Authoritative => SyncMode::HostAuthoritative,
            },
            input_delay: self.input_delay,
            ..NetConfig::default()
        }
    }
}

/// Deterministic stand-in for a player: walks a square, dashes now and then
/// and charges an attack every two seconds.
fn scripted_input(step: u32, slot: SlotId) -> InputFrame {
    const PATTERN: [(f32, f32); 8] = [
        (1.0, 0.0),
        (0.0, 1.0),
        (-1.0, 0.0),
        (0.0, -1.0),
        (1.0, 1.0),
        (-1.0, -1.0),
        (0.0, 0.0),
        (0.0, 0.0),
    ];
    let phase = (step / 30 + slot as u32) as usize % PATTERN.len();
    let (x, y) = PATTERN[phase];
    let mut frame = InputFrame::new(x, y);
    if step % 90 == 45 {
        frame = frame.with_action(Action::Dash);
    }
    if step % 120 >= 100 {
        frame = frame.with_action(Action::Attack);
    }
    frame
}

/// One headless peer: the session plus whatever world the current match needs.
struct Peer {
    session: SessionManager<UdpTransport>,
    rules: ArenaRules,
    world: World,
    mapping: SlotMapping,
    replica: Option<ClientReplica>,
    sampler: InputSampler,
    snapshot_timer: SnapshotTimer,
    script_step: u32,
    frames_run: u32,
    frames: u32,
}

impl Peer {
    fn new(session: SessionManager<UdpTransport>, frames: u32) -> Self {
        let snapshot_timer = SnapshotTimer::new(session.config().snapshot_interval);
        Self {
            session,
            rules: ArenaRules::new(),
            world: World::new(&[]),
            mapping: SlotMapping::default(),
            replica: None,
            sampler: InputSampler::new(),
            snapshot_timer,
            script_step: 0,
            frames_run: 0,
            frames,
        }
    }

    /// One loop iteration. Returns false once the peer should stop.
    fn step(&mut self, now: Instant) -> Result<bool, SessionError> {
        self.session.update(now);
        for event in self.session.drain_events() {
            if !self.on_event(event) {
                return Ok(false);
            }
        }
        if self.session.state() == ConnectionState::Closed {
            return Ok(false);
        }
        if self.session.current_match().is_none() {
            return Ok(true);
        }

        match self.session.mode() {
            SyncMode::Lockstep => self.step_lockstep()?,
            SyncMode::HostAuthoritative => self.step_authoritative(now)?,
        }
        Ok(self.frames_run < self.frames)
    }

    fn on_event(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Hosting { id } => {
                info!("Hosting on {}; peers join with --join {}", id, id);
            }
            SessionEvent::Joined { slot } => info!("Seated in slot {}", slot),
            SessionEvent::Presence(presence) => {
                let seated: Vec<&str> = presence
                    .names
                    .iter()
                    .zip(presence.occupied.iter())
                    .filter(|(_, occupied)| **occupied)
                    .map(|(name, _)| name.as_str())
                    .collect();
                info!("Lobby: {:?}", seated);

                let idle_host =
                    self.session.is_host() && self.session.current_match().is_none();
                if idle_host && seated.len() >= 2 {
                    if let Err(e) = self.session.start_match() {
                        warn!("Could not start match: {}", e);
                    }
                }
            }
            SessionEvent::MatchStarted(start) | SessionEvent::MatchRestarted(start) => {
                self.begin(&start);
            }
            SessionEvent::Snapshot(snapshot) => {
                if let Some(replica) = self.replica.as_mut() {
                    for effect in replica.on_snapshot(&snapshot) {
                        debug!("Effect {:?} from slot {}", effect.kind, effect.slot);
                    }
                }
            }
            SessionEvent::Stalled(report) => {
                warn!(
                    "Waiting on {:?} for frame {} ({} ticks)",
                    report.missing, report.frame, report.stalled_ticks
                );
            }
            SessionEvent::Error(reason) => error!("{}", reason),
            SessionEvent::Disconnected => {
                info!("Host went away");
                return false;
            }
        }
        true
    }

    fn begin(&mut self, start: &MatchStart) {
        info!(
            "Running {:?} match for slots {:?} with seed {}",
            start.mode, start.real_slots, start.seed
        );
        self.world = World::new(&start.real_slots);
        self.mapping = start.slot_mapping.clone();
        self.sampler = InputSampler::new();
        self.snapshot_timer.reset();
        self.script_step = 0;
        self.frames_run = 0;

        self.replica = match (start.mode, self.session.slot()) {
            (SyncMode::HostAuthoritative, Some(slot)) if !self.session.is_host() => Some(
                ClientReplica::new(slot, &start.real_slots, self.session.config()),
            ),
            _ => None,
        };
    }

    fn step_lockstep(&mut self) -> Result<(), SessionError> {
        let slot = self.session.slot().unwrap_or(HOST_SLOT);
        let input = scripted_input(self.script_step, slot);
        if !self.session.submit_local_input(&input)?.is_empty() {
            self.script_step += 1;
        }

        let world = &mut self.world;
        let rules = &mut self.rules;
        let mapping = &self.mapping;
        let ran = self.session.tick_lockstep(|frame, bits, dt, random| {
            let inputs = lockstep_inputs(mapping, bits);
            rules.advance(world, &inputs, dt, random);
            if frame % DIGEST_INTERVAL == 0 {
                info!("Frame {} digest {:016x}", frame, world.digest());
            }
        });
        self.frames_run += ran;
        Ok(())
    }

    fn step_authoritative(&mut self, now: Instant) -> Result<(), SessionError> {
        let dt = self.session.config().fixed_dt;
        let slot = self.session.slot().unwrap_or(HOST_SLOT);
        let local = scripted_input(self.script_step, slot);
        self.script_step += 1;

        if let Some((seq, frame)) = self.sampler.sample(local, now) {
            self.session.send_legacy_input(seq, frame)?;
        }

        if self.session.is_host() {
            let inputs: Vec<(SlotId, InputFrame)> = self
                .mapping
                .real_slots()
                .iter()
                .map(|&s| {
                    let input = if s == HOST_SLOT {
                        local
                    } else {
                        self.session.remote_input(s)
                    };
                    (s, input)
                })
                .collect();
            {
                let mut sim = self.session.random_mut().sim_scope();
                self.rules.advance(&mut self.world, &inputs, dt, &mut *sim);
            }
            if self.world.frame % DIGEST_INTERVAL == 0 {
                info!("Frame {} digest {:016x}", self.world.frame, self.world.digest());
            }
            if self.snapshot_timer.tick(Duration::from_secs_f32(dt)) {
                let time_ms = (self.world.elapsed * 1000.0) as u64;
                let snapshot = SnapshotCodec::capture(&self.world, time_ms);
                self.session.broadcast_snapshot(&snapshot)?;
            }
        } else if let Some(replica) = self.replica.as_mut() {
            let remote: [InputFrame; MAX_SLOTS] =
                std::array::from_fn(|s| self.session.remote_input(s as SlotId));
            let mut sim = self.session.random_mut().sim_scope();
            replica.tick(&local, |s| remote.get(s as usize).copied(), dt, &mut *sim);
        }

        self.frames_run += 1;
        Ok(())
    }

    fn final_digest(&self) -> u64 {
        match self.replica.as_ref() {
            Some(replica) => replica.world().digest(),
            None => self.world.digest(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = args.net_config();

    let transport = UdpTransport::bind(&args.bind).await?;
    let now = Instant::now();
    let session = match &args.join {
        Some(host) => SessionManager::join(
            transport,
            PeerId::new(host.clone()),
            &args.name,
            config,
            now,
        ),
        None => SessionManager::host(transport, &args.name, config, now),
    };
    let mut peer = Peer::new(session, args.frames);

    let mut ticker = interval(Duration::from_secs_f32(1.0 / args.tick_rate.max(1) as f32));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, leaving");
                break;
            }
        }

        match peer.step(Instant::now()) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                error!("Session failed: {}", e);
                break;
            }
        }
    }

    if peer.frames_run > 0 {
        info!(
            "Ran {} frames, final digest {:016x}",
            peer.frames_run,
            peer.final_digest()
        );
    }
    peer.session.close();
    Ok(())
}
