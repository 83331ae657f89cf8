//! Player ownership and master/slave synchronization
//!
//! The manager owns every player thread and the sync roles. At most one
//! player is master; a `ClipChanged` event from the master is forwarded to
//! all slaves as [`PlayerCommand::SyncToMaster`]. Players never touch each
//! other directly, only through the event bus and their command channels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use ledmap_core::{EventBus, PlayerId, PlayerStatus, ShowEvent, SyncRole};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::player::Player;
use crate::runner::{PlayerCommand, PlayerHandle, PlayerRunner};
use crate::{MediaError, Result};

#[derive(Default)]
struct Inner {
    runners: HashMap<PlayerId, PlayerRunner>,
    roles: HashMap<PlayerId, SyncRole>,
    master: Option<PlayerId>,
}

impl Inner {
    fn handle(&self, id: PlayerId) -> Result<PlayerHandle> {
        self.runners
            .get(&id)
            .map(PlayerRunner::handle)
            .ok_or(MediaError::PlayerNotFound(id))
    }

    fn assign(&mut self, id: PlayerId, role: SyncRole) {
        self.roles.insert(id, role);
        if let Some(runner) = self.runners.get(&id) {
            if let Err(e) = runner.handle().send(PlayerCommand::SetRole(role)) {
                warn!("Player {}: role change not delivered: {}", id, e);
            }
        }
    }
}

/// Owns all players
#[derive(Default)]
pub struct PlayerManager {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for PlayerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("PlayerManager")
            .field("players", &inner.runners.len())
            .field("master", &inner.master)
            .finish()
    }
}

impl PlayerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a player thread. A player configured as master takes over from
    /// the current one.
    pub fn spawn(&self, player: Player) -> Result<PlayerHandle> {
        let id = player.id();
        let role = player.role();
        let runner = PlayerRunner::spawn(player)?;
        let handle = runner.handle();

        let previous = {
            let mut inner = self.inner.lock();
            let previous = inner.runners.insert(id, runner);
            inner.roles.insert(id, role);
            previous
        };
        if previous.is_some() {
            warn!("Player {} replaced an existing player with the same id", id);
        }
        drop(previous);

        if role == SyncRole::Master {
            self.set_master(id)?;
        }
        Ok(handle)
    }

    /// Stop and drop a player. Removing the master clears it.
    pub fn remove(&self, id: PlayerId) -> Result<()> {
        let was_master = self.master() == Some(id);
        if was_master {
            self.clear_master();
        }
        let runner = {
            let mut inner = self.inner.lock();
            inner.roles.remove(&id);
            inner.runners.remove(&id)
        };
        // joining happens outside the lock
        match runner {
            Some(runner) => {
                drop(runner);
                info!("Player {} removed", id);
                Ok(())
            }
            None => Err(MediaError::PlayerNotFound(id)),
        }
    }

    pub fn handle(&self, id: PlayerId) -> Result<PlayerHandle> {
        self.inner.lock().handle(id)
    }

    pub fn handles(&self) -> Vec<PlayerHandle> {
        let inner = self.inner.lock();
        let mut handles: Vec<PlayerHandle> =
            inner.runners.values().map(PlayerRunner::handle).collect();
        handles.sort_by_key(PlayerHandle::id);
        handles
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self.inner.lock().runners.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.inner.lock().runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ===== Roles =====

    pub fn master(&self) -> Option<PlayerId> {
        self.inner.lock().master
    }

    pub fn role(&self, id: PlayerId) -> Option<SyncRole> {
        self.inner.lock().roles.get(&id).copied()
    }

    pub fn slaves(&self) -> Vec<PlayerId> {
        let inner = self.inner.lock();
        let mut slaves: Vec<PlayerId> = inner
            .roles
            .iter()
            .filter(|(_, role)| **role == SyncRole::Slave)
            .map(|(id, _)| *id)
            .collect();
        slaves.sort_unstable();
        slaves
    }

    /// Promote `id` to master, demoting the previous master to autonomous.
    pub fn set_master(&self, id: PlayerId) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.runners.contains_key(&id) {
            return Err(MediaError::PlayerNotFound(id));
        }
        if let Some(previous) = inner.master.filter(|m| *m != id) {
            info!("Player {} demoted from master", previous);
            inner.assign(previous, SyncRole::Autonomous);
        }
        inner.master = Some(id);
        inner.assign(id, SyncRole::Master);
        info!("Player {} is master", id);
        Ok(())
    }

    /// Slave `id` to the current (or a future) master.
    pub fn add_slave(&self, id: PlayerId) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.runners.contains_key(&id) {
            return Err(MediaError::PlayerNotFound(id));
        }
        if inner.master == Some(id) {
            inner.master = None;
        }
        inner.assign(id, SyncRole::Slave);
        debug!("Player {} is slave", id);
        Ok(())
    }

    pub fn set_role(&self, id: PlayerId, role: SyncRole) -> Result<()> {
        match role {
            SyncRole::Master => self.set_master(id),
            SyncRole::Slave => self.add_slave(id),
            SyncRole::Autonomous => {
                let mut inner = self.inner.lock();
                if !inner.runners.contains_key(&id) {
                    return Err(MediaError::PlayerNotFound(id));
                }
                if inner.master == Some(id) {
                    inner.master = None;
                }
                inner.assign(id, SyncRole::Autonomous);
                Ok(())
            }
        }
    }

    /// Drop the master; every player becomes autonomous and resumes
    /// independent advancement.
    pub fn clear_master(&self) {
        let mut inner = self.inner.lock();
        let demote: Vec<PlayerId> = inner
            .roles
            .iter()
            .filter(|(_, role)| **role != SyncRole::Autonomous)
            .map(|(id, _)| *id)
            .collect();
        for id in demote {
            inner.assign(id, SyncRole::Autonomous);
        }
        if let Some(master) = inner.master.take() {
            info!("Master {} cleared", master);
        }
    }

    /// Send every slave to playlist entry `index`; returns how many were told.
    pub fn sync_slaves_to_master(&self, index: usize) -> usize {
        let inner = self.inner.lock();
        let mut count = 0;
        for (id, role) in &inner.roles {
            if *role != SyncRole::Slave {
                continue;
            }
            let Some(runner) = inner.runners.get(id) else {
                continue;
            };
            match runner.handle().send(PlayerCommand::SyncToMaster(index)) {
                Ok(()) => count += 1,
                Err(e) => warn!("Player {}: sync not delivered: {}", id, e),
            }
        }
        debug!("Synced {} slaves to clip {}", count, index);
        count
    }

    /// React to a show event; true if it triggered a slave sync.
    pub fn handle_event(&self, event: &ShowEvent) -> bool {
        let ShowEvent::ClipChanged {
            player, clip_index, ..
        } = event
        else {
            return false;
        };
        if self.master() != Some(*player) {
            return false;
        }
        self.sync_slaves_to_master(*clip_index);
        true
    }

    pub fn statuses(&self) -> Vec<PlayerStatus> {
        self.handles().iter().map(PlayerHandle::status).collect()
    }

    /// Stop every player thread.
    pub fn shutdown(&self) {
        let runners: Vec<PlayerRunner> = {
            let mut inner = self.inner.lock();
            inner.master = None;
            inner.roles.clear();
            inner.runners.drain().map(|(_, r)| r).collect()
        };
        let count = runners.len();
        drop(runners);
        info!("Stopped {} players", count);
    }
}

/// Forwards master clip changes from the event bus to the manager
pub struct Synchronizer {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Synchronizer {
    const POLL: Duration = Duration::from_millis(50);

    pub fn spawn(manager: Arc<PlayerManager>, events: &EventBus) -> Result<Self> {
        let rx = events.subscribe();
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let thread = thread::Builder::new()
            .name("synchronizer".to_string())
            .spawn(move || {
                info!("Synchronizer started");
                while flag.load(Ordering::Relaxed) {
                    match rx.recv_timeout(Self::POLL) {
                        Ok(event) => {
                            manager.handle_event(&event);
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("Synchronizer stopped");
            })
            .map_err(|e| MediaError::Spawn(e.to_string()))?;

        Ok(Self {
            running,
            thread: Some(thread),
        })
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        self.stop();
    }
}
