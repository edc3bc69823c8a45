//! Connectivity monitor.
//!
//! Two states, edge-triggered: [`ConnectivityMonitor::set_reachable`] only
//! emits when the state actually changes, so subscribers see each transition
//! exactly once no matter how often the runtime repeats its signal.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Edge subscribers that fall further behind than this see a lag error and
/// resynchronize from the current state.
const EDGE_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable {
            Connectivity::Online
        } else {
            Connectivity::Offline
        }
    }
}

/// A transition between connectivity states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Offline → Online
    Online,
    /// Online → Offline
    Offline,
}

#[derive(Debug)]
pub struct ConnectivityMonitor {
    state: Mutex<Connectivity>,
    edges: broadcast::Sender<Edge>,
}

impl ConnectivityMonitor {
    /// Start from the runtime's current reachability signal.
    pub fn new(reachable: bool) -> Self {
        let (edges, _) = broadcast::channel(EDGE_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(Connectivity::from_reachable(reachable)),
            edges,
        }
    }

    pub fn new_shared(reachable: bool) -> Arc<Self> {
        Arc::new(Self::new(reachable))
    }

    pub fn state(&self) -> Connectivity {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_online(&self) -> bool {
        self.state() == Connectivity::Online
    }

    /// Feed a reachability signal. Returns the edge it produced, if any.
    pub fn set_reachable(&self, reachable: bool) -> Option<Edge> {
        let next = Connectivity::from_reachable(reachable);
        let edge = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state == next {
                return None;
            }
            *state = next;
            match next {
                Connectivity::Online => Edge::Online,
                Connectivity::Offline => Edge::Offline,
            }
        };

        match edge {
            Edge::Online => tracing::info!("Connectivity restored"),
            Edge::Offline => tracing::warn!("Connectivity lost"),
        }
        // No subscribers is fine.
        let _ = self.edges.send(edge);
        Some(edge)
    }

    /// Receive every future edge.
    pub fn subscribe(&self) -> broadcast::Receiver<Edge> {
        self.edges.subscribe()
    }
}

/// Source of the "currently reachable" signal.
#[async_trait]
pub trait Reachability: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Periodically probe reachability and feed the monitor.
///
/// The first probe runs immediately.
pub fn spawn_probe<P>(
    monitor: Arc<ConnectivityMonitor>,
    probe: Arc<P>,
    interval: Duration,
) -> JoinHandle<()>
where
    P: Reachability + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let reachable = probe.is_reachable().await;
            monitor.set_reachable(reachable);
        }
    })
}
