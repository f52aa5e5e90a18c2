//! Timer-driven event loop feeding the coordinator.
//!
//! The loop owns the refresh timer and a trigger inbox. Triggers are
//! submitted on the loop thread, in arrival order, and then handed to a
//! fixed pool of workers so a slow view never delays the others. Tickets
//! queued behind a newer one for the same view finish quickly as superseded.
//! Stopping the loop waits for the workers to drain. Every outcome is
//! published on the handle's update channel.

use crate::coordinator::{Coordinator, Ticket, Trigger, ViewUpdate};
use crate::engine::EngineError;
use crossbeam_channel::{select, tick, unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often the loop re-checks the running flag while idle.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Tickets computed at once; one per view.
const WORKERS: usize = 3;

/// Something the dashboard loop reports.
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardEvent {
    /// A trigger was handled
    Update(ViewUpdate),
    /// A trigger was rejected before any view was touched
    Rejected { trigger: Trigger, error: EngineError },
}

/// Configuration for the dashboard loop.
pub struct Dashboard {
    coordinator: Arc<Coordinator>,
    refresh_interval: Duration,
    running: Arc<AtomicBool>,
}

impl Dashboard {
    pub fn new(coordinator: Arc<Coordinator>, refresh_interval: Duration) -> Self {
        Self {
            coordinator,
            refresh_interval,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Use an externally owned running flag (e.g. one cleared by Ctrl+C).
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    /// Start the loop on its own thread.
    ///
    /// An initial tick is issued immediately so every view is populated
    /// without waiting a full refresh interval.
    pub fn spawn(self) -> DashboardHandle {
        let (trigger_tx, trigger_rx) = unbounded::<Trigger>();
        let (event_tx, event_rx) = unbounded::<DashboardEvent>();
        let running = self.running.clone();

        let join = thread::spawn(move || self.run(trigger_rx, event_tx));

        DashboardHandle {
            triggers: trigger_tx,
            events: event_rx,
            running,
            join: Some(join),
        }
    }

    fn run(self, triggers: Receiver<Trigger>, events: Sender<DashboardEvent>) {
        let ticker = tick(self.refresh_interval);
        let (ticket_tx, ticket_rx) = unbounded::<Ticket>();
        let workers: Vec<JoinHandle<()>> = (0..WORKERS)
            .map(|_| {
                let coordinator = self.coordinator.clone();
                let tickets = ticket_rx.clone();
                let events = events.clone();
                thread::spawn(move || {
                    for ticket in tickets {
                        let update = coordinator.run(ticket);
                        let _ = events.send(DashboardEvent::Update(update));
                    }
                })
            })
            .collect();
        drop(ticket_rx);

        tracing::info!(
            "Dashboard loop started (refresh every {}s, {} workers)",
            self.refresh_interval.as_secs_f64(),
            WORKERS
        );

        self.dispatch(Trigger::Tick, &ticket_tx, &events);

        while self.running.load(Ordering::SeqCst) {
            select! {
                recv(ticker) -> _ => self.dispatch(Trigger::Tick, &ticket_tx, &events),
                recv(triggers) -> msg => match msg {
                    Ok(trigger) => self.dispatch(trigger, &ticket_tx, &events),
                    Err(_) => break,
                },
                default(IDLE_POLL) => {}
            }
        }

        // Closing the queue lets each worker finish what is left and exit.
        drop(ticket_tx);
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!("Dashboard worker panicked");
            }
        }

        tracing::info!("Dashboard loop stopped");
    }

    fn dispatch(
        &self,
        trigger: Trigger,
        tickets: &Sender<Ticket>,
        events: &Sender<DashboardEvent>,
    ) {
        match self.coordinator.submit(trigger) {
            Ok(ticket) => {
                let _ = tickets.send(ticket);
            }
            Err(error) => {
                tracing::warn!("Rejected trigger {:?}: {}", trigger, error);
                let _ = events.send(DashboardEvent::Rejected { trigger, error });
            }
        }
    }
}

/// Handle to a running dashboard loop.
pub struct DashboardHandle {
    triggers: Sender<Trigger>,
    events: Receiver<DashboardEvent>,
    running: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl DashboardHandle {
    /// Queue a trigger for the loop.
    pub fn trigger(&self, trigger: Trigger) {
        // Only fails once the loop has exited, at which point there is
        // nothing left to update.
        let _ = self.triggers.send(trigger);
    }

    /// Events published by the loop.
    pub fn events(&self) -> &Receiver<DashboardEvent> {
        &self.events
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the loop and wait for it and its workers to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::error!("Dashboard loop panicked");
            }
        }
    }
}

impl Drop for DashboardHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
