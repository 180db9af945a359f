//! Session controller: one cooperative task owning the session core.
//!
//! The host talks to the controller over a command channel and listens on a
//! single typed event channel; the controller selects over host commands,
//! transport events and the cursor flush tick, then pumps the session's
//! outbox to the wire. Leaving a room aborts the connector and drops the
//! transport link in one step.

use std::collections::BTreeSet;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use shared::{EditorState, ObjectId, Point, SceneAction};

use crate::config::CollabConfig;
use crate::connector::{self, TransportEvent, TransportLink};
use crate::session::{Session, SessionEvent};

/// Host → controller
#[derive(Debug)]
pub enum HostCommand {
    Dispatch(SceneAction),
    /// Connect to the configured room
    Enable,
    /// Leave the room and continue solo
    Disable,
    SetUserName(String),
    SetUserIcon(String),
    SetCursor(Option<Point>),
    SetSelection(BTreeSet<ObjectId>),
    Shutdown,
}

/// Host-side handle to a running session controller
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<HostCommand>,
    /// Typed session events; the host owns the receiving end
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn dispatch(&self, action: SceneAction) {
        let _ = self.commands.send(HostCommand::Dispatch(action));
    }

    pub fn enable(&self) {
        let _ = self.commands.send(HostCommand::Enable);
    }

    pub fn disable(&self) {
        let _ = self.commands.send(HostCommand::Disable);
    }

    pub fn set_user_name(&self, name: impl Into<String>) {
        let _ = self.commands.send(HostCommand::SetUserName(name.into()));
    }

    pub fn set_user_icon(&self, icon: impl Into<String>) {
        let _ = self.commands.send(HostCommand::SetUserIcon(icon.into()));
    }

    pub fn set_local_cursor(&self, cursor: Option<Point>) {
        let _ = self.commands.send(HostCommand::SetCursor(cursor));
    }

    pub fn set_local_selection(&self, selection: BTreeSet<ObjectId>) {
        let _ = self.commands.send(HostCommand::SetSelection(selection));
    }

    /// Stop the controller and tear everything down. The returned handle
    /// resolves once teardown has finished.
    pub fn shutdown(self) -> JoinHandle<()> {
        let _ = self.commands.send(HostCommand::Shutdown);
        self.task
    }
}

/// Owns the session core and its transport for one room
pub struct SessionController {
    config: CollabConfig,
    session: Session,
    commands: mpsc::UnboundedReceiver<HostCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
    link: Option<TransportLink>,
    connector: Option<JoinHandle<()>>,
}

impl SessionController {
    /// Spawn the controller task; the handle is the host's whole API
    pub fn spawn(config: CollabConfig, initial: EditorState) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let controller = SessionController {
            config,
            session: Session::with_state(initial),
            commands: command_rx,
            events: event_tx,
            link: None,
            connector: None,
        };
        let task = tokio::spawn(controller.run());
        SessionHandle {
            commands: command_tx,
            events: event_rx,
            task,
        }
    }

    async fn run(mut self) {
        let mut cursor_tick = tokio::time::interval(std::time::Duration::from_millis(16));
        cursor_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        None | Some(HostCommand::Shutdown) => break,
                        Some(command) => self.handle_command(command),
                    }
                }
                event = recv_transport(&mut self.link), if self.link.is_some() => {
                    match event {
                        Some(event) => self.handle_transport(event),
                        None => {
                            // Connector died; drop the dead link so Enable
                            // can spawn a fresh one, keep the doc
                            self.connector = None;
                            self.link = None;
                            self.session.transport_down();
                        }
                    }
                }
                _ = cursor_tick.tick() => {
                    self.session.flush_cursor(Instant::now());
                }
            }
            self.pump();
        }
        self.teardown();
    }

    fn handle_command(&mut self, command: HostCommand) {
        match command {
            HostCommand::Dispatch(action) => self.session.dispatch(action),
            HostCommand::Enable => {
                if self.connector.is_none() {
                    let (link, task) = connector::spawn(self.config.clone());
                    self.link = Some(link);
                    self.connector = Some(task);
                    self.session.begin_connecting();
                }
            }
            HostCommand::Disable => self.drop_transport(true),
            HostCommand::SetUserName(name) => self.session.set_user_name(name),
            HostCommand::SetUserIcon(icon) => self.session.set_user_icon(icon),
            HostCommand::SetCursor(cursor) => {
                self.session.set_local_cursor(cursor, Instant::now())
            }
            HostCommand::SetSelection(selection) => {
                self.session.set_local_selection(selection)
            }
            // Shutdown is intercepted in `run` before `handle_command` is
            // ever called, so it cannot arrive here.
            HostCommand::Shutdown => unreachable!("Shutdown handled in run loop"),
        }
    }

    fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Up => {} // Welcome does the real work
            TransportEvent::Message(msg) => self.session.handle_message(msg),
            TransportEvent::Down => self.session.transport_down(),
        }
    }

    /// Drain the session's outbox to the wire and its events to the host
    fn pump(&mut self) {
        for msg in self.session.take_outbox() {
            if let Some(link) = &self.link {
                let _ = link.outbound.send(msg);
            }
        }
        for event in self.session.take_events() {
            let _ = self.events.send(event);
        }
    }

    /// Tear down log observer and presence subscription in one step
    fn drop_transport(&mut self, leave: bool) {
        if let Some(task) = self.connector.take() {
            task.abort();
        }
        self.link = None;
        if leave {
            self.session.leave();
        }
    }

    fn teardown(&mut self) {
        self.drop_transport(false);
        self.pump();
    }
}

async fn recv_transport(link: &mut Option<TransportLink>) -> Option<TransportEvent> {
    match link {
        Some(link) => link.inbound.recv().await,
        None => None,
    }
}
