//! Actor handle around a [`DispatchSession`].
//!
//! The session lives in its own task and processes commands one at a time, so two plans
//! requested back to back are queued, never interleaved.

use std::collections::BTreeSet;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::assignment::AssignReport;
use crate::error::DispatchError;
use crate::geometry::RoutePath;
use crate::model::{Assignment, Category, CollectionPointId, FillThreshold, TourId};
use crate::session::DispatchSession;
use crate::state::DispatchState;

const COMMAND_BUFFER: usize = 32;

type Reply<T> = oneshot::Sender<Result<T, DispatchError>>;

enum Command {
    Start(Reply<()>),
    LoadInProgress(Reply<usize>),
    Plan {
        categories: BTreeSet<Category>,
        threshold: FillThreshold,
        reply: Reply<usize>,
    },
    AssignOne {
        tour: TourId,
        reply: Reply<Vec<Assignment>>,
    },
    AssignAll(Reply<AssignReport>),
    DiscardAll(Reply<usize>),
    DiscardOne {
        tour: TourId,
        reply: Reply<()>,
    },
    TerminatePlanning(Reply<usize>),
    Focus {
        index: usize,
        reply: Reply<()>,
    },
    SelectStop {
        tour_index: usize,
        collection_point: CollectionPointId,
        reply: Reply<()>,
    },
    ClearSelection(Reply<()>),
    RoutePath {
        index: usize,
        reply: Reply<Option<RoutePath>>,
    },
    PruneNotices,
    Shutdown,
}

/// Cloneable entry point for the render layer: read-only snapshots plus commands.
#[derive(Clone, Debug)]
pub struct DispatchHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<DispatchState>,
}

impl DispatchHandle {
    /// Move `session` into a new task and return a handle to it.
    #[must_use]
    pub fn spawn(session: DispatchSession) -> (Self, JoinHandle<()>) {
        let (commands, inbox) = mpsc::channel(COMMAND_BUFFER);
        let state = session.subscribe();
        let task = tokio::spawn(run(session, inbox));
        (Self { commands, state }, task)
    }

    /// Receiver notified after every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DispatchState> {
        self.state.clone()
    }

    /// Latest published state.
    #[must_use]
    pub fn snapshot(&self) -> DispatchState {
        self.state.borrow().clone()
    }

    /// See [`DispatchSession::start`].
    ///
    /// # Errors
    ///
    /// Returns the session error, or [`DispatchError::SessionClosed`].
    pub async fn start(&self) -> Result<(), DispatchError> {
        self.request(Command::Start).await
    }

    /// See [`DispatchSession::load_in_progress`].
    ///
    /// # Errors
    ///
    /// Returns the session error, or [`DispatchError::SessionClosed`].
    pub async fn load_in_progress(&self) -> Result<usize, DispatchError> {
        self.request(Command::LoadInProgress).await
    }

    /// See [`DispatchSession::plan`].
    ///
    /// # Errors
    ///
    /// Returns the session error, or [`DispatchError::SessionClosed`].
    pub async fn plan(
        &self,
        categories: BTreeSet<Category>,
        threshold: FillThreshold,
    ) -> Result<usize, DispatchError> {
        self.request(|reply| Command::Plan {
            categories,
            threshold,
            reply,
        })
        .await
    }

    /// See [`DispatchSession::assign_one`].
    ///
    /// # Errors
    ///
    /// Returns the session error, or [`DispatchError::SessionClosed`].
    pub async fn assign_one(&self, tour: TourId) -> Result<Vec<Assignment>, DispatchError> {
        self.request(|reply| Command::AssignOne { tour, reply }).await
    }

    /// See [`DispatchSession::assign_all`].
    ///
    /// # Errors
    ///
    /// Returns the session error, or [`DispatchError::SessionClosed`].
    pub async fn assign_all(&self) -> Result<AssignReport, DispatchError> {
        self.request(Command::AssignAll).await
    }

    /// See [`DispatchSession::discard_all`].
    ///
    /// # Errors
    ///
    /// Returns the session error, or [`DispatchError::SessionClosed`].
    pub async fn discard_all(&self) -> Result<usize, DispatchError> {
        self.request(Command::DiscardAll).await
    }

    /// See [`DispatchSession::discard_one`].
    ///
    /// # Errors
    ///
    /// Returns the session error, or [`DispatchError::SessionClosed`].
    pub async fn discard_one(&self, tour: TourId) -> Result<(), DispatchError> {
        self.request(|reply| Command::DiscardOne { tour, reply }).await
    }

    /// See [`DispatchSession::terminate_planning`].
    ///
    /// # Errors
    ///
    /// Returns the session error, or [`DispatchError::SessionClosed`].
    pub async fn terminate_planning(&self) -> Result<usize, DispatchError> {
        self.request(Command::TerminatePlanning).await
    }

    /// See [`DispatchSession::focus`].
    ///
    /// # Errors
    ///
    /// Returns the session error, or [`DispatchError::SessionClosed`].
    pub async fn focus(&self, index: usize) -> Result<(), DispatchError> {
        self.request(|reply| Command::Focus { index, reply }).await
    }

    /// See [`DispatchSession::select_stop`].
    ///
    /// # Errors
    ///
    /// Returns the session error, or [`DispatchError::SessionClosed`].
    pub async fn select_stop(
        &self,
        tour_index: usize,
        collection_point: CollectionPointId,
    ) -> Result<(), DispatchError> {
        self.request(|reply| Command::SelectStop {
            tour_index,
            collection_point,
            reply,
        })
        .await
    }

    /// See [`DispatchSession::clear_selection`].
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::SessionClosed`].
    pub async fn clear_selection(&self) -> Result<(), DispatchError> {
        self.request(Command::ClearSelection).await
    }

    /// See [`DispatchSession::route_path`].
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::SessionClosed`].
    pub async fn route_path(&self, index: usize) -> Result<Option<RoutePath>, DispatchError> {
        self.request(|reply| Command::RoutePath { index, reply })
            .await
    }

    /// Ask the session to drop an expired notice. Fire and forget.
    pub fn prune_notices(&self) {
        if self.commands.try_send(Command::PruneNotices).is_err() {
            debug!("notice pruning skipped, session busy or closed");
        }
    }

    /// Stop the session task. Queued commands still run; later ones fail with
    /// [`DispatchError::SessionClosed`].
    pub async fn shutdown(&self) {
        if self.commands.send(Command::Shutdown).await.is_err() {
            debug!("session already closed");
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, DispatchError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_closed| DispatchError::SessionClosed)?;
        response
            .await
            .map_err(|_dropped| DispatchError::SessionClosed)?
    }
}

fn respond<T>(reply: oneshot::Sender<T>, value: T) {
    if reply.send(value).is_err() {
        debug!("caller dropped before the reply");
    }
}

async fn run(mut session: DispatchSession, mut inbox: mpsc::Receiver<Command>) {
    info!("dispatch session running");
    while let Some(command) = inbox.recv().await {
        match command {
            Command::Start(reply) => respond(reply, session.start().await),
            Command::LoadInProgress(reply) => respond(reply, session.load_in_progress().await),
            Command::Plan {
                categories,
                threshold,
                reply,
            } => respond(reply, session.plan(&categories, threshold).await),
            Command::AssignOne { tour, reply } => respond(reply, session.assign_one(&tour).await),
            Command::AssignAll(reply) => respond(reply, session.assign_all().await),
            Command::DiscardAll(reply) => respond(reply, session.discard_all().await),
            Command::DiscardOne { tour, reply } => {
                respond(reply, session.discard_one(&tour).await);
            }
            Command::TerminatePlanning(reply) => {
                respond(reply, session.terminate_planning().await);
            }
            Command::Focus { index, reply } => respond(reply, session.focus(index)),
            Command::SelectStop {
                tour_index,
                collection_point,
                reply,
            } => respond(reply, session.select_stop(tour_index, &collection_point)),
            Command::ClearSelection(reply) => {
                session.clear_selection();
                respond(reply, Ok(()));
            }
            Command::RoutePath { index, reply } => respond(reply, Ok(session.route_path(index))),
            Command::PruneNotices => session.prune_notices(),
            Command::Shutdown => break,
        }
    }
    info!("dispatch session closed");
}
