// Copyright 2024 Saorsa Labs Ltd.
//
// This Saorsa Network Software is licensed under the General Public License (GPL), version 3.
// Please see the file LICENSE-GPL, or visit <http://www.gnu.org/licenses/> for the full text.
//
// Full details available at https://saorsalabs.com/licenses

//! Tokio event loop around [`Dashboard`]
//!
//! The [`Driver`] owns the core and runs a single `select!` loop over the
//! core's next timeout, completed requests, user commands and shutdown. Each
//! request runs in its own task; its timeout is enforced here as well, so a
//! misbehaving [`Fetcher`] cannot keep a request outstanding forever. A task
//! that panics is reported to the core as a failed request.

use std::future;
use std::sync::Arc;

use rand::Rng;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tokio::task::{self, JoinSet};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dashboard::Dashboard;
use crate::error::{CommandError, FetchError};
use crate::event::{Command, Event, Request, Response};
use crate::fetch::{self, Fetcher};

/// Receives everything the dashboard wants shown
pub trait Renderer {
    /// Show an event
    fn render(&mut self, event: Event);

    /// A command could not be applied
    fn command_failed(&mut self, command: &Command, error: &CommandError) {
        let _ = (command, error);
    }
}

impl Renderer for mpsc::UnboundedSender<Event> {
    fn render(&mut self, event: Event) {
        // the receiving side going away only means nobody is watching
        let _ = self.send(event);
    }
}

impl Renderer for Vec<Event> {
    fn render(&mut self, event: Event) {
        self.push(event);
    }
}

/// Runs a [`Dashboard`] against a [`Fetcher`]
pub struct Driver<F, V, R = rand::rngs::StdRng> {
    dashboard: Dashboard<R>,
    fetcher: Arc<F>,
    renderer: V,
    commands: Option<mpsc::Receiver<Command>>,
    shutdown: CancellationToken,
}

impl<F, V, R> std::fmt::Debug for Driver<F, V, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("commands", &self.commands.is_some())
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<F, V, R> Driver<F, V, R>
where
    F: Fetcher,
    V: Renderer,
    R: Rng,
{
    /// Create a driver; nothing runs until [`run`](Self::run)
    pub fn new(dashboard: Dashboard<R>, fetcher: Arc<F>, renderer: V) -> Self {
        Self {
            dashboard,
            fetcher,
            renderer,
            commands: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Accept user commands from `commands`
    pub fn with_commands(mut self, commands: mpsc::Receiver<Command>) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Token that stops [`run`](Self::run) when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until the shutdown token is cancelled
    ///
    /// Requests still in flight are aborted. Returns the core and the
    /// renderer.
    pub async fn run(mut self) -> (Dashboard<R>, V) {
        info!("dashboard driver started");
        self.dashboard.start();
        let mut tasks = Tasks::default();

        loop {
            self.flush(&mut tasks);

            let deadline = self.dashboard.poll_timeout().map(Instant::from_std);
            let timer = async {
                match deadline {
                    Some(deadline) => time::sleep_until(deadline).await,
                    None => future::pending().await,
                }
            };
            let commands = &mut self.commands;
            let command = async {
                match commands.as_mut() {
                    Some(commands) => commands.recv().await,
                    None => future::pending().await,
                }
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = timer => {
                    self.dashboard.handle_timeout(Instant::now().into_std());
                }
                Some(joined) = tasks.set.join_next_with_id() => {
                    if let Some(response) = tasks.finish(joined) {
                        self.dashboard.handle_response(Instant::now().into_std(), response);
                    }
                }
                command = command => match command {
                    Some(command) => self.command(command),
                    None => {
                        debug!("command channel closed");
                        self.commands = None;
                    }
                },
            }
        }

        tasks.set.abort_all();
        info!("dashboard driver stopped");
        (self.dashboard, self.renderer)
    }

    fn command(&mut self, command: Command) {
        if let Err(error) = self
            .dashboard
            .handle_command(Instant::now().into_std(), command.clone())
        {
            warn!(?command, %error, "command rejected");
            self.renderer.command_failed(&command, &error);
        }
    }

    /// Start every queued request and render every queued event
    fn flush(&mut self, tasks: &mut Tasks) {
        while let Some(request) = self.dashboard.poll_request() {
            let fetcher = self.fetcher.clone();
            let spawned = request.clone();
            let handle = tasks.set.spawn(async move {
                let limit = spawned.timeout();
                match time::timeout(limit, fetch::execute(&*fetcher, spawned.clone())).await {
                    Ok(response) => response,
                    Err(_) => spawned.fail(FetchError::RequestTimeout),
                }
            });
            tasks.requests.insert(handle.id(), request);
        }

        while let Some(event) = self.dashboard.poll_event() {
            self.renderer.render(event);
        }
    }
}

/// Request tasks in flight, with the request each one performs
#[derive(Default)]
struct Tasks {
    set: JoinSet<Response>,
    requests: FxHashMap<task::Id, Request>,
}

impl Tasks {
    /// Settle a joined task; a task that did not finish fails its request
    fn finish(&mut self, joined: Result<(task::Id, Response), task::JoinError>) -> Option<Response> {
        match joined {
            Ok((id, response)) => {
                self.requests.remove(&id);
                Some(response)
            }
            Err(error) => {
                warn!(%error, "request task failed");
                let request = self.requests.remove(&error.id())?;
                Some(request.fail(FetchError::Network("request task failed".into())))
            }
        }
    }
}
