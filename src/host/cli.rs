//! CLI host — stdin/stdout container for the chat widget.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tokio::task::JoinSet;

use super::{HELP_TEXT, HostCommand, TranscriptRenderer, status_line};
use crate::chatbot::{ChatController, WidgetEvent};
use crate::error::Error;

/// Reads commands and answers from stdin, prints the transcript to stdout.
///
/// Every action runs in its own task so typing stays possible while a
/// request is in flight; the controller refuses what it cannot accept.
pub struct CliHost {
    controller: Arc<ChatController>,
}

impl CliHost {
    pub fn new(controller: Arc<ChatController>) -> Self {
        Self { controller }
    }

    pub async fn run(self, open_on_start: bool) -> Result<(), Error> {
        self.run_with(BufReader::new(tokio::io::stdin()), open_on_start)
            .await
    }

    /// Drive the widget from `input` until EOF or `/quit`. Actions still in
    /// flight at that point are awaited and their output printed.
    pub async fn run_with<R>(self, input: R, open_on_start: bool) -> Result<(), Error>
    where
        R: AsyncBufRead + Unpin,
    {
        let events = self.controller.subscribe();
        let (stop, stopped) = oneshot::channel();
        let renderer = tokio::spawn(render_loop(Arc::clone(&self.controller), events, stopped));
        let mut actions = JoinSet::new();

        if open_on_start {
            self.spawn_set_open(&mut actions, true);
        } else {
            eprintln!("Chat is closed. Type /open to start.");
        }

        let mut lines = input.lines();

        let outcome = loop {
            while actions.try_join_next().is_some() {}

            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break Ok(()), // EOF
                Err(e) => {
                    tracing::error!("Error reading input: {}", e);
                    break Err(e.into());
                }
            };

            match HostCommand::parse(&line) {
                HostCommand::Quit => break Ok(()),
                HostCommand::Help => eprintln!("{HELP_TEXT}"),
                HostCommand::Unknown(cmd) => eprintln!("Unknown command {cmd}. Type /help."),
                HostCommand::Status => {
                    let snapshot = self.controller.snapshot().await;
                    eprintln!("ℹ️  {}", status_line(&snapshot));
                }
                HostCommand::Toggle => {
                    let controller = Arc::clone(&self.controller);
                    actions.spawn(async move {
                        controller.toggle_open().await;
                    });
                }
                HostCommand::Open => self.spawn_set_open(&mut actions, true),
                HostCommand::Close => self.spawn_set_open(&mut actions, false),
                HostCommand::Restart => {
                    let controller = Arc::clone(&self.controller);
                    actions.spawn(async move {
                        if !controller.start(true).await {
                            eprintln!("⏳ Still waiting for a reply...");
                        }
                    });
                }
                HostCommand::Answer(raw) => {
                    if !self.controller.snapshot().await.is_open {
                        eprintln!("Chat is closed. Type /open first.");
                        continue;
                    }
                    let controller = Arc::clone(&self.controller);
                    actions.spawn(async move {
                        if !controller.submit_answer(&raw).await {
                            let snapshot = controller.snapshot().await;
                            if snapshot.pending {
                                eprintln!("⏳ Still waiting for a reply...");
                            } else {
                                eprintln!("{} Type /restart to begin again.", snapshot.placeholder());
                            }
                        }
                    });
                }
            }
        };

        while actions.join_next().await.is_some() {}
        let _ = stop.send(());
        let _ = renderer.await;
        outcome
    }

    fn spawn_set_open(&self, actions: &mut JoinSet<()>, open: bool) {
        let controller = Arc::clone(&self.controller);
        actions.spawn(async move {
            if !controller.set_open(open).await {
                eprintln!("Chat is already {}.", if open { "open" } else { "closed" });
            }
        });
    }
}

/// Print transcript changes as they happen, then a final catch-up once
/// `stopped` fires.
async fn render_loop(
    controller: Arc<ChatController>,
    mut events: Receiver<WidgetEvent>,
    mut stopped: oneshot::Receiver<()>,
) {
    let mut renderer = TranscriptRenderer::new();

    loop {
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Ok(WidgetEvent::TranscriptChanged { .. }) | Err(RecvError::Lagged(_)) => {
                    print_new(&controller, &mut renderer).await;
                }
                Ok(WidgetEvent::VisibilityChanged { open }) => {
                    eprintln!("{}", if open { "💬 Chat opened" } else { "💬 Chat closed" });
                    // catch up on anything that arrived while closed
                    print_new(&controller, &mut renderer).await;
                }
                Ok(WidgetEvent::Completed { lead_captured }) => {
                    if lead_captured {
                        eprintln!("✅ Your details were received.");
                    }
                }
                Err(RecvError::Closed) => break,
            },
            _ = &mut stopped => {
                print_new(&controller, &mut renderer).await;
                break;
            }
        }
    }
}

/// A closed widget shows nothing; its messages are printed on reopen.
async fn print_new(controller: &ChatController, renderer: &mut TranscriptRenderer) {
    let snapshot = controller.snapshot().await;
    if !snapshot.is_open {
        return;
    }
    for line in renderer.render(&snapshot) {
        println!("{line}");
    }
}
