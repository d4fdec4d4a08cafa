//! Multi-source refresh coordinator.
//!
//! One tokio task owns the [`ViewState`]. Realtime notifications, the poll
//! timer and user navigation all send [`CoordinatorCommand`]s into a single
//! channel; remote fetches run in spawned tasks and report back on a second
//! channel drained by the same loop, so the view state is never shared.
//!
//! Refreshes are coalesced per target and tagged with a sequence number taken
//! at issue time. A completion only renders if its number is ahead of what
//! the target last rendered.

use std::sync::Arc;

use reonika_shared::constants::CHANNEL_CAPACITY;
use reonika_shared::{ChatId, Clock, ConversationRecord, Message, MessageId, Result, UserId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::backend::Backend;
use crate::events::{emit_event, ViewEvent};
use crate::reconciler::ReadReconciler;
use crate::state::{ViewSnapshot, ViewState};

// ---------------------------------------------------------------------------
// Command types
// ---------------------------------------------------------------------------

/// What should be refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTarget {
    /// The conversation list, with previews and unread counts.
    Conversations,
    /// Messages of whichever chat is open.
    OpenChat,
    /// Messages of a specific chat; ignored unless that chat is open.
    Chat(ChatId),
}

/// Where a refresh request came from. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Realtime,
    Poll,
    Navigation,
}

/// Commands sent *into* the coordinator task.
#[derive(Debug)]
pub enum CoordinatorCommand {
    Refresh {
        target: RefreshTarget,
        trigger: RefreshTrigger,
    },
    /// Open a chat: optimistic read, fresh message load, remote read receipt.
    OpenChat(ChatId),
    CloseChat,
    /// Local lifecycle check: drop anything that expired since last render.
    Prune,
    /// A send succeeded remotely.
    MessageSent(Message),
    /// A delete succeeded remotely (or the message was already gone).
    MessageDeleted(MessageId),
    ChatDeleted(ChatId),
    Snapshot(oneshot::Sender<ViewSnapshot>),
    Shutdown,
}

/// Results flowing back from spawned fetch tasks.
#[derive(Debug)]
enum Completion {
    Conversations {
        seq: u64,
        result: Result<Vec<ConversationRecord>>,
    },
    Messages {
        seq: u64,
        chat_id: ChatId,
        result: Result<Vec<Message>>,
    },
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable sender side of the coordinator. Every trigger source holds one.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordinatorCommand>,
}

impl CoordinatorHandle {
    /// Send a command. Returns `false` once the coordinator has stopped.
    pub async fn send(&self, cmd: CoordinatorCommand) -> bool {
        self.tx.send(cmd).await.is_ok()
    }

    pub async fn refresh(&self, target: RefreshTarget, trigger: RefreshTrigger) -> bool {
        self.send(CoordinatorCommand::Refresh { target, trigger }).await
    }

    /// Refresh both the conversation list and the open chat.
    pub async fn refresh_all(&self, trigger: RefreshTrigger) -> bool {
        self.refresh(RefreshTarget::Conversations, trigger).await
            && self.refresh(RefreshTarget::OpenChat, trigger).await
    }

    pub async fn open_chat(&self, chat_id: ChatId) -> bool {
        self.send(CoordinatorCommand::OpenChat(chat_id)).await
    }

    pub async fn close_chat(&self) -> bool {
        self.send(CoordinatorCommand::CloseChat).await
    }

    pub async fn prune(&self) -> bool {
        self.send(CoordinatorCommand::Prune).await
    }

    pub async fn snapshot(&self) -> Option<ViewSnapshot> {
        let (tx, rx) = oneshot::channel();
        if !self.send(CoordinatorCommand::Snapshot(tx)).await {
            return None;
        }
        rx.await.ok()
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(CoordinatorCommand::Shutdown).await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Spawn the coordinator task.
///
/// View events are delivered on `view_tx`. Returns the command handle and the
/// task's join handle.
pub fn spawn_coordinator(
    backend: Arc<dyn Backend>,
    me: UserId,
    clock: Arc<dyn Clock>,
    view_tx: mpsc::Sender<ViewEvent>,
) -> (CoordinatorHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<CoordinatorCommand>(CHANNEL_CAPACITY);
    let (done_tx, done_rx) = mpsc::channel::<Completion>(CHANNEL_CAPACITY);

    let coordinator = Coordinator {
        reconciler: ReadReconciler::new(backend.clone(), me),
        backend,
        clock,
        state: ViewState::new(me),
        view_tx,
        done_tx,
        next_seq: 0,
    };

    let task = tokio::spawn(coordinator.run(cmd_rx, done_rx));
    (CoordinatorHandle { tx: cmd_tx }, task)
}

struct Coordinator {
    backend: Arc<dyn Backend>,
    reconciler: ReadReconciler,
    clock: Arc<dyn Clock>,
    state: ViewState,
    view_tx: mpsc::Sender<ViewEvent>,
    done_tx: mpsc::Sender<Completion>,
    next_seq: u64,
}

impl Coordinator {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<CoordinatorCommand>,
        mut done_rx: mpsc::Receiver<Completion>,
    ) {
        info!(user = %self.state.me(), "refresh coordinator started");

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(CoordinatorCommand::Shutdown) | None => break,
                        Some(cmd) => self.handle_command(cmd),
                    }
                }
                Some(done) = done_rx.recv() => self.handle_completion(done),
            }
        }

        info!(user = %self.state.me(), "refresh coordinator stopped");
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    fn handle_command(&mut self, cmd: CoordinatorCommand) {
        match cmd {
            CoordinatorCommand::Refresh { target, trigger } => self.request(target, trigger),
            CoordinatorCommand::OpenChat(chat_id) => self.open_chat(chat_id),
            CoordinatorCommand::CloseChat => {
                self.state.set_open_chat(None);
                debug!("chat closed");
            }
            CoordinatorCommand::Prune => self.prune(),
            CoordinatorCommand::MessageSent(message) => {
                let chat_id = message.chat_id;
                self.supersede_all();
                self.state.insert_sent(message);
                self.render_conversations();
                if self.state.open_chat() == Some(chat_id) {
                    self.render_messages(chat_id);
                }
                self.request(RefreshTarget::Conversations, RefreshTrigger::Navigation);
                self.request(RefreshTarget::Chat(chat_id), RefreshTrigger::Navigation);
            }
            CoordinatorCommand::MessageDeleted(id) => {
                self.supersede_all();
                if self.state.remove_message(id) {
                    self.render_conversations();
                    if let Some(chat_id) = self.state.open_chat() {
                        self.render_messages(chat_id);
                    }
                }
                self.request(RefreshTarget::Conversations, RefreshTrigger::Navigation);
                self.request(RefreshTarget::OpenChat, RefreshTrigger::Navigation);
            }
            CoordinatorCommand::ChatDeleted(chat_id) => {
                self.supersede_all();
                if self.state.remove_chat(chat_id) {
                    self.render_conversations();
                }
                self.request(RefreshTarget::Conversations, RefreshTrigger::Navigation);
            }
            CoordinatorCommand::Snapshot(reply) => {
                let _ = reply.send(self.state.snapshot(self.clock.now()));
            }
            CoordinatorCommand::Shutdown => {}
        }
    }

    /// Coalescing entry point for every trigger source.
    fn request(&mut self, target: RefreshTarget, trigger: RefreshTrigger) {
        match target {
            RefreshTarget::Conversations => {
                if self.state.conversations_slot.request() {
                    self.issue_conversations();
                } else {
                    trace!(?trigger, "conversation refresh coalesced");
                }
            }
            RefreshTarget::OpenChat | RefreshTarget::Chat(_) => {
                let Some(open) = self.state.open_chat() else {
                    return;
                };
                if let RefreshTarget::Chat(chat_id) = target {
                    if chat_id != open {
                        return;
                    }
                }
                if self.state.messages_slot.request() {
                    self.issue_messages(open);
                } else {
                    trace!(?trigger, chat = %open, "message refresh coalesced");
                }
            }
        }
    }

    fn open_chat(&mut self, chat_id: ChatId) {
        let now = self.clock.now();
        info!(chat = %chat_id, "opening chat");
        self.state.set_open_chat(Some(chat_id));

        // Optimistic: the chat counts as read the moment it is opened. A list
        // refresh already in flight still renders; its completion re-applies
        // the read to the open chat.
        if self.state.mark_read_locally(chat_id, now) {
            self.render_conversations();
        }

        // Navigation never waits behind a refresh for the previous chat.
        let seq = self.next_seq();
        self.state.messages_slot.force(seq);
        self.spawn_messages_fetch(seq, chat_id);

        self.reconciler.mark_read_in_background(chat_id);
    }

    fn prune(&mut self) {
        let (conversations_changed, messages_changed) = self.state.prune(self.clock.now());
        if conversations_changed {
            self.render_conversations();
        }
        if messages_changed {
            if let Some(chat_id) = self.state.open_chat() {
                self.render_messages(chat_id);
            }
        }
    }

    /// A local mutation is newer than anything already in flight.
    fn supersede_all(&mut self) {
        let seq = self.next_seq();
        self.state.conversations_slot.mark_rendered(seq);
        self.state.messages_slot.mark_rendered(seq);
    }

    // ------------------------------------------------------------------
    // Fetches
    // ------------------------------------------------------------------

    fn issue_conversations(&mut self) {
        let seq = self.next_seq();
        self.state.conversations_slot.begin(seq);

        let backend = self.backend.clone();
        let done_tx = self.done_tx.clone();
        let me = self.state.me();
        trace!(seq, "fetching conversations");
        tokio::spawn(async move {
            let result = backend.fetch_conversations(me).await;
            let _ = done_tx.send(Completion::Conversations { seq, result }).await;
        });
    }

    fn issue_messages(&mut self, chat_id: ChatId) {
        let seq = self.next_seq();
        self.state.messages_slot.begin(seq);
        self.spawn_messages_fetch(seq, chat_id);
    }

    fn spawn_messages_fetch(&self, seq: u64, chat_id: ChatId) {
        let backend = self.backend.clone();
        let done_tx = self.done_tx.clone();
        trace!(seq, chat = %chat_id, "fetching messages");
        tokio::spawn(async move {
            let result = backend.fetch_messages(chat_id).await;
            let _ = done_tx
                .send(Completion::Messages {
                    seq,
                    chat_id,
                    result,
                })
                .await;
        });
    }

    // ------------------------------------------------------------------
    // Completions
    // ------------------------------------------------------------------

    fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::Conversations { seq, result } => {
                match result {
                    Ok(records) => {
                        if self.state.apply_conversations(seq, records) {
                            // The open chat is on screen, so it is read.
                            if let Some(open) = self.state.open_chat() {
                                if self.state.mark_read_locally(open, self.clock.now()) {
                                    self.reconciler.mark_read_in_background(open);
                                }
                            }
                            self.render_conversations();
                        } else {
                            debug!(
                                seq,
                                rendered = self.state.conversations_slot.rendered(),
                                "dropped stale conversation refresh"
                            );
                        }
                    }
                    Err(e) => {
                        self.state.conversations_slot.finish(seq);
                        warn!(seq, error = %e, "conversation refresh failed");
                    }
                }
                if self.state.conversations_slot.take_pending() {
                    self.issue_conversations();
                }
            }
            Completion::Messages {
                seq,
                chat_id,
                result,
            } => {
                match result {
                    Ok(messages) => {
                        if self.state.apply_messages(seq, chat_id, messages) {
                            self.render_messages(chat_id);
                            self.reconcile_open_chat(chat_id);
                        } else {
                            debug!(
                                seq,
                                rendered = self.state.messages_slot.rendered(),
                                chat = %chat_id,
                                "dropped stale message refresh"
                            );
                        }
                    }
                    Err(e) => {
                        self.state.messages_slot.finish(seq);
                        warn!(seq, chat = %chat_id, error = %e, "message refresh failed");
                    }
                }
                if self.state.messages_slot.take_pending() {
                    if let Some(open) = self.state.open_chat() {
                        self.issue_messages(open);
                    }
                }
            }
        }
    }

    /// Messages may arrive while the chat is already open; read them too.
    fn reconcile_open_chat(&mut self, chat_id: ChatId) {
        let now = self.clock.now();
        if !self.state.open_chat_has_unread(now) {
            return;
        }
        self.state.mark_read_locally(chat_id, now);
        self.render_conversations();
        self.reconciler.mark_read_in_background(chat_id);
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    fn render_conversations(&mut self) {
        let now = self.clock.now();
        let conversations = self.state.conversations(now);
        emit_event(&self.view_tx, ViewEvent::ConversationsChanged { conversations });
        // A count the UI never received is offered again on the next render.
        for (chat_id, count) in self.state.unread_changes(now) {
            if emit_event(&self.view_tx, ViewEvent::UnreadCountChanged { chat_id, count }) {
                self.state.report_unread(chat_id, count);
            }
        }
    }

    fn render_messages(&self, chat_id: ChatId) {
        let messages = self.state.messages(self.clock.now());
        emit_event(&self.view_tx, ViewEvent::MessagesChanged { chat_id, messages });
    }
}
