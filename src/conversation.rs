//! # Conversation Controller
//!
//! Owns the in-memory view of the active session and mediates between user
//! commands, the [`SessionStore`], the [`CredentialVault`] and a
//! [`CompletionClient`].
//!
//! ## States
//!
//! ```text
//!            select_session / first successful submit
//!   ┌───────┐ ─────────────────────────────────────────► ┌─────────┐
//!   │  New  │                                            │  Bound  │
//!   └───────┘ ◄───────────────────────────────────────── └─────────┘
//!            start_new_session / active session deleted
//! ```
//!
//! - **New**: no session id, empty history.
//! - **Bound**: session id set, history mirrors the stored log.
//!
//! ## Submitting
//!
//! [`ConversationController::submit_prompt`] validates, sends history plus the
//! new user turn, and only after a reply arrives records the exchange with
//! [`SessionStore::record_exchange`] (creating the session if none is bound) and
//! extends the history. The store write is a single transaction, so any failure,
//! including one while storing, leaves the history and the store exactly as they
//! were and keeps the prompt as
//! [`pending_prompt`](ConversationController::pending_prompt) for a retry.
//!
//! Methods take `&mut self`, so results are applied one at a time and in order.

use std::{future::Future, io};

use tracing::{debug, info, warn};

use crate::{
    api::{ChatTurn, CompletionClient, CompletionRequest, Role},
    error::{ChatError, Result},
    models::ChatSession,
    session_store::SessionStore,
    vault::CredentialVault,
};

/// Maximum length (in characters) of a session name derived from a prompt.
pub const SESSION_NAME_LEN: usize = 60;

/// Default display name for a session started by `prompt`: its first 60 characters.
pub fn default_session_name(prompt: &str) -> String {
    prompt.chars().take(SESSION_NAME_LEN).collect()
}

/// Turn a signal listener (e.g. `tokio::signal::ctrl_c()`) into a cancellation
/// future for [`ConversationController::submit_prompt_cancellable`].
///
/// If the listener cannot be installed the returned future never resolves, so
/// requests simply cannot be cancelled.
pub async fn until_signalled<F>(signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(err) = signal.await {
        warn!("Cannot listen for interrupts, requests are not cancellable: {}", err);
        std::future::pending::<()>().await;
    }
}

/// Result of a successful submission, ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub session_id: String,
    pub session_name: String,
    pub model: String,
    /// Assistant reply as Markdown.
    pub content: String,
}

/// A user action, independent of any particular front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Submit { prompt: String, model: String },
    SelectSession { session_id: String },
    NewSession,
    RenameSession { session_id: String, name: String },
    DeleteSession { session_id: String },
    ListSessions,
    SaveCredential { secret: String },
}

/// What a [`ChatCommand`] produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatOutcome {
    Reply(Submission),
    Selected {
        session: ChatSession,
        history: Vec<ChatTurn>,
    },
    Cleared,
    Renamed,
    Deleted,
    Sessions(Vec<ChatSession>),
    CredentialSaved,
}

/// State holder for the active conversation.
pub struct ConversationController<C> {
    client: C,
    sessions: SessionStore,
    vault: CredentialVault,
    session_id: Option<String>,
    session_name: Option<String>,
    history: Vec<ChatTurn>,
    pending_prompt: Option<String>,
    last_markdown: Option<String>,
}

impl<C: CompletionClient> ConversationController<C> {
    /// A controller in the New state.
    pub fn new(client: C, sessions: SessionStore, vault: CredentialVault) -> Self {
        Self {
            client,
            sessions,
            vault,
            session_id: None,
            session_name: None,
            history: Vec::new(),
            pending_prompt: None,
            last_markdown: None,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn session_name(&self) -> Option<&str> {
        self.session_name.as_deref()
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    /// Prompt that was submitted but has not produced a stored reply yet.
    pub fn pending_prompt(&self) -> Option<&str> {
        self.pending_prompt.as_deref()
    }

    /// Raw Markdown of the most recent reply (for "copy all").
    pub fn last_markdown(&self) -> Option<&str> {
        self.last_markdown.as_deref()
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Dispatch a typed command.
    pub async fn handle(&mut self, command: ChatCommand) -> Result<ChatOutcome> {
        match command {
            ChatCommand::Submit { prompt, model } => {
                self.submit_prompt(&prompt, &model).await.map(ChatOutcome::Reply)
            }
            ChatCommand::SelectSession { session_id } => {
                self.select_session(&session_id)?;
                let session = ChatSession {
                    id: session_id,
                    name: self.session_name.clone().unwrap_or_default(),
                };
                Ok(ChatOutcome::Selected {
                    session,
                    history: self.history.clone(),
                })
            }
            ChatCommand::NewSession => {
                self.start_new_session();
                Ok(ChatOutcome::Cleared)
            }
            ChatCommand::RenameSession { session_id, name } => {
                self.rename_session(&session_id, &name)?;
                Ok(ChatOutcome::Renamed)
            }
            ChatCommand::DeleteSession { session_id } => {
                self.delete_session(&session_id)?;
                Ok(ChatOutcome::Deleted)
            }
            ChatCommand::ListSessions => Ok(ChatOutcome::Sessions(self.sessions.list_sessions()?)),
            ChatCommand::SaveCredential { secret } => {
                self.save_credential(&secret)?;
                Ok(ChatOutcome::CredentialSaved)
            }
        }
    }

    /// Send `prompt` with the current history to `model` and record the exchange.
    ///
    /// # Errors
    /// - [`ChatError::Configuration`] when no usable credential is stored.
    /// - [`ChatError::Validation`] when the prompt is blank.
    /// - [`ChatError::RequestFailure`] when the completion call fails.
    /// - [`ChatError::Storage`] when the exchange could not be recorded.
    ///
    /// None of these change the history, the binding or the store.
    pub async fn submit_prompt(&mut self, prompt: &str, model: &str) -> Result<Submission> {
        let request = self.prepare(prompt, model)?;
        let reply = self.client.complete(&request).await?;
        self.commit(prompt, model, reply)
    }

    /// Like [`submit_prompt`](Self::submit_prompt), but gives up with
    /// [`ChatError::Cancelled`] if `cancel` completes before the reply arrives.
    pub async fn submit_prompt_cancellable<F>(
        &mut self,
        prompt: &str,
        model: &str,
        cancel: F,
    ) -> Result<Submission>
    where
        F: Future<Output = ()>,
    {
        let request = self.prepare(prompt, model)?;

        let reply = tokio::select! {
            biased;
            _ = cancel => {
                info!("Completion cancelled before a reply arrived");
                return Err(ChatError::Cancelled);
            }
            reply = self.client.complete(&request) => reply?,
        };

        self.commit(prompt, model, reply)
    }

    /// Bind `session_id` and rebuild the history from the store.
    ///
    /// Any pending prompt is discarded.
    pub fn select_session(&mut self, session_id: &str) -> Result<()> {
        let session = self
            .sessions
            .get_session(session_id)?
            .ok_or_else(|| ChatError::NotFound(format!("session {session_id}")))?;
        let messages = self.sessions.load_messages(session_id)?;

        self.history = messages.iter().map(|m| m.to_turn()).collect();
        self.session_id = Some(session.id);
        self.session_name = Some(session.name);
        self.pending_prompt = None;
        self.last_markdown = self
            .history
            .iter()
            .rev()
            .find(|turn| turn.role == Role::Assistant)
            .map(|turn| turn.content.clone());

        debug!(
            "Selected session {} with {} turns",
            session_id,
            self.history.len()
        );
        Ok(())
    }

    /// Return to the New state. Nothing durable is deleted.
    pub fn start_new_session(&mut self) {
        self.session_id = None;
        self.session_name = None;
        self.history.clear();
        self.pending_prompt = None;
        self.last_markdown = None;
    }

    /// Return to the New state if `session_id` is the bound session.
    pub fn delete_active_if_matching(&mut self, session_id: &str) {
        if self.session_id.as_deref() == Some(session_id) {
            debug!("Active session {} was deleted", session_id);
            self.start_new_session();
        }
    }

    /// Rename a session, keeping the bound display name in sync.
    pub fn rename_session(&mut self, session_id: &str, name: &str) -> Result<()> {
        self.sessions.rename_session(session_id, name)?;
        if self.session_id.as_deref() == Some(session_id) {
            self.session_name = Some(name.to_string());
        }
        Ok(())
    }

    /// Delete a session and leave it if it was the active one.
    pub fn delete_session(&mut self, session_id: &str) -> Result<()> {
        self.sessions.delete_session(session_id)?;
        self.delete_active_if_matching(session_id);
        Ok(())
    }

    pub fn save_credential(&mut self, secret: &str) -> Result<()> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(ChatError::Validation("the API key is empty".into()));
        }
        self.vault.save(secret)
    }

    fn prepare(&mut self, prompt: &str, model: &str) -> Result<CompletionRequest> {
        let credential = self.vault.load().ok_or_else(|| {
            ChatError::Configuration("no API key configured; run `mdchat key <KEY>`".into())
        })?;

        if prompt.trim().is_empty() {
            return Err(ChatError::Validation("please enter a prompt".into()));
        }

        self.pending_prompt = Some(prompt.to_string());

        let mut messages = self.history.clone();
        messages.push(ChatTurn::new(Role::User, prompt));

        Ok(CompletionRequest {
            credential,
            model: model.to_string(),
            messages,
        })
    }

    fn commit(&mut self, prompt: &str, model: &str, reply: String) -> Result<Submission> {
        let name = self
            .session_name
            .clone()
            .unwrap_or_else(|| default_session_name(prompt));

        let session_id = self
            .sessions
            .record_exchange(self.session_id.as_deref(), &name, prompt, &reply, model)
            .inspect_err(|err| warn!("Reply received but not stored: {}", err))?;

        self.session_id = Some(session_id.clone());
        self.session_name = Some(name);
        self.history.push(ChatTurn::new(Role::User, prompt));
        self.history.push(ChatTurn::new(Role::Assistant, reply.clone()));
        self.pending_prompt = None;
        self.last_markdown = Some(reply.clone());

        Ok(Submission {
            session_id,
            session_name: self.session_name.clone().unwrap_or_default(),
            model: model.to_string(),
            content: reply,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Database, test_database};
    use crate::vault::VaultKey;
    use diesel::connection::SimpleConnection;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies and records what it was asked.
    #[derive(Default)]
    struct ScriptedClient {
        replies: Mutex<VecDeque<Result<String>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedClient {
        fn replying(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl CompletionClient for ScriptedClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ChatError::RequestFailure("no scripted reply".into())))
        }
    }

    /// Never answers.
    struct HangingClient;

    impl CompletionClient for HangingClient {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            std::future::pending().await
        }
    }

    fn controller_with<C: CompletionClient>(
        client: C,
        credential: Option<&str>,
    ) -> (tempfile::TempDir, Database, ConversationController<C>) {
        let (dir, database) = test_database();
        let vault = CredentialVault::new(database.clone(), VaultKey::generate());
        if let Some(secret) = credential {
            vault.save(secret).unwrap();
        }
        let controller =
            ConversationController::new(client, SessionStore::new(database.clone()), vault);
        (dir, database, controller)
    }

    fn total_messages(store: &SessionStore) -> usize {
        store
            .list_sessions()
            .unwrap()
            .iter()
            .map(|s| store.load_messages(&s.id).unwrap().len())
            .sum()
    }

    #[test]
    fn test_default_session_name_truncates_to_sixty_chars() {
        assert_eq!(default_session_name("Hello"), "Hello");

        let long = "a".repeat(61);
        assert_eq!(default_session_name(&long).chars().count(), 60);

        let wide = "é".repeat(70);
        assert_eq!(default_session_name(&wide), "é".repeat(60));
    }

    #[tokio::test]
    async fn test_first_submit_creates_and_binds_session() {
        let client = ScriptedClient::replying(vec![Ok("Hi there!".to_string())]);
        let (_dir, _db, mut controller) = controller_with(client, Some("sk-test"));

        let submission = controller.submit_prompt("Hello", "gpt-4o").await.unwrap();

        assert_eq!(submission.session_name, "Hello");
        assert_eq!(submission.content, "Hi there!");
        assert_eq!(submission.model, "gpt-4o");
        assert_eq!(controller.session_id(), Some(submission.session_id.as_str()));
        assert_eq!(controller.session_name(), Some("Hello"));
        assert_eq!(
            controller.history(),
            &[
                ChatTurn::new(Role::User, "Hello"),
                ChatTurn::new(Role::Assistant, "Hi there!"),
            ]
        );
        assert!(controller.pending_prompt().is_none());
        assert_eq!(controller.last_markdown(), Some("Hi there!"));

        let stored = controller
            .sessions()
            .load_messages(&submission.session_id)
            .unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].role, Role::User);
        assert_eq!(stored[0].content, "Hello");
        assert_eq!(stored[1].role, Role::Assistant);
        assert_eq!(stored[1].content, "Hi there!");
        assert!(stored.iter().all(|m| m.model == "gpt-4o"));
    }

    #[tokio::test]
    async fn test_follow_up_sends_history_and_reuses_session() {
        let client = ScriptedClient::replying(vec![Ok("one".into()), Ok("two".into())]);
        let (_dir, _db, mut controller) = controller_with(client, Some("sk-test"));

        let first = controller.submit_prompt("first", "gpt-4").await.unwrap();
        let second = controller.submit_prompt("second", "gpt-4o").await.unwrap();

        assert_eq!(first.session_id, second.session_id);
        assert_eq!(controller.sessions().list_sessions().unwrap().len(), 1);

        let requests = controller.client.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].credential, "sk-test");
        assert_eq!(requests[1].model, "gpt-4o");
        assert_eq!(
            requests[1].messages,
            vec![
                ChatTurn::new(Role::User, "first"),
                ChatTurn::new(Role::Assistant, "one"),
                ChatTurn::new(Role::User, "second"),
            ]
        );

        let stored = controller.sessions().load_messages(&first.session_id).unwrap();
        let models: Vec<&str> = stored.iter().map(|m| m.model.as_str()).collect();
        assert_eq!(models, vec!["gpt-4", "gpt-4", "gpt-4o", "gpt-4o"]);
    }

    #[tokio::test]
    async fn test_failed_request_changes_nothing() {
        let client = ScriptedClient::replying(vec![
            Ok("ok".into()),
            Err(ChatError::RequestFailure("connection reset".into())),
        ]);
        let (_dir, _db, mut controller) = controller_with(client, Some("sk-test"));
        controller.submit_prompt("works", "gpt-4o").await.unwrap();
        let before = controller.history().len();

        let err = controller.submit_prompt("fails", "gpt-4o").await.unwrap_err();

        assert!(matches!(err, ChatError::RequestFailure(_)));
        assert_eq!(controller.history().len(), before);
        assert_eq!(total_messages(controller.sessions()), 2);
        assert_eq!(controller.pending_prompt(), Some("fails"));
    }

    #[tokio::test]
    async fn test_failed_first_request_creates_no_session() {
        let client =
            ScriptedClient::replying(vec![Err(ChatError::RequestFailure("timeout".into()))]);
        let (_dir, _db, mut controller) = controller_with(client, Some("sk-test"));

        assert!(controller.submit_prompt("Hello", "gpt-4o").await.is_err());
        assert!(controller.session_id().is_none());
        assert!(controller.sessions().list_sessions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_credential_is_configuration_error() {
        let client = ScriptedClient::replying(vec![Ok("unused".into())]);
        let (_dir, _db, mut controller) = controller_with(client, None);

        let err = controller.submit_prompt("Hello", "gpt-4o").await.unwrap_err();

        assert!(matches!(err, ChatError::Configuration(_)));
        assert!(controller.client.requests().is_empty());
        assert!(controller.pending_prompt().is_none());
    }

    #[tokio::test]
    async fn test_blank_prompt_is_validation_error() {
        let client = ScriptedClient::replying(vec![Ok("unused".into())]);
        let (_dir, _db, mut controller) = controller_with(client, Some("sk-test"));

        let err = controller.submit_prompt("  \n", "gpt-4o").await.unwrap_err();

        assert!(matches!(err, ChatError::Validation(_)));
        assert!(controller.client.requests().is_empty());
        assert!(controller.history().is_empty());
    }

    #[tokio::test]
    async fn test_credential_from_other_key_counts_as_missing() {
        let (_dir, database) = test_database();
        CredentialVault::new(database.clone(), VaultKey::generate())
            .save("sk-old")
            .unwrap();
        let vault = CredentialVault::new(database.clone(), VaultKey::generate());
        let mut controller = ConversationController::new(
            ScriptedClient::default(),
            SessionStore::new(database),
            vault,
        );

        let err = controller.submit_prompt("Hello", "gpt-4o").await.unwrap_err();
        assert!(matches!(err, ChatError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_cancelled_submit_changes_nothing() {
        let (_dir, _db, mut controller) = controller_with(HangingClient, Some("sk-test"));

        let err = controller
            .submit_prompt_cancellable("Hello", "gpt-4o", std::future::ready(()))
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::Cancelled));
        assert!(controller.session_id().is_none());
        assert!(controller.history().is_empty());
        assert!(controller.sessions().list_sessions().unwrap().is_empty());
        assert_eq!(controller.pending_prompt(), Some("Hello"));
    }

    #[tokio::test]
    async fn test_uncancelled_submit_completes() {
        let client = ScriptedClient::replying(vec![Ok("done".into())]);
        let (_dir, _db, mut controller) = controller_with(client, Some("sk-test"));

        let submission = controller
            .submit_prompt_cancellable("Hello", "gpt-4o", std::future::pending())
            .await
            .unwrap();
        assert_eq!(submission.content, "done");
    }

    #[tokio::test]
    async fn test_rename_then_reselect() {
        let client = ScriptedClient::replying(vec![Ok("reply".into())]);
        let (_dir, _db, mut controller) = controller_with(client, Some("sk-test"));
        let submission = controller.submit_prompt("Original", "gpt-4o").await.unwrap();
        let history = controller.history().to_vec();

        controller
            .rename_session(&submission.session_id, "Renamed")
            .unwrap();
        assert_eq!(controller.session_name(), Some("Renamed"));

        controller.start_new_session();
        controller.select_session(&submission.session_id).unwrap();

        assert_eq!(controller.session_name(), Some("Renamed"));
        assert_eq!(controller.history(), history.as_slice());
        assert_eq!(controller.last_markdown(), Some("reply"));
    }

    #[tokio::test]
    async fn test_select_session_discards_pending_prompt() {
        let client = ScriptedClient::replying(vec![
            Ok("a".into()),
            Err(ChatError::RequestFailure("down".into())),
        ]);
        let (_dir, _db, mut controller) = controller_with(client, Some("sk-test"));
        let submission = controller.submit_prompt("q", "gpt-4o").await.unwrap();
        let _ = controller.submit_prompt("retry me", "gpt-4o").await;
        assert_eq!(controller.pending_prompt(), Some("retry me"));

        controller.select_session(&submission.session_id).unwrap();
        assert!(controller.pending_prompt().is_none());
    }

    #[test]
    fn test_select_unknown_session_is_not_found() {
        let (_dir, _db, mut controller) = controller_with(ScriptedClient::default(), None);
        let result = controller.select_session("missing");
        assert!(matches!(result, Err(ChatError::NotFound(_))));
        assert!(controller.session_id().is_none());
    }

    #[tokio::test]
    async fn test_new_session_clears_state_but_keeps_rows() {
        let client = ScriptedClient::replying(vec![Ok("a".into()), Ok("b".into())]);
        let (_dir, _db, mut controller) = controller_with(client, Some("sk-test"));
        let first = controller.submit_prompt("one", "gpt-4o").await.unwrap();

        controller.start_new_session();

        assert!(controller.session_id().is_none());
        assert!(controller.session_name().is_none());
        assert!(controller.history().is_empty());
        assert_eq!(controller.sessions().load_messages(&first.session_id).unwrap().len(), 2);

        let second = controller.submit_prompt("two", "gpt-4o").await.unwrap();
        assert_ne!(first.session_id, second.session_id);
        assert_eq!(controller.client.requests()[1].messages.len(), 1);
    }

    #[tokio::test]
    async fn test_deleting_active_session_returns_to_new() {
        let client = ScriptedClient::replying(vec![Ok("a".into())]);
        let (_dir, _db, mut controller) = controller_with(client, Some("sk-test"));
        let submission = controller.submit_prompt("one", "gpt-4o").await.unwrap();

        controller.delete_session(&submission.session_id).unwrap();

        assert!(controller.session_id().is_none());
        assert!(controller.history().is_empty());
        assert!(controller.sessions().list_sessions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleting_other_session_keeps_binding() {
        let client = ScriptedClient::replying(vec![Ok("a".into())]);
        let (_dir, _db, mut controller) = controller_with(client, Some("sk-test"));
        let other = controller.sessions().create_session("other").unwrap();
        let submission = controller.submit_prompt("one", "gpt-4o").await.unwrap();

        controller.delete_session(&other).unwrap();

        assert_eq!(controller.session_id(), Some(submission.session_id.as_str()));
        assert_eq!(controller.history().len(), 2);
    }

    #[tokio::test]
    async fn test_handle_dispatches_commands() {
        let client = ScriptedClient::replying(vec![Ok("pong".into())]);
        let (_dir, _db, mut controller) = controller_with(client, None);

        let outcome = controller
            .handle(ChatCommand::SaveCredential {
                secret: "sk-new".into(),
            })
            .await
            .unwrap();
        assert_eq!(outcome, ChatOutcome::CredentialSaved);

        let outcome = controller
            .handle(ChatCommand::Submit {
                prompt: "ping".into(),
                model: "gpt-4o".into(),
            })
            .await
            .unwrap();
        let ChatOutcome::Reply(submission) = outcome else {
            panic!("expected a reply");
        };

        let outcome = controller.handle(ChatCommand::ListSessions).await.unwrap();
        let ChatOutcome::Sessions(sessions) = outcome else {
            panic!("expected sessions");
        };
        assert_eq!(sessions.len(), 1);

        controller.handle(ChatCommand::NewSession).await.unwrap();
        let outcome = controller
            .handle(ChatCommand::SelectSession {
                session_id: submission.session_id.clone(),
            })
            .await
            .unwrap();
        match outcome {
            ChatOutcome::Selected { session, history } => {
                assert_eq!(session.name, "ping");
                assert_eq!(history.len(), 2);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let outcome = controller
            .handle(ChatCommand::DeleteSession {
                session_id: submission.session_id,
            })
            .await
            .unwrap();
        assert_eq!(outcome, ChatOutcome::Deleted);
        assert!(controller.session_id().is_none());
    }

    #[tokio::test]
    async fn test_blank_credential_is_rejected() {
        let (_dir, _db, mut controller) = controller_with(ScriptedClient::default(), None);
        let result = controller
            .handle(ChatCommand::SaveCredential {
                secret: "   ".into(),
            })
            .await;
        assert!(matches!(result, Err(ChatError::Validation(_))));
    }

    fn reject_assistant_rows(database: &Database) {
        database
            .connect()
            .unwrap()
            .batch_execute(
                "CREATE TRIGGER reject_assistant BEFORE INSERT ON chats \
                 WHEN NEW.role = 'assistant' BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();
    }

    fn allow_assistant_rows(database: &Database) {
        database
            .connect()
            .unwrap()
            .batch_execute("DROP TRIGGER reject_assistant;")
            .unwrap();
    }

    fn stored_roles(store: &SessionStore, session_id: &str) -> Vec<Role> {
        store
            .load_messages(session_id)
            .unwrap()
            .iter()
            .map(|m| m.role)
            .collect()
    }

    #[tokio::test]
    async fn test_storage_failure_on_first_reply_leaves_controller_new() {
        let client = ScriptedClient::replying(vec![Ok("first".into()), Ok("second".into())]);
        let (_dir, database, mut controller) = controller_with(client, Some("sk-test"));
        reject_assistant_rows(&database);

        let err = controller.submit_prompt("Hello", "gpt-4o").await.unwrap_err();

        assert!(matches!(err, ChatError::Storage(_)));
        assert!(controller.session_id().is_none());
        assert!(controller.session_name().is_none());
        assert!(controller.history().is_empty());
        assert!(controller.sessions().list_sessions().unwrap().is_empty());
        assert_eq!(controller.pending_prompt(), Some("Hello"));

        allow_assistant_rows(&database);
        let submission = controller.submit_prompt("Hello", "gpt-4o").await.unwrap();

        assert_eq!(controller.history().len(), 2);
        assert_eq!(
            stored_roles(controller.sessions(), &submission.session_id),
            vec![Role::User, Role::Assistant]
        );
    }

    #[tokio::test]
    async fn test_storage_failure_in_bound_session_keeps_history_in_step() {
        let client = ScriptedClient::replying(vec![
            Ok("one".into()),
            Ok("lost".into()),
            Ok("two".into()),
        ]);
        let (_dir, database, mut controller) = controller_with(client, Some("sk-test"));
        let first = controller.submit_prompt("first", "gpt-4o").await.unwrap();

        reject_assistant_rows(&database);
        assert!(controller.submit_prompt("second", "gpt-4o").await.is_err());
        assert_eq!(controller.session_id(), Some(first.session_id.as_str()));
        assert_eq!(controller.history().len(), 2);
        assert_eq!(stored_roles(controller.sessions(), &first.session_id).len(), 2);

        allow_assistant_rows(&database);
        controller.submit_prompt("second", "gpt-4o").await.unwrap();

        let stored: Vec<ChatTurn> = controller
            .sessions()
            .load_messages(&first.session_id)
            .unwrap()
            .iter()
            .map(|m| m.to_turn())
            .collect();
        assert_eq!(stored.as_slice(), controller.history());
        assert_eq!(
            stored_roles(controller.sessions(), &first.session_id),
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
    }

    #[tokio::test]
    async fn test_until_signalled_resolves_on_signal() {
        until_signalled(std::future::ready(Ok(()))).await;
    }

    #[tokio::test]
    async fn test_until_signalled_never_cancels_without_a_listener() {
        let failed = std::future::ready(Err(io::Error::other("no signal handler")));
        let cancelled = tokio::select! {
            biased;
            _ = until_signalled(failed) => true,
            _ = std::future::ready(()) => false,
        };
        assert!(!cancelled);
    }

    #[tokio::test]
    async fn test_failed_signal_listener_lets_submission_finish() {
        let client = ScriptedClient::replying(vec![Ok("done".into())]);
        let (_dir, _db, mut controller) = controller_with(client, Some("sk-test"));
        let failed = std::future::ready(Err(io::Error::other("no signal handler")));

        let submission = controller
            .submit_prompt_cancellable("Hello", "gpt-4o", until_signalled(failed))
            .await
            .unwrap();
        assert_eq!(submission.content, "done");
    }
}
