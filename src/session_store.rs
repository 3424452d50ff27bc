//! # Session Store
//!
//! Durable home of chat sessions and their message logs.
//!
//! ## What this module owns
//! - `chat_sessions`: one row per conversation (`id`, display `name`).
//! - `chats`: the append-only message log, ordered by its autoincrement key.
//!
//! ## Rules enforced here
//! - Session ids are fresh UUID v4 strings and never change.
//! - Display names are free text; two sessions may share one.
//! - Appending to an unknown session fails with [`ChatError::NotFound`].
//! - A prompt/reply pair is recorded with [`SessionStore::record_exchange`]:
//!   both turns (and the session, when it is new) land in one transaction or
//!   not at all.
//! - Deleting a session removes its messages in the same transaction and is
//!   a no-op for ids that are already gone.
//! - Alternation of user/assistant turns is *not* enforced; any ordered append
//!   is accepted.
//!
//! Each call opens its own connection through [`Database::connect`].

use diesel::prelude::*;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    api::{ChatTurn, Role},
    database::Database,
    error::{ChatError, Result},
    models::{Chat, ChatSession, NewChat},
    schema::{chat_sessions, chats},
};

/// A message as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
    pub model: String,
}

impl StoredMessage {
    /// The `{role, content}` projection used for conversation history.
    pub fn to_turn(&self) -> ChatTurn {
        ChatTurn::new(self.role, self.content.clone())
    }
}

impl TryFrom<Chat> for StoredMessage {
    type Error = ChatError;

    fn try_from(chat: Chat) -> Result<Self> {
        Ok(Self {
            role: chat.role.parse()?,
            content: chat.content,
            model: chat.model,
        })
    }
}

/// Persistence for sessions and messages.
#[derive(Debug, Clone)]
pub struct SessionStore {
    database: Database,
}

impl SessionStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Insert a new session called `name` and return its id.
    pub fn create_session(&self, name: &str) -> Result<String> {
        let mut conn = self.database.connect()?;
        let id = insert_session(&mut conn, name)?;

        info!("Created session {} ({:?})", id, name);
        Ok(id)
    }

    /// Change the display name of `session_id`.
    ///
    /// # Errors
    /// [`ChatError::NotFound`] if no such session exists.
    pub fn rename_session(&self, session_id: &str, new_name: &str) -> Result<()> {
        let mut conn = self.database.connect()?;
        let updated = diesel::update(chat_sessions::table.find(session_id))
            .set(chat_sessions::name.eq(new_name))
            .execute(&mut conn)?;

        if updated == 0 {
            return Err(ChatError::NotFound(format!("session {session_id}")));
        }

        debug!("Renamed session {} to {:?}", session_id, new_name);
        Ok(())
    }

    /// Remove `session_id` and all of its messages, atomically.
    pub fn delete_session(&self, session_id: &str) -> Result<()> {
        let mut conn = self.database.connect()?;
        let (messages, sessions) = conn.transaction::<_, ChatError, _>(|conn| {
            let messages = diesel::delete(chats::table.filter(chats::session_id.eq(session_id)))
                .execute(conn)?;
            let sessions = diesel::delete(chat_sessions::table.find(session_id)).execute(conn)?;
            Ok((messages, sessions))
        })?;

        if sessions > 0 {
            info!("Deleted session {} with {} messages", session_id, messages);
        } else {
            debug!("Session {} already gone", session_id);
        }
        Ok(())
    }

    /// Append one message to the end of `session_id`'s log.
    ///
    /// # Errors
    /// [`ChatError::NotFound`] if the session does not exist.
    pub fn append_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        model: &str,
    ) -> Result<()> {
        let mut conn = self.database.connect()?;
        conn.transaction::<_, ChatError, _>(|conn| {
            ensure_session(conn, session_id)?;
            insert_message(conn, session_id, role, content, model)
        })
    }

    /// Store a user prompt and the assistant reply to it as one unit.
    ///
    /// With `session_id == None` a session called `name` is created in the same
    /// transaction; otherwise `name` is ignored. Returns the id the pair was
    /// stored under. On error nothing is written.
    ///
    /// # Errors
    /// [`ChatError::NotFound`] if `session_id` names a session that does not exist.
    pub fn record_exchange(
        &self,
        session_id: Option<&str>,
        name: &str,
        prompt: &str,
        reply: &str,
        model: &str,
    ) -> Result<String> {
        let mut conn = self.database.connect()?;
        let id = conn.transaction::<_, ChatError, _>(|conn| {
            let id = match session_id {
                Some(id) => {
                    ensure_session(conn, id)?;
                    id.to_string()
                }
                None => insert_session(conn, name)?,
            };
            insert_message(conn, &id, Role::User, prompt, model)?;
            insert_message(conn, &id, Role::Assistant, reply, model)?;
            Ok(id)
        })?;

        debug!("Recorded exchange in session {} ({})", id, model);
        Ok(id)
    }

    /// Every session, in storage order.
    pub fn list_sessions(&self) -> Result<Vec<ChatSession>> {
        let mut conn = self.database.connect()?;
        let sessions = chat_sessions::table
            .select(ChatSession::as_select())
            .load(&mut conn)?;
        Ok(sessions)
    }

    /// Look up a single session.
    pub fn get_session(&self, session_id: &str) -> Result<Option<ChatSession>> {
        let mut conn = self.database.connect()?;
        let session = chat_sessions::table
            .find(session_id)
            .select(ChatSession::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(session)
    }

    /// The full log of `session_id` in insertion order.
    ///
    /// Unknown sessions simply have no messages.
    pub fn load_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>> {
        let mut conn = self.database.connect()?;
        let rows: Vec<Chat> = chats::table
            .filter(chats::session_id.eq(session_id))
            .order(chats::id.asc())
            .select(Chat::as_select())
            .load(&mut conn)?;

        rows.into_iter().map(StoredMessage::try_from).collect()
    }
}

fn insert_session(conn: &mut SqliteConnection, name: &str) -> Result<String> {
    let session = ChatSession {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
    };
    diesel::insert_into(chat_sessions::table)
        .values(&session)
        .execute(conn)?;
    Ok(session.id)
}

fn ensure_session(conn: &mut SqliteConnection, session_id: &str) -> Result<()> {
    let exists: i64 = chat_sessions::table
        .find(session_id)
        .count()
        .get_result(conn)?;
    if exists == 0 {
        return Err(ChatError::NotFound(format!("session {session_id}")));
    }
    Ok(())
}

fn insert_message(
    conn: &mut SqliteConnection,
    session_id: &str,
    role: Role,
    content: &str,
    model: &str,
) -> Result<()> {
    diesel::insert_into(chats::table)
        .values(&NewChat {
            session_id,
            role: role.as_str(),
            content,
            model,
        })
        .execute(conn)?;
    Ok(())
}
