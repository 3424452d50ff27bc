//! # Database models
//!
//! Row types that map to the SQLite schema via **Diesel** (see [`crate::schema`]).
//!
//! - [`Settings`]: the singleton display-preference row.
//! - [`ApiKey`]: the singleton encrypted credential row.
//! - [`ChatSession`]: a named conversation.
//! - [`Chat`] / [`NewChat`]: one turn within a conversation.
//!
//! Singleton tables always use [`SINGLETON_ID`] as their primary key so an
//! upsert is a plain `REPLACE INTO`.

use diesel::prelude::*;
use serde::Serialize;

/// Primary key used by the singleton tables (`settings`, `api_keys`).
pub const SINGLETON_ID: i32 = 1;

/// Persisted font preferences.
#[derive(Queryable, Selectable, Insertable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::settings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Settings {
    pub id: i32,
    pub font_family: String,
    pub font_size: i32,
}

/// The stored credential, as `base64(nonce || ciphertext)`.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::api_keys)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ApiKey {
    pub id: i32,
    pub encrypted_key: String,
}

/// A named chat session.
///
/// The `id` is an opaque UUID string assigned by
/// [`SessionStore::create_session`](crate::session_store::SessionStore::create_session);
/// `name` is free text and need not be unique.
#[derive(Queryable, Selectable, Insertable, Identifiable, Serialize, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::chat_sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ChatSession {
    pub id: String,
    pub name: String,
}

/// One persisted turn.
///
/// `id` is the autoincrement key and defines message order within a session.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::chats)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Chat {
    pub id: i32,
    pub session_id: String,
    /// `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
    /// Model that produced (or received) this turn.
    pub model: String,
}

/// Insertable form of [`Chat`]; the database assigns `id`.
#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::chats)]
pub struct NewChat<'a> {
    pub session_id: &'a str,
    pub role: &'a str,
    pub content: &'a str,
    pub model: &'a str,
}
