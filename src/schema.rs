// Kept in sync by hand with `database::SCHEMA_SQL`.

diesel::table! {
    settings (id) {
        id -> Integer,
        font_family -> Text,
        font_size -> Integer,
    }
}

diesel::table! {
    api_keys (id) {
        id -> Integer,
        encrypted_key -> Text,
    }
}

diesel::table! {
    chat_sessions (id) {
        id -> Text,
        name -> Text,
    }
}

diesel::table! {
    chats (id) {
        id -> Integer,
        session_id -> Text,
        role -> Text,
        content -> Text,
        model -> Text,
    }
}

diesel::joinable!(chats -> chat_sessions (session_id));

diesel::allow_tables_to_appear_in_same_query!(api_keys, chat_sessions, chats, settings,);
