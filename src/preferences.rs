//! Display preferences (font family and size) kept in the singleton `settings` row.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    database::Database,
    error::Result,
    models::{SINGLETON_ID, Settings},
    schema::settings,
};

/// Font family used when nothing has been saved.
pub const DEFAULT_FONT_FAMILY: &str = "Arial";

/// Font size used when nothing has been saved.
pub const DEFAULT_FONT_SIZE: i32 = 12;

/// Smallest font size the front end accepts.
pub const MIN_FONT_SIZE: i32 = 8;

/// Largest font size the front end accepts.
pub const MAX_FONT_SIZE: i32 = 48;

/// Font settings applied to rendered output.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct Preferences {
    pub font_family: String,
    pub font_size: i32,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            font_size: DEFAULT_FONT_SIZE,
        }
    }
}

/// Reads and writes [`Preferences`].
pub struct PreferenceStore {
    database: Database,
}

impl PreferenceStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Upsert the singleton row. `font_size` is stored as given.
    pub fn save(&self, font_family: &str, font_size: i32) -> Result<()> {
        let row = Settings {
            id: SINGLETON_ID,
            font_family: font_family.to_string(),
            font_size,
        };

        let mut conn = self.database.connect()?;
        diesel::replace_into(settings::table)
            .values(&row)
            .execute(&mut conn)?;

        debug!("Saved preferences: {} {}pt", font_family, font_size);
        Ok(())
    }

    /// Persisted preferences, or the defaults when none were saved.
    pub fn load(&self) -> Result<Preferences> {
        let mut conn = self.database.connect()?;
        let row = settings::table
            .find(SINGLETON_ID)
            .select(Settings::as_select())
            .first(&mut conn)
            .optional()?;

        Ok(row
            .map(|row| Preferences {
                font_family: row.font_family,
                font_size: row.font_size,
            })
            .unwrap_or_default())
    }
}
