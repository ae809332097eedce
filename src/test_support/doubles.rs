//! Database creators with canned behaviour.

use std::sync::{Arc, Mutex, PoisonError};

use color_eyre::eyre::eyre;

use crate::config::Config;
use crate::database::DatabaseCreator;
use crate::error::CreateDatabaseError;

/// Records the names of databases it was asked to create.
#[derive(Debug, Clone, Default)]
pub struct RecordingCreator {
    created: Arc<Mutex<Vec<String>>>,
}

impl RecordingCreator {
    /// Returns the database names seen so far, shared across clones.
    #[must_use]
    pub fn created(&self) -> Vec<String> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DatabaseCreator for RecordingCreator {
    fn create(&self, config: &Config) -> Result<(), CreateDatabaseError> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(config.database().to_owned());
        Ok(())
    }
}

/// Always fails as if the database already existed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingCreator;

impl DatabaseCreator for FailingCreator {
    fn create(&self, config: &Config) -> Result<(), CreateDatabaseError> {
        Err(CreateDatabaseError::from(eyre!(
            "database \"{}\" already exists",
            config.database()
        )))
    }
}
